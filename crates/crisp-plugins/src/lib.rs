//! Crisp Plugins
//!
//! Model-backed capabilities for the processing engine:
//! - `RemoteModelProvider`: manifest-driven provider for a remote model host
//! - HTTP detector and enlarger implementations
//! - Model asset catalog checks

pub mod catalog;

#[cfg(feature = "remote-models")]
pub mod provider;
#[cfg(feature = "remote-models")]
pub mod remote_upscale;
#[cfg(feature = "remote-models")]
pub mod remote_vision;

pub use catalog::{verify, CatalogReport, ModelId, Precision};

#[cfg(feature = "remote-models")]
pub use provider::{ManifestEntry, ModelManifest, RemoteModelConfig, RemoteModelProvider};
#[cfg(feature = "remote-models")]
pub use remote_upscale::RemoteEnlarger;
#[cfg(feature = "remote-models")]
pub use remote_vision::RemoteVisionDetector;
