//! Crisp Processing Library
//!
//! Decoding, pixel operations, subject detection, upscaling and encoding
//! behind a single [`ProcessingEngine`] value:
//! - Format normalization with placeholder fallback for undecodable input
//! - Smart crop (subject, focal point, anchored)
//! - Pooled upscalers keyed by scale factor
//! - Batch processing and template expansion

mod batch;
pub mod compression;
pub mod detect;
pub mod engine;
pub mod fallback;
pub mod format;
pub mod image;
pub mod naming;
pub mod raster;
pub mod runtime;
mod templates;
pub mod traits;
pub mod upscale;

pub use compression::{EncodedImage, FormatSelector, ImageCompressor};
pub use detect::{Detections, SubjectDetector};
pub use engine::{EngineStats, ProcessingEngine, ProcessingEngineBuilder, ProgressCallback};
pub use fallback::{AsyncLadder, Ladder, Outcome};
pub use format::{FormatNormalizer, Normalized, RasterOrigin, RasterTarget};
pub use raster::Raster;
pub use traits::{Enlarger, ModelProvider, ObjectDetector, OfflineModelProvider};
pub use upscale::{UpscaleLease, UpscalerPool};
