//! Crisp Core Library
//!
//! This crate provides the domain models, error types, configuration and
//! resource gates shared across all crisp components.

pub mod config;
pub mod error;
pub mod memory_gate;
pub mod models;

// Re-export commonly used types
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorMetadata, LogLevel};
pub use memory_gate::{FixedMemoryPressure, MemoryPressure, NoMemoryPressure};
