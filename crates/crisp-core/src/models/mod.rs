//! Data models for the engine
//!
//! This module contains the data structures exchanged between the engine
//! and its host, organized by concern.

mod asset;
mod detection;
mod processing;
mod result;
mod template;

pub use asset::*;
pub use detection::*;
pub use processing::*;
pub use result::*;
pub use template::*;
