//! Telemetry initialization
//!
//! Installs a `tracing` subscriber with an environment-driven filter.

mod init_basic;

pub use init_basic::init_telemetry;
