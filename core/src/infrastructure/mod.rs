//! Ambient infrastructure: configuration and telemetry.

/// Environment-layered settings.
pub mod config;
/// Logging setup.
pub mod telemetry;
