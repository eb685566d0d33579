//! Engine settings, loaded from defaults layered with `LATTICE__`-prefixed
//! environment variables (e.g. `LATTICE__ENGINE__SNAPSHOT_CAPACITY=512`).

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Top-level settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Engine tunables.
    pub engine: EngineSettings,
    /// Telemetry tunables.
    pub telemetry: TelemetrySettings,
}

/// Engine tunables.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineSettings {
    /// Capacity of the snapshot broadcast channel.
    pub snapshot_capacity: usize,
    /// Default for showing completed/approved tasks in views.
    pub show_completed: bool,
}

/// Telemetry tunables.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    /// Service name stamped on log output.
    pub service_name: String,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Settings {
    /// Loads settings from defaults and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment override fails to parse.
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("engine.snapshot_capacity", 256)?
            .set_default("engine.show_completed", true)?
            .set_default("telemetry.service_name", "lattice-core")?
            .set_default("telemetry.log_level", "info")?
            .add_source(Environment::with_prefix("LATTICE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_environment() {
        let settings = Settings::new().unwrap();
        assert_eq!(settings.engine.snapshot_capacity, 256);
        assert!(settings.engine.show_completed);
        assert_eq!(settings.telemetry.service_name, "lattice-core");
    }
}
