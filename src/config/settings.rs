use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use trackwire_error::{ensure, StatusCode, TrackwireResult};

use super::limits::CodecLimits;
use crate::logging::LoggingConfig;

/// Префикс переменных окружения: `TRACKWIRE_LIMITS__MAX_DEPTH=16`.
pub const ENV_PREFIX: &str = "TRACKWIRE";

/// Настройки процесса, использующего кодек.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub limits: CodecLimits,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Значения по умолчанию, затем файл (если задан), затем окружение.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Settings::default())?);

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }

    pub fn validate(&self) -> TrackwireResult<()> {
        let limits = &self.limits;
        for (name, value) in [
            ("limits.max_string_bytes", limits.max_string_bytes),
            ("limits.max_array_len", limits.max_array_len),
            ("limits.max_bitmap_bytes", limits.max_bitmap_bytes),
            ("limits.max_depth", limits.max_depth),
        ] {
            ensure!(value > 0, StatusCode::InvalidArgs, "{} must be positive", name);
        }
        if let Err(reason) = self.logging.validate() {
            trackwire_error::bail!(StatusCode::InvalidArgs, reason);
        }
        Ok(())
    }
}
