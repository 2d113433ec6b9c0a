use std::{env, fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

/// Переменная окружения, переопределяющая уровень.
pub const LOG_LEVEL_ENV: &str = "TRACKWIRE_LOG_LEVEL";
/// Переменная окружения, переопределяющая формат.
pub const LOG_FORMAT_ENV: &str = "TRACKWIRE_LOG_FORMAT";

const LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Формат вывода событий.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Настройки логирования CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Уровень для крейта `trackwire` (trace/debug/info/warn/error/off).
    pub level: String,
    pub format: LogFormat,
    pub with_target: bool,
    pub with_ansi: bool,
    /// Если задан, события пишутся в этот файл вместо stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::default(),
            with_target: false,
            with_ansi: true,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Применяет `TRACKWIRE_LOG_LEVEL` и `TRACKWIRE_LOG_FORMAT`.
    ///
    /// Некорректный формат из окружения не меняет текущий; некорректный
    /// уровень отклоняется позже в [`validate`](Self::validate).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = env::var(LOG_LEVEL_ENV) {
            self.level = level.trim().to_ascii_lowercase();
        }
        if let Ok(format) = env::var(LOG_FORMAT_ENV) {
            match format.parse() {
                Ok(format) => self.format = format,
                Err(e) => eprintln!("{LOG_FORMAT_ENV}: {e}; keeping `{}`", self.format),
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(format!(
                "invalid log level `{}`, expected one of {}",
                self.level,
                LEVELS.join(", ")
            ));
        }
        if let Some(file) = &self.file {
            if file.file_name().is_none() {
                return Err(format!("log file path `{}` has no file name", file.display()));
            }
        }
        Ok(())
    }

    /// Директива `EnvFilter`: уровень применяется к крейту, остальное на `warn`.
    pub fn build_filter_directive(&self) -> String {
        format!("warn,trackwire={}", self.level)
    }
}
