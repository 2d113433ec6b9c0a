//! Инициализация `tracing` для бинарника.
//!
//! Библиотека только порождает события; подписчика ставит вызывающая
//! сторона, например `trackwire-cli` через [`init_logging`].

pub mod config;
mod filters;
mod formatter;
pub mod handle;

use std::{fs, io};

pub use config::{LogFormat, LoggingConfig};
pub use handle::LoggingHandle;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Registry};

/// Ставит глобальный подписчик. Повторный вызов в том же процессе вернёт
/// ошибку.
pub fn init_logging(
    mut config: LoggingConfig
) -> Result<LoggingHandle, Box<dyn std::error::Error>> {
    config.apply_env_overrides();
    config.validate()?;

    let env_filter = filters::build_filter_from_config(&config);

    let (layer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            fs::create_dir_all(dir)?;
            let name = path
                .file_name()
                .ok_or_else(|| format!("log file path `{}` has no file name", path.display()))?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = formatter::build_formatter_from_config::<Registry, _>(&config, writer, false);
            (layer, Some(guard))
        }
        None => {
            let layer = formatter::build_formatter_from_config::<Registry, _>(
                &config,
                io::stderr,
                config.with_ansi,
            );
            (layer, None)
        }
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .try_init()?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        format = %config.format,
        file = config.file.as_ref().map(|p| p.display().to_string()),
        "logging initialized"
    );

    Ok(LoggingHandle::new(guard))
}
