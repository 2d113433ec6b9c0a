use tracing_subscriber::EnvFilter;

use crate::logging::config::LoggingConfig;

/// `RUST_LOG` имеет приоритет над конфигурацией. Некорректная директива из
/// конфигурации заменяется на `info`.
pub fn build_filter_from_config(config: &LoggingConfig) -> EnvFilter {
    if let Ok(env_filter) = EnvFilter::try_from_default_env() {
        return env_filter;
    }

    let directive = config.build_filter_directive();
    match EnvFilter::try_new(&directive) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("invalid log filter directive `{directive}`: {e}; falling back to `info`");
            EnvFilter::new("info")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env,
        sync::{Arc, Mutex},
    };

    use serial_test::serial;
    use tracing_subscriber::{fmt, prelude::*, registry::Registry};

    use super::*;

    struct VecMakeWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> fmt::MakeWriter<'a> for VecMakeWriter {
        type Writer = VecWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            VecWriterGuard(self.0.clone())
        }
    }

    struct VecWriterGuard(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for VecWriterGuard {
        fn write(
            &mut self,
            buf: &[u8],
        ) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn capture(filter: EnvFilter) -> String {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let subscriber = Registry::default().with(filter).with(
            fmt::layer()
                .with_writer(VecMakeWriter(buf.clone()))
                .with_ansi(false),
        );
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "trackwire::entry", "debug-visible");
            tracing::info!(target: "other_crate", "info-hidden");
        });
        let out = buf.lock().unwrap().clone();
        String::from_utf8(out).unwrap()
    }

    #[test]
    #[serial]
    fn test_config_directive_applies() {
        env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "debug".into(),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&config));
        assert!(out.contains("debug-visible"));
        assert!(!out.contains("info-hidden"));
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        env::set_var("RUST_LOG", "error");
        let filter = build_filter_from_config(&LoggingConfig {
            level: "trace".into(),
            ..Default::default()
        });
        env::remove_var("RUST_LOG");
        let out = capture(filter);
        assert!(!out.contains("debug-visible"));
    }

    #[test]
    #[serial]
    fn test_invalid_directive_falls_back() {
        env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "=[".into(),
            ..Default::default()
        };
        let out = capture(build_filter_from_config(&config));
        assert!(!out.contains("debug-visible"));
    }
}
