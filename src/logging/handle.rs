use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use tracing_appender::non_blocking::WorkerGuard;

/// Handle для управления lifecycle логирования.
///
/// Держит guard неблокирующего writer-а: пока handle жив, фоновый поток
/// пишет события в файл; при drop буфер сбрасывается.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    shutdown: Arc<AtomicBool>,
}

impl LoggingHandle {
    pub fn new(file_guard: Option<WorkerGuard>) -> Self {
        Self {
            file_guard,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Пишутся ли события в файл.
    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Сбрасывает буфер файла и отключает фоновую запись.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Release);
        let start = Instant::now();
        if let Some(guard) = self.file_guard.take() {
            tracing::debug!("flushing log file");
            drop(guard);
        }
        tracing::trace!(
            shutdown_us = start.elapsed().as_micros() as u64,
            "logging shutdown completed"
        );
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.has_file_sink())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
