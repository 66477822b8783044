//! Diagnostic sinks handed to backend adapters.
//!
//! Engines that are chatty by default get their messages routed through a
//! sink owned by the adapter instead of a process-wide logger.

use std::sync::Arc;

/// Minimal logging capability for backend adapters.
pub trait DiagnosticSink: Send + Sync {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Shared, cloneable sink handle.
pub type SharedSink = Arc<dyn DiagnosticSink>;

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Forwards to `tracing`, tagged with the backend name.
#[derive(Debug, Clone)]
pub struct TracingSink {
    backend: &'static str,
}

impl TracingSink {
    pub fn new(backend: &'static str) -> Self {
        Self { backend }
    }
}

impl DiagnosticSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!(backend = self.backend, "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(backend = self.backend, "{}", message);
    }

    fn error(&self, message: &str) {
        tracing::error!(backend = self.backend, "{}", message);
    }
}

/// The default sink: silent.
pub fn noop() -> SharedSink {
    Arc::new(NoopSink)
}

#[cfg(test)]
pub(crate) mod testing {
    use parking_lot::Mutex;

    use super::DiagnosticSink;

    /// Sink that keeps every message for assertions.
    #[derive(Default)]
    pub struct RecordingSink {
        pub messages: Mutex<Vec<(&'static str, String)>>,
    }

    impl DiagnosticSink for RecordingSink {
        fn info(&self, message: &str) {
            self.messages.lock().push(("info", message.to_string()));
        }

        fn warn(&self, message: &str) {
            self.messages.lock().push(("warn", message.to_string()));
        }

        fn error(&self, message: &str) {
            self.messages.lock().push(("error", message.to_string()));
        }
    }
}
