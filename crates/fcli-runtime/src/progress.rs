use std::fmt;

/// Receives user-facing progress and warning messages during a run.
pub trait ProgressReporter: Send + Sync + fmt::Debug {
    fn progress(&self, message: &str);

    fn warn(&self, message: &str);
}

/// Default reporter: forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn progress(&self, message: &str) {
        tracing::info!(target: "fcli::progress", "{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "fcli::progress", "{}", message);
    }
}
