//! Task-output sink for progress text shown on the CI host's build log.

use std::sync::Mutex;
use tracing::info;

/// Receives one line per orchestrator step.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, message: &str);
}

/// Forwards progress lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn progress(&self, message: &str) {
        info!(target: "buildfetch::progress", "{message}");
    }
}

/// Records progress lines in memory.
#[derive(Debug, Default)]
pub struct MemoryProgress {
    lines: Mutex<Vec<String>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ProgressSink for MemoryProgress {
    fn progress(&self, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.to_string());
    }
}
