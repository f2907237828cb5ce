//! Progress reporting for document indexing.
//!
//! Indexing a large PDF takes long enough that the user interface shows a
//! busy indicator; these events drive it.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Indexing phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Extract,
    Chunk,
    Embed,
}

impl IndexPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
        }
    }
}

impl fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event emitted while a document is indexed.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: IndexPhase,

    /// Units done in this phase (bytes, chunks or embeddings)
    pub current: u64,

    /// Total units in this phase, when known
    pub total: Option<u64>,

    /// Human-readable message
    pub message: String,

    /// Seconds since the reporter was created
    pub elapsed_secs: f64,
}

impl ProgressEvent {
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|t| {
            if t > 0 {
                (self.current as f64 / t as f64) * 100.0
            } else {
                100.0
            }
        })
    }

    /// Format as a single status line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };

        let pct = self
            .percentage()
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress reporter that emits events through a callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// Reporter that only logs.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    fn emit(&self, phase: IndexPhase, current: u64, total: Option<u64>, message: String) {
        let event = ProgressEvent {
            phase,
            current,
            total,
            message,
            elapsed_secs: self.start_time.elapsed().as_secs_f64(),
        };

        tracing::debug!(
            phase = %event.phase,
            current = event.current,
            total = ?event.total,
            elapsed_secs = event.elapsed_secs,
            "{}",
            event.message
        );

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }

    pub fn extract(&self, name: &str, size_bytes: u64) {
        self.emit(
            IndexPhase::Extract,
            0,
            Some(size_bytes),
            format!("reading {}", name),
        );
    }

    pub fn chunk(&self, chunks_created: u64) {
        self.emit(
            IndexPhase::Chunk,
            chunks_created,
            Some(chunks_created),
            format!("{} chunks created", chunks_created),
        );
    }

    pub fn embed(&self, current: u64, total: u64, model: &str) {
        self.emit(
            IndexPhase::Embed,
            current,
            Some(total),
            format!("model={}", model),
        );
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}
