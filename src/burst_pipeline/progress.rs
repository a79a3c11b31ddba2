//! Progress reporting and cooperative cancellation.
//!
//! The pipeline reports `{stage, fraction}` events through a capability
//! trait so the core stays decoupled from any UI. Cancellation is a shared
//! flag checked between tiles and frames, never mid-tile.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receiver for pipeline progress events.
///
/// `fraction` is the completed share of the named stage in [0, 1].
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, stage: &str, fraction: f32);
}

impl<F> ProgressSink for F
where
    F: Fn(&str, f32) + Send + Sync,
{
    fn on_progress(&self, stage: &str, fraction: f32) {
        self(stage, fraction)
    }
}

/// Sink that discards all events.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_progress(&self, _stage: &str, _fraction: f32) {}
}

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
