//! Observation and control hooks for long renders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Render phase a progress report refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Render,
    Write,
}

/// Receiver of coarse progress milestones.
///
/// Reports are purely informational, a sink cannot influence the render.
/// `percent` is in `0..=100` and never decreases within a stage.
pub trait Progress: Sync {
    fn report(&self, stage: Stage, percent: u8);
}

/// Sink that discards every report
#[derive(Clone, Copy, Debug, Default)]
pub struct Silent;

impl Progress for Silent {
    fn report(&self, _stage: Stage, _percent: u8) {}
}

impl<F> Progress for F
where
    F: Fn(Stage, u8) + Sync,
{
    fn report(&self, stage: Stage, percent: u8) {
        self(stage, percent)
    }
}

/// Shared flag for cooperative cancellation.
///
/// Clones observe the same flag. The renderer polls it between blocks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let other = token.clone();

        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn closures_receive_reports() {
        let seen = Mutex::new(Vec::new());
        let sink = |stage: Stage, percent: u8| seen.lock().unwrap().push((stage, percent));

        sink.report(Stage::Render, 50);
        Silent.report(Stage::Write, 100);

        assert_eq!(*seen.lock().unwrap(), vec![(Stage::Render, 50)]);
    }
}
