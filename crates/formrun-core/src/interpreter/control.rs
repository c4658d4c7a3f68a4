//! Cooperative stop and pause.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};

/// Handle for stopping or pausing a run from another task.
///
/// Requests are only observed at checkpoints: the top of every step and
/// loop iteration, inside waits, retry delays and decision polls. An action
/// already in flight is never aborted.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    stopped: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    awaiting: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Paused by the host or held for an operator decision.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst) || self.awaiting.load(Ordering::SeqCst)
    }

    /// Hold the run while a decision is outstanding. Independent of
    /// `pause`, so releasing the hold leaves a host pause in place.
    pub fn hold(&self) {
        self.awaiting.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.awaiting.store(false, Ordering::SeqCst);
    }

    /// Clear all flags for a new run.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.awaiting.store(false, Ordering::SeqCst);
    }

    /// Fail with `UserStop` if a stop was requested.
    pub fn check_stop(&self) -> EngineResult<()> {
        if self.is_stopped() {
            Err(EngineError::UserStop)
        } else {
            Ok(())
        }
    }

    /// Block while paused; fail with `UserStop` once stopped.
    pub async fn checkpoint(&self, poll: Duration) -> EngineResult<()> {
        loop {
            self.check_stop()?;
            if !self.is_paused() {
                return Ok(());
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Sleep for `duration`, observing stop requests every `poll`.
    pub async fn sleep(&self, duration: Duration, poll: Duration) -> EngineResult<()> {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            self.check_stop()?;
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(());
            }
            tokio::time::sleep((deadline - now).min(poll.max(Duration::from_millis(1)))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_and_reset() {
        let control = RunControl::new();
        let clone = control.clone();
        clone.stop();
        clone.pause();
        assert!(control.is_stopped());
        assert!(control.is_paused());
        assert!(matches!(control.check_stop(), Err(EngineError::UserStop)));

        control.reset();
        assert!(!clone.is_stopped());
        assert!(!clone.is_paused());
        assert!(control.check_stop().is_ok());
    }

    #[test]
    fn test_release_keeps_host_pause() {
        let control = RunControl::new();
        control.hold();
        assert!(control.is_paused());
        control.release();
        assert!(!control.is_paused());

        control.hold();
        control.pause();
        control.release();
        assert!(control.is_paused());

        control.hold();
        control.resume();
        assert!(control.is_paused());
        control.reset();
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn test_checkpoint_waits_for_resume() {
        let control = RunControl::new();
        control.pause();

        let remote = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.resume();
        });

        control.checkpoint(Duration::from_millis(1)).await.unwrap();
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn test_stop_breaks_pause() {
        let control = RunControl::new();
        control.pause();

        let remote = control.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.stop();
        });

        let result = control.checkpoint(Duration::from_millis(1)).await;
        assert!(matches!(result, Err(EngineError::UserStop)));
    }

    #[test]
    fn test_sleep_observes_stop() {
        let control = RunControl::new();
        control.stop();
        let result = tokio_test::block_on(
            control.sleep(Duration::from_secs(60), Duration::from_millis(1)),
        );
        assert!(matches!(result, Err(EngineError::UserStop)));
    }
}
