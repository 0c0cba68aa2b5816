//! Editor feedback hooks.
//!
//! The runtime reports sound status changes and played steps through a
//! [`Feedback`] implementation. A hook that panics is logged and skipped so a
//! faulty display can never stop playback.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::ast::InstanceId;
use crate::symbol::SoundStatus;

pub trait Feedback: Send + Sync {
    /// A sound entry moved to a new resolution state.
    fn on_status_changed(&self, _id: &str, _status: SoundStatus) {}

    /// A step of `instance` was scheduled to sound from `start` to `end`
    /// (audio clock seconds).
    fn on_step_visual_mark(&self, _instance: InstanceId, _start: f64, _end: f64) {}
}

impl<F: Feedback + ?Sized> Feedback for Arc<F> {
    fn on_status_changed(&self, id: &str, status: SoundStatus) {
        (**self).on_status_changed(id, status);
    }

    fn on_step_visual_mark(&self, instance: InstanceId, start: f64, end: f64) {
        (**self).on_step_visual_mark(instance, start, end);
    }
}

/// Discards all feedback.
pub struct NullFeedback;

impl Feedback for NullFeedback {}

/// Writes feedback to the tracing log.
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn on_status_changed(&self, id: &str, status: SoundStatus) {
        debug!(sound = id, %status, "sound status");
    }

    fn on_step_visual_mark(&self, instance: InstanceId, start: f64, end: f64) {
        trace!(%instance, start, end, "step");
    }
}

/// Shared, panic-isolating handle to a [`Feedback`] implementation.
#[derive(Clone)]
pub struct FeedbackHook {
    inner: Arc<dyn Feedback>,
    faults: Arc<AtomicUsize>,
}

impl FeedbackHook {
    pub fn new(feedback: impl Feedback + 'static) -> Self {
        Self {
            inner: Arc::new(feedback),
            faults: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn status_changed(&self, id: &str, status: SoundStatus) {
        self.guard("on_status_changed", || self.inner.on_status_changed(id, status));
    }

    pub fn step_visual_mark(&self, instance: InstanceId, start: f64, end: f64) {
        self.guard("on_step_visual_mark", || {
            self.inner.on_step_visual_mark(instance, start, end)
        });
    }

    /// Number of hook calls that panicked.
    pub fn faults(&self) -> usize {
        self.faults.load(Ordering::Relaxed)
    }

    fn guard(&self, hook: &'static str, f: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            self.faults.fetch_add(1, Ordering::Relaxed);
            warn!(hook, "feedback hook panicked");
        }
    }
}

impl Default for FeedbackHook {
    fn default() -> Self {
        Self::new(NullFeedback)
    }
}

impl std::fmt::Debug for FeedbackHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackHook")
            .field("faults", &self.faults())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Exploding;

    impl Feedback for Exploding {
        fn on_status_changed(&self, _id: &str, _status: SoundStatus) {
            panic!("display went away");
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<(String, SoundStatus)>>);

    impl Feedback for Recording {
        fn on_status_changed(&self, id: &str, status: SoundStatus) {
            self.0.lock().unwrap().push((id.to_string(), status));
        }
    }

    #[test]
    fn panicking_hook_is_contained() {
        let hook = FeedbackHook::new(Exploding);
        hook.status_changed("kick", SoundStatus::Available);
        hook.status_changed("kick", SoundStatus::Available);
        assert_eq!(hook.faults(), 2);
    }

    #[test]
    fn hook_forwards_calls() {
        let rec = Arc::new(Recording::default());
        let hook = FeedbackHook::new(rec.clone());
        hook.status_changed("snare", SoundStatus::Searching);
        assert_eq!(
            rec.0.lock().unwrap().as_slice(),
            &[("snare".to_string(), SoundStatus::Searching)]
        );
        assert_eq!(hook.faults(), 0);
    }
}
