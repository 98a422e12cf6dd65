use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use url::Url;

use super::SessionState;
use crate::observable::{Observable, ObservableReader};

#[derive(Debug, Default)]
struct Activity {
    attributed: HashSet<Url>,
    pending_diffs: usize,
}

/// Derives the session-wide [`SessionState`] from per-entry activity.
///
/// The session streams while any entry is attributed to a response. Once the
/// last attribution clears it only drops to `Idle` after every in-flight diff
/// recomputation has finished; a recomputation on its own never moves an
/// idle session back to streaming.
#[derive(Clone)]
pub struct ActivityTracker {
    activity: Arc<Mutex<Activity>>,
    state: Arc<Observable<SessionState>>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            activity: Arc::new(Mutex::new(Activity::default())),
            state: Arc::new(Observable::new(SessionState::Idle)),
        }
    }

    pub fn state(&self) -> ObservableReader<SessionState> {
        self.state.reader()
    }

    #[must_use]
    pub fn current(&self) -> SessionState {
        self.state.get()
    }

    pub fn set_attributed(&self, uri: &Url, attributed: bool) {
        let mut activity = self.activity.lock();
        let changed = if attributed {
            activity.attributed.insert(uri.clone())
        } else {
            activity.attributed.remove(uri)
        };
        if changed {
            self.publish(&activity);
        }
    }

    /// Marks a diff recomputation as in flight until the guard drops.
    #[must_use]
    pub fn begin_diff(&self) -> DiffGuard {
        self.activity.lock().pending_diffs += 1;
        DiffGuard {
            tracker: self.clone(),
        }
    }

    #[must_use]
    pub fn pending_diffs(&self) -> usize {
        self.activity.lock().pending_diffs
    }

    /// Forgets all activity and settles to `Idle`.
    pub fn reset(&self) {
        let mut activity = self.activity.lock();
        activity.attributed.clear();
        self.state.set(SessionState::Idle);
    }

    fn end_diff(&self) {
        let mut activity = self.activity.lock();
        activity.pending_diffs = activity.pending_diffs.saturating_sub(1);
        self.publish(&activity);
    }

    fn publish(&self, activity: &Activity) {
        if !activity.attributed.is_empty() {
            self.state.set(SessionState::StreamingEdits);
        } else if activity.pending_diffs == 0 {
            self.state.set(SessionState::Idle);
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the session out of `Idle` while a diff is being recomputed.
pub struct DiffGuard {
    tracker: ActivityTracker,
}

impl Drop for DiffGuard {
    fn drop(&mut self) {
        self.tracker.end_diff();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(name: &str) -> Url {
        Url::parse(&format!("file:///{}", name)).unwrap()
    }

    #[test]
    fn test_attribution_drives_state() {
        let tracker = ActivityTracker::new();
        assert_eq!(tracker.current(), SessionState::Idle);

        tracker.set_attributed(&uri("a"), true);
        tracker.set_attributed(&uri("b"), true);
        assert_eq!(tracker.current(), SessionState::StreamingEdits);

        tracker.set_attributed(&uri("a"), false);
        assert_eq!(tracker.current(), SessionState::StreamingEdits);

        tracker.set_attributed(&uri("b"), false);
        assert_eq!(tracker.current(), SessionState::Idle);
    }

    #[test]
    fn test_idle_waits_for_pending_diff() {
        let tracker = ActivityTracker::new();
        tracker.set_attributed(&uri("a"), true);

        let guard = tracker.begin_diff();
        tracker.set_attributed(&uri("a"), false);
        assert_eq!(tracker.current(), SessionState::StreamingEdits);
        assert_eq!(tracker.pending_diffs(), 1);

        drop(guard);
        assert_eq!(tracker.current(), SessionState::Idle);
        assert_eq!(tracker.pending_diffs(), 0);
    }

    #[test]
    fn test_diff_alone_keeps_idle() {
        let tracker = ActivityTracker::new();
        let guard = tracker.begin_diff();
        assert_eq!(tracker.current(), SessionState::Idle);
        drop(guard);
        assert_eq!(tracker.current(), SessionState::Idle);
    }

    #[test]
    fn test_reset() {
        let tracker = ActivityTracker::new();
        tracker.set_attributed(&uri("a"), true);
        tracker.reset();
        assert_eq!(tracker.current(), SessionState::Idle);
    }
}
