//! Loading/error bookkeeping shared by every operation family.
//!
//! Each family (auth, catalog, lists) owns one [`StatusTracker`]. An
//! operation calls [`StatusTracker::begin`] before its first await; the
//! returned [`InFlight`] guard clears the loading flag when dropped, so
//! every exit path (success, error, early return) finalizes the status.

use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
pub struct Status<E> {
    in_flight: usize,
    error: Option<E>,
}

impl<E> Default for Status<E> {
    fn default() -> Self {
        Self {
            in_flight: 0,
            error: None,
        }
    }
}

impl<E> Status<E> {
    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn error(&self) -> Option<&E> {
        self.error.as_ref()
    }
}

pub struct StatusTracker<E> {
    tx: watch::Sender<Status<E>>,
}

impl<E: Clone> Default for StatusTracker<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> StatusTracker<E> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self { tx }
    }

    /// Resets the error and marks one more operation as running.
    pub fn begin(&self) -> InFlight<'_, E> {
        self.tx.send_modify(|s| {
            s.in_flight += 1;
            s.error = None;
        });
        InFlight { tracker: self }
    }

    pub fn snapshot(&self) -> Status<E> {
        self.tx.borrow().clone()
    }

    pub fn loading(&self) -> bool {
        self.tx.borrow().loading()
    }

    pub fn error(&self) -> Option<E> {
        self.tx.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Status<E>> {
        self.tx.subscribe()
    }
}

#[must_use = "dropping the guard immediately ends the operation"]
pub struct InFlight<'a, E: Clone> {
    tracker: &'a StatusTracker<E>,
}

impl<E: Clone> InFlight<'_, E> {
    /// Records `err` as the family's last error.
    pub fn fail(&self, err: &E) {
        let err = err.clone();
        self.tracker.tx.send_modify(|s| s.error = Some(err));
    }

    /// Convenience for `Result` tails: records the error, passes the result through.
    pub fn finish<T>(self, result: Result<T, E>) -> Result<T, E> {
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }
}

impl<E: Clone> Drop for InFlight<'_, E> {
    fn drop(&mut self) {
        self.tracker
            .tx
            .send_modify(|s| s.in_flight = s.in_flight.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_clears_loading_on_drop() {
        let tracker: StatusTracker<String> = StatusTracker::new();
        {
            let _op = tracker.begin();
            assert!(tracker.loading());
        }
        assert!(!tracker.loading());
    }

    #[test]
    fn test_begin_resets_previous_error() {
        let tracker: StatusTracker<String> = StatusTracker::new();
        let op = tracker.begin();
        let _ = op.finish::<()>(Err("boom".to_string()));
        assert_eq!(tracker.error().as_deref(), Some("boom"));

        let _op = tracker.begin();
        assert!(tracker.error().is_none());
    }

    #[test]
    fn test_overlapping_operations_keep_loading() {
        let tracker: StatusTracker<String> = StatusTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        drop(first);
        assert!(tracker.loading());
        drop(second);
        assert!(!tracker.loading());
    }

    #[tokio::test]
    async fn test_subscribers_see_completion() {
        let tracker: StatusTracker<String> = StatusTracker::new();
        let mut rx = tracker.subscribe();
        let op = tracker.begin();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().loading());
        drop(op);
        rx.changed().await.unwrap();
        assert!(!rx.borrow().loading());
    }
}
