use std::sync::{Arc, Mutex, MutexGuard};

/// One lifecycle callback invocation, as seen by a [`LifecycleLog`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum LifecycleEvent {
    /// `on_add` was called for the service with this identifier.
    Created(String),

    /// `on_test` was called for the service with this identifier.
    Tested(String),

    /// `on_destroy` was called for the service with this identifier.
    Destroyed(String),
}

/// Records lifecycle callback invocations so tests can assert on how often and in which order
/// the pool called them.
///
/// Clones share the same record, so one clone can be moved into each callback.
///
/// # Example
///
/// ```rust
/// use testing::{LifecycleEvent, LifecycleLog};
///
/// let log = LifecycleLog::new();
///
/// let mut on_destroy = log.destroyer();
/// on_destroy(&mut "db".to_string());
///
/// assert_eq!(log.events(), vec![LifecycleEvent::Destroyed("db".to_string())]);
/// assert_eq!(log.destroyed("db"), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct LifecycleLog {
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl LifecycleLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn record(&self, event: LifecycleEvent) {
        self.lock().push(event);
    }

    /// All recorded events, in the order they happened.
    #[must_use]
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.lock().clone()
    }

    /// How many times the service with `id` was created.
    #[must_use]
    pub fn created(&self, id: &str) -> usize {
        self.count(|event| matches!(event, LifecycleEvent::Created(x) if x == id))
    }

    /// How many times the service with `id` was health-checked.
    #[must_use]
    pub fn tested(&self, id: &str) -> usize {
        self.count(|event| matches!(event, LifecycleEvent::Tested(x) if x == id))
    }

    /// How many times the service with `id` was torn down.
    #[must_use]
    pub fn destroyed(&self, id: &str) -> usize {
        self.count(|event| matches!(event, LifecycleEvent::Destroyed(x) if x == id))
    }

    /// Forgets all recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Returns an `on_add` function that records the creation and produces `id` as the service.
    #[must_use]
    pub fn creator(&self, id: &str) -> impl FnOnce() -> String + Send + 'static {
        let log = self.clone();
        let id = id.to_string();

        move || {
            log.record(LifecycleEvent::Created(id.clone()));
            id
        }
    }

    /// Returns an `on_test` function that records the check and reports every service healthy.
    #[must_use]
    pub fn tester(&self) -> impl Fn(&String) -> bool + Send + 'static {
        let log = self.clone();

        move |service: &String| {
            log.record(LifecycleEvent::Tested(service.clone()));
            true
        }
    }

    /// Returns an `on_destroy` function that records each teardown of the service.
    #[must_use]
    pub fn destroyer(&self) -> impl FnMut(&mut String) + Send + 'static {
        let log = self.clone();

        move |service: &mut String| log.record(LifecycleEvent::Destroyed(service.clone()))
    }

    fn count(&self, predicate: impl Fn(&LifecycleEvent) -> bool) -> usize {
        self.lock().iter().filter(|event| predicate(event)).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LifecycleEvent>> {
        self.events
            .lock()
            .expect("lifecycle log lock poisoned by a panicking test")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn callbacks_record_in_order() {
        let log = LifecycleLog::new();

        let mut service = log.creator("a")();
        assert!(log.tester()(&service));
        log.destroyer()(&mut service);

        assert_eq!(
            log.events(),
            vec![
                LifecycleEvent::Created("a".to_string()),
                LifecycleEvent::Tested("a".to_string()),
                LifecycleEvent::Destroyed("a".to_string()),
            ]
        );
        assert_eq!(log.created("a"), 1);
        assert_eq!(log.tested("a"), 1);
        assert_eq!(log.destroyed("a"), 1);
        assert_eq!(log.destroyed("b"), 0);
    }

    #[test]
    fn clones_share_record() {
        let log = LifecycleLog::new();
        let clone = log.clone();

        clone.record(LifecycleEvent::Created("x".to_string()));
        assert_eq!(log.created("x"), 1);

        log.clear();
        assert!(clone.events().is_empty());
    }
}
