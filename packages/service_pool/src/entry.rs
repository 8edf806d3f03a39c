use crate::Health;
use crate::descriptor::{DestroyFn, TestFn};

/// A live service together with its lifecycle callbacks, as stored in the pool.
pub(crate) struct Entry<S> {
    service: S,
    on_test: Option<TestFn<S>>,
    on_destroy: Option<DestroyFn<S>>,

    // Position in the pool's insertion order. Lower is older.
    sequence: u64,
}

impl<S> Entry<S> {
    pub(crate) fn new(
        service: S,
        on_test: Option<TestFn<S>>,
        on_destroy: Option<DestroyFn<S>>,
        sequence: u64,
    ) -> Self {
        Self {
            service,
            on_test,
            on_destroy,
            sequence,
        }
    }

    pub(crate) fn service(&self) -> &S {
        &self.service
    }

    pub(crate) fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn test(&self) -> Health {
        self.on_test
            .as_ref()
            .map_or(Health::Unknown, |on_test| Health::from(on_test(&self.service)))
    }

    /// Runs the teardown callback, if any, against the service in place.
    ///
    /// The entry stays intact, so the caller decides when to unlink it. If the callback panics,
    /// the entry is left exactly as it was and a later teardown calls the callback again.
    pub(crate) fn tear_down(&mut self) {
        if let Some(on_destroy) = self.on_destroy.as_mut() {
            on_destroy(&mut self.service);
        }
    }
}
