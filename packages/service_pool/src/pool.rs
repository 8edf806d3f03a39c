use std::any::type_name;
use std::collections::BTreeMap;
use std::collections::hash_map::Entry as MapEntry;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::result::Result as StdResult;

use foldhash::{HashMap, HashMapExt};
use tracing::{debug, trace};

use crate::descriptor::{DestroyFn, TestFn, ValidDescriptor};
use crate::entry::Entry;
use crate::{
    AddError, Capacity, Health, Result, ServiceDescriptor, ServicePoolBuilder, ServicePoolConfig,
};

/// A registry of live services, keyed by identifier, with a bounded capacity.
///
/// The pool creates each service by calling the `on_add` function of its
/// [`ServiceDescriptor`], can report on service health via `on_test` and releases services via
/// `on_destroy` when they leave the pool.
///
/// # Capacity and eviction
///
/// When a service is added to a pool that is already at capacity, the service that has been in
/// the pool the longest is torn down first. Eviction is strictly by insertion order; reading a
/// service via [`get()`][Self::get] does not refresh its position.
///
/// # Replacement
///
/// Adding a service under an identifier that is already registered first tears down the existing
/// service. There is never more than one live service per identifier.
///
/// # Teardown
///
/// Services leave the pool via [`destroy()`][Self::destroy], eviction, [`reset()`][Self::reset]
/// or when the pool itself is dropped. In every case `on_destroy` is called with the service if
/// the descriptor provided one, and only then is the service unregistered and dropped.
///
/// If `on_destroy` panics, the service stays registered under its identifier and a later
/// [`destroy()`][Self::destroy] or [`reset()`][Self::reset] calls `on_destroy` again.
///
/// # Thread safety
///
/// The pool is single-threaded. All mutation goes through `&mut self`, which already rules out
/// an eviction observing a half-added service.
///
/// # Example
///
/// ```rust
/// use service_pool::{Health, ServiceDescriptor, ServicePool};
///
/// let mut pool = ServicePool::builder().max(2).build();
///
/// for id in ["id111", "id222", "id333"] {
///     pool.add(
///         ServiceDescriptor::builder()
///             .id(id)
///             .on_add(move || format!("connection for {id}"))
///             .on_test(|conn: &String| conn.starts_with("connection"))
///             .build(),
///     )
///     .unwrap();
/// }
///
/// // The oldest service was evicted to make room for the third one.
/// assert_eq!(pool.len(), 2);
/// assert!(pool.get(&"id111").is_none());
/// assert_eq!(pool.active_ids(), vec!["id222", "id333"]);
///
/// assert_eq!(pool.test(&"id333"), Some(Health::Healthy));
/// assert!(pool.destroy(&"id333"));
/// assert!(!pool.destroy(&"id333"));
/// ```
pub struct ServicePool<K, S> {
    capacity: Capacity,

    entries: HashMap<K, Entry<S>>,

    // Insertion sequence number -> identifier. The first key is the oldest live service.
    order: BTreeMap<u64, K>,

    next_sequence: u64,
}

impl<K, S> ServicePool<K, S>
where
    K: Eq + Hash + Clone + Debug,
{
    /// Creates a new pool with the default capacity of
    /// [`DEFAULT_MAX_SERVICES`][crate::DEFAULT_MAX_SERVICES].
    ///
    /// Use [`ServicePool::builder()`] to configure a different capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for creating a [`ServicePool`] with custom configuration.
    ///
    /// # Example
    ///
    /// ```rust
    /// use service_pool::{Capacity, ServicePool};
    ///
    /// let pool: ServicePool<String, u32> = ServicePool::builder().max(0).build();
    ///
    /// assert_eq!(pool.config().max(), Capacity::Unbounded);
    /// ```
    pub fn builder() -> ServicePoolBuilder<K, S> {
        ServicePoolBuilder::new()
    }

    pub(crate) fn new_inner(capacity: Capacity) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Returns a snapshot of the configuration of the pool.
    #[must_use]
    pub fn config(&self) -> ServicePoolConfig {
        ServicePoolConfig::new(self.capacity)
    }

    /// The number of live services in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool has no live services.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the identifiers of the live services, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    /// Returns the identifiers of the live services, oldest first.
    #[must_use]
    pub fn active_ids(&self) -> Vec<K> {
        self.ids().cloned().collect()
    }

    /// Whether a service is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &K) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the service registered under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &K) -> Option<&S> {
        trace!(id = ?id, "looking up service");

        self.entries.get(id).map(Entry::service)
    }

    /// Returns exclusive access to the service registered under `id`, if any.
    #[must_use]
    pub fn get_mut(&mut self, id: &K) -> Option<&mut S> {
        self.entries.get_mut(id).map(Entry::service_mut)
    }

    /// Runs the health check of the service registered under `id`.
    ///
    /// Returns `None` if no service is registered under `id` and [`Health::Unknown`] if the
    /// service was registered without an `on_test` function.
    #[must_use]
    pub fn test(&self, id: &K) -> Option<Health> {
        let health = self.entries.get(id).map(Entry::test);

        trace!(id = ?id, health = ?health, "tested service");

        health
    }

    /// Tears down and removes the service registered under `id`.
    ///
    /// Returns `false` if there was no such service. Destroying an absent service is not an
    /// error, so this is safe to call repeatedly.
    pub fn destroy(&mut self, id: &K) -> bool {
        if !self.entries.contains_key(id) {
            debug!(id = ?id, "no service to destroy");
            return false;
        }

        debug!(id = ?id, "destroying service");

        self.tear_down_and_remove(id)
    }

    /// Tears down and removes every service in the pool, oldest first.
    ///
    /// Returns the number of services that were destroyed.
    pub fn reset(&mut self) -> usize {
        let mut destroyed = 0;

        for id in self.active_ids() {
            if self.tear_down_and_remove(&id) {
                destroyed += 1;
            }
        }

        debug!(destroyed, "reset service pool");

        destroyed
    }

    /// Creates a service from `descriptor` and registers it, returning a reference to it.
    ///
    /// Before the service is created:
    ///
    /// 1. The descriptor is validated. An incomplete descriptor is rejected and the pool is left
    ///    exactly as it was.
    /// 2. Any service already registered under the same identifier is torn down.
    /// 3. If the pool is at capacity, the oldest service is torn down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingId`][crate::Error::MissingId] or
    /// [`Error::MissingOnAdd`][crate::Error::MissingOnAdd] if the descriptor is incomplete.
    ///
    /// # Example
    ///
    /// ```rust
    /// use service_pool::{ServiceDescriptor, ServicePool};
    ///
    /// let mut pool = ServicePool::new();
    ///
    /// let value = pool.add(ServiceDescriptor::new("answer", || 42)).unwrap();
    /// assert_eq!(*value, 42);
    ///
    /// let incomplete = ServiceDescriptor::<&str, i32>::builder().id("answer").build();
    /// assert!(pool.add(incomplete).is_err());
    ///
    /// // The rejected descriptor did not replace the existing service.
    /// assert_eq!(pool.get(&"answer"), Some(&42));
    /// ```
    pub fn add(&mut self, descriptor: ServiceDescriptor<K, S>) -> Result<&S> {
        let descriptor = self.admit(descriptor)?;
        let service = (descriptor.on_add)();

        Ok(self.store(descriptor.id, service, descriptor.on_test, descriptor.on_destroy))
    }

    /// Like [`add()`][Self::add] but for creation functions that can fail.
    ///
    /// If `on_add` returns an error, it is handed back unchanged in [`AddError::Create`] and no
    /// service is stored. Replacement and eviction have already happened by then.
    ///
    /// # Errors
    ///
    /// Returns [`AddError::Invalid`] if the descriptor is incomplete and [`AddError::Create`]
    /// if the service could not be created.
    pub fn try_add<E>(
        &mut self,
        descriptor: ServiceDescriptor<K, S, StdResult<S, E>>,
    ) -> StdResult<&S, AddError<E>> {
        let descriptor = self.admit(descriptor)?;

        let service = (descriptor.on_add)().map_err(|error| {
            debug!(id = ?descriptor.id, "service creation failed");
            AddError::Create(error)
        })?;

        Ok(self.store(descriptor.id, service, descriptor.on_test, descriptor.on_destroy))
    }

    /// Like [`try_add()`][Self::try_add] but for creation functions that are asynchronous.
    ///
    /// Validation, replacement and eviction happen synchronously when the returned future is
    /// first polled, before `on_add` is called. The new service becomes visible in the pool only
    /// once its creation has completed successfully. The pool stays exclusively borrowed until
    /// then, so no other operation can observe the service while it is being created.
    ///
    /// If the returned future is dropped before it completes, no service is stored.
    ///
    /// # Errors
    ///
    /// Returns [`AddError::Invalid`] if the descriptor is incomplete and [`AddError::Create`]
    /// if the service could not be created.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::convert::Infallible;
    ///
    /// use service_pool::{ServiceDescriptor, ServicePool};
    /// # use futures::executor::block_on;
    ///
    /// # block_on(async {
    /// let mut pool = ServicePool::new();
    ///
    /// let descriptor = ServiceDescriptor::new("db", || async { Ok::<_, Infallible>(5_u32) });
    /// let service = pool.add_async(descriptor).await.unwrap();
    ///
    /// assert_eq!(*service, 5);
    /// # });
    /// ```
    pub async fn add_async<F, E>(
        &mut self,
        descriptor: ServiceDescriptor<K, S, F>,
    ) -> StdResult<&S, AddError<E>>
    where
        F: Future<Output = StdResult<S, E>>,
    {
        let descriptor = self.admit(descriptor)?;
        let id = descriptor.id;

        let service = match (descriptor.on_add)().await {
            Ok(service) => service,
            Err(error) => {
                debug!(id = ?id, "asynchronous service creation failed");
                return Err(AddError::Create(error));
            }
        };

        Ok(self.store(id, service, descriptor.on_test, descriptor.on_destroy))
    }

    /// Validates a descriptor and makes room for it, by replacement and then eviction.
    fn admit<C>(
        &mut self,
        descriptor: ServiceDescriptor<K, S, C>,
    ) -> Result<ValidDescriptor<K, S, C>> {
        let descriptor = descriptor.validate().inspect_err(|error| {
            debug!(%error, "rejected service descriptor");
        })?;

        let replaced = self.tear_down_and_remove(&descriptor.id);

        let evicted = if self.capacity.is_full(self.entries.len()) {
            self.evict_oldest()
        } else {
            None
        };

        debug!(id = ?descriptor.id, replaced, evicted = ?evicted, "admitting service");

        Ok(descriptor)
    }

    /// Tears down the oldest live service, returning its identifier.
    fn evict_oldest(&mut self) -> Option<K> {
        let id = self.order.first_key_value().map(|(_, id)| id.clone())?;

        debug!(id = ?id, capacity = %self.capacity, "evicting oldest service");

        self.tear_down_and_remove(&id).then_some(id)
    }

    /// Runs the teardown of the service registered under `id` and only then removes it from
    /// both the map and the insertion order. Returns `false` if there was no such service.
    ///
    /// A panic in the teardown unwinds out of here before anything is removed.
    fn tear_down_and_remove(&mut self, id: &K) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            return false;
        };

        entry.tear_down();

        if let Some(entry) = self.entries.remove(id) {
            self.order.remove(&entry.sequence());
        }

        true
    }

    fn store(
        &mut self,
        id: K,
        service: S,
        on_test: Option<TestFn<S>>,
        on_destroy: Option<DestroyFn<S>>,
    ) -> &S {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        self.order.insert(sequence, id.clone());

        let entry = Entry::new(service, on_test, on_destroy, sequence);

        match self.entries.entry(id) {
            MapEntry::Occupied(mut occupied) => {
                // admit() always frees the slot and nothing can refill it while we hold
                // `&mut self`, so this is only reachable if a caller-supplied Hash/Eq is
                // inconsistent. Keep the newest service and tear down the displaced one.
                let mut displaced = occupied.insert(entry);
                self.order.remove(&displaced.sequence());
                displaced.tear_down();
                occupied.into_mut().service()
            }
            MapEntry::Vacant(vacant) => vacant.insert(entry).service(),
        }
    }
}

impl<K, S> ServicePool<K, S> {
    /// Tears down every service, oldest first, as the pool goes away.
    ///
    /// Needs no bounds on `K`, which `Drop` cannot require.
    fn tear_down_all(&mut self) {
        let mut entries = self.entries.drain().map(|(_, entry)| entry).collect::<Vec<_>>();
        entries.sort_unstable_by_key(Entry::sequence);
        self.order.clear();

        for mut entry in entries {
            entry.tear_down();
        }
    }
}

impl<K, S> Default for ServicePool<K, S>
where
    K: Eq + Hash + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, S> Drop for ServicePool<K, S> {
    fn drop(&mut self) {
        self.tear_down_all();
    }
}

impl<K, S> Debug for ServicePool<K, S> {
    #[cfg_attr(test, mutants::skip)] // Debug output is not part of the contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::panic::{self, AssertUnwindSafe};
    use std::rc::Rc;

    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::Error;

    // Callbacks are not required to be thread-safe, so neither is the pool.
    assert_not_impl_any!(ServicePool<String, u32>: Send, Sync);

    type Log = Rc<RefCell<Vec<String>>>;

    fn tracked(id: &'static str, log: &Log) -> ServiceDescriptor<&'static str, String> {
        let created = Rc::clone(log);
        let destroyed = Rc::clone(log);

        ServiceDescriptor::builder()
            .id(id)
            .on_add(move || {
                created.borrow_mut().push(format!("add {id}"));
                id.to_string()
            })
            .on_destroy(move |service: &mut String| {
                destroyed.borrow_mut().push(format!("destroy {service}"));
            })
            .build()
    }

    // A service whose first teardown attempt panics and whose later attempts succeed.
    fn fails_first_teardown(
        id: &'static str,
        attempts: &Rc<Cell<u32>>,
    ) -> ServiceDescriptor<&'static str, u32> {
        let attempts = Rc::clone(attempts);

        ServiceDescriptor::builder()
            .id(id)
            .on_add(|| 1_u32)
            .on_destroy(move |_: &mut u32| {
                attempts.set(attempts.get() + 1);

                if attempts.get() == 1 {
                    panic!("teardown of {id} failed");
                }
            })
            .build()
    }

    #[test]
    fn smoke_test() {
        let mut pool = ServicePool::new();

        assert!(pool.is_empty());

        let service = pool.add(ServiceDescriptor::new("a", || 1_u32)).unwrap();
        assert_eq!(*service, 1);

        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&"a"));
        assert_eq!(pool.get(&"a"), Some(&1));
        assert_eq!(pool.get(&"b"), None);

        assert!(pool.destroy(&"a"));
        assert!(pool.is_empty());
    }

    #[test]
    fn default_capacity() {
        let pool = ServicePool::<u8, u8>::default();

        assert_eq!(pool.config().max(), Capacity::default());
    }

    #[test]
    fn evicts_in_insertion_order() {
        let log = Log::default();
        let mut pool = ServicePool::builder().max(2).build();

        pool.add(tracked("a", &log)).unwrap();
        pool.add(tracked("b", &log)).unwrap();
        pool.add(tracked("c", &log)).unwrap();

        assert_eq!(pool.active_ids(), vec!["b", "c"]);

        pool.add(tracked("d", &log)).unwrap();

        assert_eq!(pool.active_ids(), vec!["c", "d"]);
        assert_eq!(
            *log.borrow(),
            vec!["add a", "add b", "destroy a", "add c", "destroy b", "add d"]
        );
    }

    #[test]
    fn get_does_not_refresh_eviction_order() {
        let mut pool = ServicePool::builder().max(2).build();

        pool.add(ServiceDescriptor::new("a", || 1)).unwrap();
        pool.add(ServiceDescriptor::new("b", || 2)).unwrap();

        _ = pool.get(&"a");
        _ = pool.test(&"a");

        pool.add(ServiceDescriptor::new("c", || 3)).unwrap();

        assert!(!pool.contains(&"a"));
        assert!(pool.contains(&"b"));
    }

    #[test]
    fn replacement_destroys_before_create() {
        let log = Log::default();
        let mut pool = ServicePool::builder().max(2).build();

        pool.add(tracked("a", &log)).unwrap();
        pool.add(tracked("b", &log)).unwrap();
        pool.add(tracked("a", &log)).unwrap();

        assert_eq!(pool.len(), 2);
        // Replacement freed a slot, so nothing was evicted and "a" is now the newest.
        assert_eq!(pool.active_ids(), vec!["b", "a"]);
        assert_eq!(
            *log.borrow(),
            vec!["add a", "add b", "destroy a", "add a"]
        );
    }

    #[test]
    fn rejected_descriptor_changes_nothing() {
        let log = Log::default();
        let mut pool = ServicePool::builder().max(1).build();

        pool.add(tracked("a", &log)).unwrap();

        let no_on_add = ServiceDescriptor::<&str, String>::builder().id("a").build();
        match pool.add(no_on_add) {
            Err(Error::MissingOnAdd { id }) => assert_eq!(id, "\"a\""),
            _ => panic!("expected MissingOnAdd"),
        }

        let no_id = ServiceDescriptor::<&str, String>::builder()
            .on_add(String::new)
            .build();
        assert!(matches!(pool.add(no_id), Err(Error::MissingId)));

        assert_eq!(pool.active_ids(), vec!["a"]);
        assert_eq!(*log.borrow(), vec!["add a"]);
    }

    #[test]
    fn unbounded_never_evicts() {
        let mut pool = ServicePool::builder().max(0).build();

        for i in 0..100_u32 {
            pool.add(ServiceDescriptor::new(i, move || i)).unwrap();
        }

        assert_eq!(pool.len(), 100);
        assert_eq!(pool.ids().next(), Some(&0));
    }

    #[test]
    fn test_reports_health() {
        let mut pool = ServicePool::new();

        pool.add(
            ServiceDescriptor::builder()
                .id("checked")
                .on_add(|| 0_i32)
                .on_test(|value: &i32| *value > 0)
                .build(),
        )
        .unwrap();
        pool.add(ServiceDescriptor::new("unchecked", || 1)).unwrap();

        assert_eq!(pool.test(&"checked"), Some(Health::Unhealthy));
        assert_eq!(pool.test(&"unchecked"), Some(Health::Unknown));
        assert_eq!(pool.test(&"missing"), None);

        *pool.get_mut(&"checked").unwrap() = 5;
        assert_eq!(pool.test(&"checked"), Some(Health::Healthy));
    }

    #[test]
    fn destroy_is_idempotent() {
        let log = Log::default();
        let mut pool = ServicePool::new();

        pool.add(tracked("a", &log)).unwrap();

        assert!(pool.destroy(&"a"));
        assert!(!pool.destroy(&"a"));
        assert!(!pool.destroy(&"never"));

        assert_eq!(*log.borrow(), vec!["add a", "destroy a"]);
    }

    #[test]
    fn reset_destroys_everything() {
        let log = Log::default();
        let mut pool = ServicePool::builder().max(0).build();

        pool.add(tracked("a", &log)).unwrap();
        pool.add(tracked("b", &log)).unwrap();

        assert_eq!(pool.reset(), 2);
        assert!(pool.is_empty());
        assert_eq!(pool.ids().count(), 0);
        assert_eq!(pool.reset(), 0);

        assert_eq!(
            *log.borrow(),
            vec!["add a", "add b", "destroy a", "destroy b"]
        );
    }

    #[test]
    fn drop_destroys_remaining() {
        let log = Log::default();

        {
            let mut pool = ServicePool::new();
            pool.add(tracked("a", &log)).unwrap();
            pool.add(tracked("b", &log)).unwrap();
            assert!(pool.destroy(&"a"));
        }

        assert_eq!(
            *log.borrow(),
            vec!["add a", "add b", "destroy a", "destroy b"]
        );
    }

    #[test]
    fn panicking_teardown_keeps_service_registered() {
        let attempts = Rc::new(Cell::new(0));
        let mut pool = ServicePool::new();

        pool.add(fails_first_teardown("a", &attempts)).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| pool.destroy(&"a")));

        assert!(result.is_err());
        assert!(pool.contains(&"a"));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.active_ids(), vec!["a"]);

        // The next attempt runs the teardown again and this time completes.
        assert!(pool.destroy(&"a"));
        assert!(pool.is_empty());
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn panicking_eviction_keeps_oldest_registered() {
        let attempts = Rc::new(Cell::new(0));
        let mut pool = ServicePool::builder().max(1).build();

        pool.add(fails_first_teardown("a", &attempts)).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pool.add(ServiceDescriptor::new("b", || 2_u32)).is_ok()
        }));

        assert!(result.is_err());
        assert_eq!(pool.active_ids(), vec!["a"]);

        pool.add(ServiceDescriptor::new("b", || 2_u32)).unwrap();

        assert_eq!(pool.active_ids(), vec!["b"]);
        assert_eq!(attempts.get(), 2);
    }

    #[test]
    fn panicking_reset_keeps_remaining_services() {
        let attempts = Rc::new(Cell::new(0));
        let mut pool = ServicePool::builder().max(0).build();

        pool.add(fails_first_teardown("a", &attempts)).unwrap();
        pool.add(ServiceDescriptor::new("b", || 2_u32)).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| pool.reset()));

        assert!(result.is_err());
        assert_eq!(pool.active_ids(), vec!["a", "b"]);

        assert_eq!(pool.reset(), 2);
        assert!(pool.is_empty());
    }

    #[test]
    fn try_add_failure_stores_nothing() {
        let mut pool = ServicePool::builder().max(1).build();

        pool.add(ServiceDescriptor::new("a", || 1_u32)).unwrap();

        let failing = ServiceDescriptor::new("b", || Err::<u32, _>("refused"));
        match pool.try_add(failing) {
            Err(AddError::Create(error)) => assert_eq!(error, "refused"),
            _ => panic!("expected creation failure"),
        }

        // Eviction happened before creation was attempted.
        assert!(pool.is_empty());

        let working = ServiceDescriptor::new("b", || Ok::<u32, &str>(2));
        assert_eq!(pool.try_add(working).ok(), Some(&2));
    }

    #[test]
    fn debug_is_summary() {
        let mut pool = ServicePool::builder().max(3).build();
        pool.add(ServiceDescriptor::new("a", || 1_u8)).unwrap();

        let rendered = format!("{pool:?}");

        assert!(rendered.contains("len: 1"));
    }
}
