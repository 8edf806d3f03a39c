use std::any::type_name;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::marker::PhantomData;

use crate::{Capacity, ServicePool};

/// Builder for creating an instance of [`ServicePool`].
///
/// The only setting is the capacity of the pool, given as a raw `max` value: zero or negative
/// means unbounded, positive is the maximum number of live services. If no maximum is set, the
/// pool holds up to [`DEFAULT_MAX_SERVICES`][crate::DEFAULT_MAX_SERVICES] services.
///
/// # Examples
///
/// ```
/// use service_pool::{Capacity, ServicePool};
///
/// // Default capacity.
/// let pool: ServicePool<&str, u32> = ServicePool::builder().build();
/// assert_eq!(pool.config().max(), Capacity::default());
///
/// // At most two services.
/// let pool: ServicePool<&str, u32> = ServicePool::builder().max(2).build();
/// assert_eq!(pool.config().max().max(), 2);
///
/// // A value read from somewhere untyped. Garbage falls back to the default.
/// let pool: ServicePool<&str, u32> = ServicePool::builder().max_str("many").build();
/// assert_eq!(pool.config().max(), Capacity::default());
/// ```
#[must_use]
pub struct ServicePoolBuilder<K, S> {
    capacity: Capacity,

    _types: PhantomData<fn() -> (K, S)>,
}

impl<K, S> ServicePoolBuilder<K, S> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: Capacity::default(),
            _types: PhantomData,
        }
    }

    /// Sets the maximum number of live services. Zero or negative means unbounded.
    ///
    /// # Examples
    ///
    /// ```
    /// use service_pool::{Capacity, ServicePool};
    ///
    /// let pool: ServicePool<u8, u8> = ServicePool::builder().max(-1).build();
    /// assert_eq!(pool.config().max(), Capacity::Unbounded);
    /// ```
    pub fn max(mut self, max: i64) -> Self {
        self.capacity = Capacity::from_max(max);
        self
    }

    /// Sets the maximum number of live services from an optional value. `None` selects the
    /// default capacity.
    pub fn max_option(mut self, max: Option<i64>) -> Self {
        self.capacity = Capacity::from_option(max);
        self
    }

    /// Sets the maximum number of live services from text. A value that is not an integer
    /// selects the default capacity.
    pub fn max_str(mut self, max: &str) -> Self {
        self.capacity = Capacity::parse_or_default(max);
        self
    }

    /// Sets the capacity directly.
    pub fn capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds the service pool with the specified configuration.
    #[must_use]
    pub fn build(self) -> ServicePool<K, S>
    where
        K: Eq + Hash + Clone + Debug,
    {
        ServicePool::new_inner(self.capacity)
    }
}

impl<K, S> Debug for ServicePoolBuilder<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use new_zealand::nz;
    use static_assertions::assert_impl_all;

    use super::*;

    // The builder carries no services, so it can move freely even when the pool cannot.
    assert_impl_all!(ServicePoolBuilder<String, std::rc::Rc<u8>>: Send, Sync);

    #[test]
    fn last_setting_wins() {
        let pool: ServicePool<u8, u8> = ServicePool::builder().max(3).max_option(None).build();

        assert_eq!(pool.config().max(), Capacity::default());

        let pool: ServicePool<u8, u8> = ServicePool::builder()
            .max_str("nonsense")
            .capacity(Capacity::Bounded(nz!(4)))
            .build();

        assert_eq!(pool.config().max().max(), 4);
    }

    #[test]
    fn max_option_some() {
        let pool: ServicePool<u8, u8> = ServicePool::builder().max_option(Some(0)).build();

        assert_eq!(pool.config().max(), Capacity::Unbounded);
    }
}
