use std::any::type_name;
use std::fmt::{self, Debug};

use crate::{Error, Result};

pub(crate) type CreateFn<C> = Box<dyn FnOnce() -> C>;
pub(crate) type TestFn<S> = Box<dyn Fn(&S) -> bool>;
pub(crate) type DestroyFn<S> = Box<dyn FnMut(&mut S)>;

/// Describes a service to register in a [`ServicePool`][crate::ServicePool].
///
/// A descriptor bundles the identifier of the service with its lifecycle callbacks:
///
/// * `on_add` (required) creates the service. The pool calls it exactly once, while adding.
/// * `on_test` (optional) reports whether the service is healthy.
/// * `on_destroy` (optional) releases the service. It runs while the service is still
///   registered; the pool unregisters and drops the service once it returns. If it panics, the
///   service stays registered and the next teardown attempt calls it again. Without it, the
///   service is simply dropped.
///
/// The type parameter `C` is what `on_add` returns. For [`ServicePool::add()`] this is the
/// service itself, for [`ServicePool::try_add()`] a `Result` of the service and for
/// [`ServicePool::add_async()`] a future resolving to such a `Result`.
///
/// A descriptor is only validated when it is submitted to the pool.
///
/// # Examples
///
/// ```
/// use service_pool::{ServiceDescriptor, ServicePool};
///
/// let descriptor = ServiceDescriptor::builder()
///     .id("primary")
///     .on_add(|| String::from("connection"))
///     .on_test(|conn: &String| !conn.is_empty())
///     .on_destroy(|conn: &mut String| println!("closing {conn}"))
///     .build();
///
/// let mut pool = ServicePool::new();
/// pool.add(descriptor).unwrap();
/// assert!(pool.contains(&"primary"));
/// ```
///
/// [`ServicePool::add()`]: crate::ServicePool::add
/// [`ServicePool::try_add()`]: crate::ServicePool::try_add
/// [`ServicePool::add_async()`]: crate::ServicePool::add_async
pub struct ServiceDescriptor<K, S, C = S> {
    id: Option<K>,
    on_add: Option<CreateFn<C>>,
    on_test: Option<TestFn<S>>,
    on_destroy: Option<DestroyFn<S>>,
}

impl<K, S, C> ServiceDescriptor<K, S, C> {
    /// Returns a builder for a service descriptor.
    #[must_use]
    pub fn builder() -> ServiceDescriptorBuilder<K, S, C> {
        ServiceDescriptorBuilder::new()
    }

    /// Creates a descriptor with only the required parts: an identifier and a creation function.
    #[must_use]
    pub fn new(id: K, on_add: impl FnOnce() -> C + 'static) -> Self {
        Self::builder().id(id).on_add(on_add).build()
    }

    /// The identifier the service will be registered under, if one was provided.
    #[must_use]
    pub fn id(&self) -> Option<&K> {
        self.id.as_ref()
    }

    /// Checks that the descriptor is complete and splits it into its parts.
    pub(crate) fn validate(self) -> Result<ValidDescriptor<K, S, C>>
    where
        K: Debug,
    {
        let Some(id) = self.id else {
            return Err(Error::MissingId);
        };

        let Some(on_add) = self.on_add else {
            return Err(Error::MissingOnAdd {
                id: format!("{id:?}"),
            });
        };

        Ok(ValidDescriptor {
            id,
            on_add,
            on_test: self.on_test,
            on_destroy: self.on_destroy,
        })
    }
}

impl<K: Debug, S, C> Debug for ServiceDescriptor<K, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("id", &self.id)
            .field("on_add", &self.on_add.is_some())
            .field("on_test", &self.on_test.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

/// A descriptor that passed validation. Consumed by the pool while adding.
pub(crate) struct ValidDescriptor<K, S, C> {
    pub(crate) id: K,
    pub(crate) on_add: CreateFn<C>,
    pub(crate) on_test: Option<TestFn<S>>,
    pub(crate) on_destroy: Option<DestroyFn<S>>,
}

/// Builder for creating an instance of [`ServiceDescriptor`].
///
/// The identifier and the `on_add` creation function are mandatory. They are not enforced here
/// but by the pool, which rejects an incomplete descriptor without modifying its contents.
///
/// # Examples
///
/// ```
/// use service_pool::ServiceDescriptor;
///
/// let descriptor = ServiceDescriptor::builder()
///     .id(42_u32)
///     .on_add(|| vec![1, 2, 3])
///     .on_destroy(|items: &mut Vec<i32>| items.clear())
///     .build();
///
/// assert_eq!(descriptor.id(), Some(&42));
/// ```
#[must_use]
pub struct ServiceDescriptorBuilder<K, S, C = S> {
    id: Option<K>,
    on_add: Option<CreateFn<C>>,
    on_test: Option<TestFn<S>>,
    on_destroy: Option<DestroyFn<S>>,
}

impl<K, S, C> ServiceDescriptorBuilder<K, S, C> {
    pub(crate) fn new() -> Self {
        Self {
            id: None,
            on_add: None,
            on_test: None,
            on_destroy: None,
        }
    }

    /// Sets the identifier the service is registered under.
    ///
    /// Adding a descriptor whose identifier is already registered replaces the existing service.
    pub fn id(mut self, id: K) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the function that creates the service.
    pub fn on_add(mut self, on_add: impl FnOnce() -> C + 'static) -> Self {
        self.on_add = Some(Box::new(on_add));
        self
    }

    /// Sets the function that reports whether the service is healthy.
    pub fn on_test(mut self, on_test: impl Fn(&S) -> bool + 'static) -> Self {
        self.on_test = Some(Box::new(on_test));
        self
    }

    /// Sets the function that releases the service when it leaves the pool.
    ///
    /// The function may be called more than once for the same service if an earlier call
    /// panicked.
    pub fn on_destroy(mut self, on_destroy: impl FnMut(&mut S) + 'static) -> Self {
        self.on_destroy = Some(Box::new(on_destroy));
        self
    }

    /// Builds the descriptor.
    pub fn build(self) -> ServiceDescriptor<K, S, C> {
        ServiceDescriptor {
            id: self.id,
            on_add: self.on_add,
            on_test: self.on_test,
            on_destroy: self.on_destroy,
        }
    }
}

impl<K: Debug, S, C> Debug for ServiceDescriptorBuilder<K, S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(type_name::<Self>())
            .field("id", &self.id)
            .field("on_add", &self.on_add.is_some())
            .field("on_test", &self.on_test.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn complete_descriptor_validates() {
        let descriptor = ServiceDescriptor::builder()
            .id("a")
            .on_add(|| 5_u32)
            .on_test(|value: &u32| *value == 5)
            .build();

        let valid = descriptor.validate().unwrap();

        assert_eq!(valid.id, "a");
        assert!(valid.on_test.is_some());
        assert!(valid.on_destroy.is_none());
        assert_eq!((valid.on_add)(), 5);
    }

    #[test]
    fn missing_id_is_rejected() {
        let descriptor = ServiceDescriptor::<&str, u32>::builder()
            .on_add(|| 5)
            .build();

        assert!(matches!(descriptor.validate(), Err(Error::MissingId)));
    }

    #[test]
    fn missing_on_add_is_rejected() {
        let descriptor = ServiceDescriptor::<&str, u32>::builder().id("a").build();

        match descriptor.validate() {
            Err(Error::MissingOnAdd { id }) => assert_eq!(id, "\"a\""),
            _ => panic!("expected MissingOnAdd"),
        }
    }

    #[test]
    fn missing_id_wins_over_missing_on_add() {
        let descriptor = ServiceDescriptor::<&str, u32>::builder().build();

        assert!(matches!(descriptor.validate(), Err(Error::MissingId)));
    }

    #[test]
    fn debug_shows_which_callbacks_are_set() {
        let descriptor = ServiceDescriptor::<_, u8>::new("a", || 1);

        let rendered = format!("{descriptor:?}");

        assert!(rendered.contains("\"a\""));
        assert!(rendered.contains("on_add: true"));
        assert!(rendered.contains("on_destroy: false"));
    }
}
