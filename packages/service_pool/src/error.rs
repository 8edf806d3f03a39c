use thiserror::Error;

/// Errors that can occur when a service descriptor is submitted to a [`ServicePool`].
///
/// These are raised before the pool is touched: a rejected descriptor never causes an existing
/// service to be replaced or evicted.
///
/// [`ServicePool`]: crate::ServicePool
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The descriptor was built without an identifier, so there is no key to store it under.
    #[error("invalid service descriptor: no identifier was provided")]
    MissingId,

    /// The descriptor has no creation function, so there is no way to produce the service.
    #[error("service descriptor for {id} is missing its on_add function")]
    MissingOnAdd {
        /// The identifier of the rejected descriptor, rendered with its `Debug` representation.
        id: String,
    },
}

/// The error returned by the fallible and asynchronous forms of [`ServicePool::add`].
///
/// The creation function's own error is passed through as-is in [`AddError::Create`]; the pool
/// does not wrap or reinterpret it.
///
/// [`ServicePool::add`]: crate::ServicePool::add
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AddError<E> {
    /// The descriptor was rejected before anything was created.
    #[error(transparent)]
    Invalid(#[from] Error),

    /// The creation function reported a failure. No service was stored.
    #[error("service creation failed")]
    Create(#[source] E),
}

impl<E> AddError<E> {
    /// Returns the creation function's error, if that is what this error is.
    #[must_use]
    pub fn into_create_error(self) -> Option<E> {
        match self {
            Self::Create(inner) => Some(inner),
            Self::Invalid(_) => None,
        }
    }
}

/// A specialized `Result` type for service pool operations, returning the crate's
/// [`Error`] type as the error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;
