/// The outcome of [`ServicePool::test()`][crate::ServicePool::test] for a registered service.
///
/// A service registered without a health check reports [`Health::Unknown`] instead of guessing.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Health {
    /// The health check reported the service as usable.
    Healthy,

    /// The health check reported the service as unusable.
    Unhealthy,

    /// The service has no health check, so its state cannot be determined.
    Unknown,
}

impl Health {
    /// Whether the health check positively reported the service as usable.
    #[must_use]
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

impl From<bool> for Health {
    fn from(healthy: bool) -> Self {
        if healthy {
            Self::Healthy
        } else {
            Self::Unhealthy
        }
    }
}
