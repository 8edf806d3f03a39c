use std::fmt;
use std::num::NonZero;

use new_zealand::nz;

/// The maximum number of services a pool holds when no explicit maximum is configured.
pub const DEFAULT_MAX_SERVICES: NonZero<usize> = nz!(10);

/// How many services a [`ServicePool`][crate::ServicePool] may hold at the same time.
///
/// A bounded pool evicts its oldest service when a new one is added at capacity.
///
/// # Examples
///
/// ```
/// use new_zealand::nz;
/// use service_pool::Capacity;
///
/// assert_eq!(Capacity::from_max(0), Capacity::Unbounded);
/// assert_eq!(Capacity::from_max(-5), Capacity::Unbounded);
/// assert_eq!(Capacity::from_max(3), Capacity::Bounded(nz!(3)));
///
/// // Absent or non-numeric values fall back to the default maximum.
/// assert_eq!(Capacity::from_option(None), Capacity::default());
/// assert_eq!(Capacity::parse_or_default("lots"), Capacity::default());
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Capacity {
    /// Any number of services may be stored; nothing is ever evicted.
    Unbounded,

    /// At most this many services may be stored.
    Bounded(NonZero<usize>),
}

impl Capacity {
    /// Interprets a raw `max` option: zero or negative means unbounded, anything else is the bound.
    #[must_use]
    pub fn from_max(max: i64) -> Self {
        if max <= 0 {
            return Self::Unbounded;
        }

        // Only reachable on targets where usize is narrower than i64.
        let bound = usize::try_from(max).unwrap_or(usize::MAX);

        NonZero::new(bound).map_or(Self::Unbounded, Self::Bounded)
    }

    /// Like [`from_max()`][Self::from_max] but an absent value selects the default capacity.
    #[must_use]
    pub fn from_option(max: Option<i64>) -> Self {
        max.map_or_else(Self::default, Self::from_max)
    }

    /// Parses a textual `max` option, falling back to the default capacity if the value is
    /// not an integer.
    #[must_use]
    pub fn parse_or_default(max: &str) -> Self {
        max.trim()
            .parse::<i64>()
            .map_or_else(|_| Self::default(), Self::from_max)
    }

    /// The raw maximum: the bound for a bounded capacity, zero for an unbounded one.
    #[must_use]
    pub fn max(self) -> usize {
        match self {
            Self::Unbounded => 0,
            Self::Bounded(bound) => bound.get(),
        }
    }

    /// Whether this capacity limits the number of services.
    #[must_use]
    pub fn is_bounded(self) -> bool {
        matches!(self, Self::Bounded(_))
    }

    /// Whether a pool currently holding `len` services must evict before it can add another.
    pub(crate) fn is_full(self, len: usize) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Bounded(bound) => len >= bound.get(),
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Self::Bounded(DEFAULT_MAX_SERVICES)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Bounded(bound) => write!(f, "{bound}"),
        }
    }
}

/// A snapshot of the configuration a [`ServicePool`][crate::ServicePool] was built with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct ServicePoolConfig {
    max: Capacity,
}

impl ServicePoolConfig {
    pub(crate) fn new(max: Capacity) -> Self {
        Self { max }
    }

    /// The capacity of the pool.
    #[must_use]
    pub fn max(&self) -> Capacity {
        self.max
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn non_positive_max_is_unbounded() {
        assert_eq!(Capacity::from_max(0), Capacity::Unbounded);
        assert_eq!(Capacity::from_max(-1), Capacity::Unbounded);
        assert_eq!(Capacity::from_max(i64::MIN), Capacity::Unbounded);
    }

    #[test]
    fn positive_max_is_bounded() {
        assert_eq!(Capacity::from_max(1), Capacity::Bounded(nz!(1)));
        assert_eq!(Capacity::from_max(2).max(), 2);
        assert!(Capacity::from_max(2).is_bounded());
    }

    #[test]
    fn absent_or_garbage_uses_default() {
        assert_eq!(Capacity::from_option(None), Capacity::Bounded(DEFAULT_MAX_SERVICES));
        assert_eq!(Capacity::from_option(Some(4)), Capacity::Bounded(nz!(4)));
        assert_eq!(Capacity::parse_or_default("two"), Capacity::default());
        assert_eq!(Capacity::parse_or_default(""), Capacity::default());
        assert_eq!(Capacity::parse_or_default(" 7 "), Capacity::Bounded(nz!(7)));
        assert_eq!(Capacity::parse_or_default("0"), Capacity::Unbounded);
    }

    #[test]
    fn fullness() {
        assert!(!Capacity::Unbounded.is_full(usize::MAX));
        assert!(!Capacity::Bounded(nz!(2)).is_full(1));
        assert!(Capacity::Bounded(nz!(2)).is_full(2));
        assert!(Capacity::Bounded(nz!(2)).is_full(3));
    }

    #[test]
    fn display() {
        assert_eq!(Capacity::Unbounded.to_string(), "unbounded");
        assert_eq!(Capacity::Bounded(nz!(5)).to_string(), "5");
        assert_eq!(Capacity::Unbounded.max(), 0);
    }
}
