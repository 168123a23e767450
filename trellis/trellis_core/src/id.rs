//! Strongly-typed identifiers for the Trellis runtime.
//!
//! Bundles, services and listeners are identified by numeric ids that are
//! assigned in strictly increasing order and never reused for the lifetime
//! of a framework instance. Each identifier type is a thin wrapper around a
//! `u64` with a phantom marker, so a `BundleId` can never be passed where a
//! `ServiceId` is expected.
//!
//! # Examples
//!
//! ```
//! use trellis_core::id::{BundleId, IdGenerator, BundleMarker};
//!
//! let ids: IdGenerator<BundleMarker> = IdGenerator::starting_at(1);
//! let first = ids.next();
//! let second = ids.next();
//!
//! assert_eq!(first.value(), 1);
//! assert!(second > first);
//! assert_eq!(BundleId::from_raw(2), second);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use uuid::Uuid;

/// A type-safe numeric identifier.
///
/// The phantom parameter `T` only distinguishes id families; it carries no
/// data, so `Id<T>` is `Copy` and totally ordered by its numeric value.
pub struct Id<T> {
    value: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    /// Wrap a raw numeric value.
    pub const fn from_raw(value: u64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    /// Get the underlying numeric value.
    pub const fn value(&self) -> u64 {
        self.value
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.value)
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> FromStr for Id<T> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_raw(s.trim().parse()?))
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.value)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::from_raw)
    }
}

/// Hands out monotonically increasing identifiers of one family.
///
/// Allocation is a single atomic increment, so concurrent callers always
/// receive distinct values and a value is never handed out twice.
pub struct IdGenerator<T> {
    next: AtomicU64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> IdGenerator<T> {
    /// Create a generator whose first id is `first`.
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
            _marker: PhantomData,
        }
    }

    /// Allocate the next identifier.
    pub fn next(&self) -> Id<T> {
        Id::from_raw(self.next.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// The identifier the next call to [`IdGenerator::next`] would return.
    pub fn peek(&self) -> Id<T> {
        Id::from_raw(self.next.load(AtomicOrdering::Relaxed))
    }
}

impl<T> fmt::Debug for IdGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("next", &self.next.load(AtomicOrdering::Relaxed))
            .finish()
    }
}

/// Marker type for bundles.
pub struct BundleMarker;
/// Identifier for a bundle. The system bundle is always id 0.
pub type BundleId = Id<BundleMarker>;

/// Marker type for service registrations.
pub struct ServiceMarker;
/// Identifier for a service registration.
pub type ServiceId = Id<ServiceMarker>;

/// Marker type for event listeners.
pub struct ListenerMarker;
/// Identifier for a registered bundle or service listener.
pub type ListenerId = Id<ListenerMarker>;

/// The id reserved for the system bundle.
pub const SYSTEM_BUNDLE_ID: BundleId = BundleId::from_raw(0);

/// Identity of one framework instance.
///
/// Unlike bundle and service ids this is globally unique, so that ids from
/// two frameworks running in the same process can be told apart in logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameworkId(Uuid);

impl FrameworkId {
    /// Create a new random framework id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for FrameworkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FrameworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
