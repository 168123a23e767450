//! Registry entries and the references handed out for them.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI32, AtomicU8, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use trellis_core::id::{BundleId, ServiceId};
use trellis_core::types::{Properties, PropertyValue};

/// Type-erased service instance.
pub(crate) type ServiceObject = Arc<dyn Any + Send + Sync>;

const REGISTERED: u8 = 0;
const UNREGISTERING: u8 = 1;
const UNREGISTERED: u8 = 2;

/// One registration as stored in the registry.
///
/// Properties and ranking are only written while the registry's write lock
/// is held, so lookups under the read lock see them consistently.
pub(crate) struct ServiceEntry {
    pub(crate) id: ServiceId,
    pub(crate) bundle: BundleId,
    pub(crate) interfaces: Vec<String>,
    pub(crate) type_name: &'static str,
    state: AtomicU8,
    ranking: AtomicI32,
    properties: RwLock<Properties>,
    instance: RwLock<Option<ServiceObject>>,
}

impl ServiceEntry {
    pub(crate) fn new(
        id: ServiceId,
        bundle: BundleId,
        interfaces: Vec<String>,
        type_name: &'static str,
        properties: Properties,
        instance: ServiceObject,
    ) -> Self {
        Self {
            id,
            bundle,
            interfaces,
            type_name,
            state: AtomicU8::new(REGISTERED),
            ranking: AtomicI32::new(properties.ranking()),
            properties: RwLock::new(properties),
            instance: RwLock::new(Some(instance)),
        }
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.state.load(AtomicOrdering::Acquire) == REGISTERED
    }

    pub(crate) fn is_unregistered(&self) -> bool {
        self.state.load(AtomicOrdering::Acquire) == UNREGISTERED
    }

    /// Claim the entry for unregistration. Only one caller ever wins.
    pub(crate) fn begin_unregister(&self) -> bool {
        self.state
            .compare_exchange(
                REGISTERED,
                UNREGISTERING,
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
            )
            .is_ok()
    }

    /// Mark the entry gone and drop the registry's hold on the instance.
    pub(crate) fn finish_unregister(&self) {
        self.state.store(UNREGISTERED, AtomicOrdering::Release);
        *self.instance.write() = None;
    }

    pub(crate) fn ranking(&self) -> i32 {
        self.ranking.load(AtomicOrdering::Acquire)
    }

    pub(crate) fn properties(&self) -> Properties {
        self.properties.read().clone()
    }

    pub(crate) fn with_properties<R>(&self, f: impl FnOnce(&Properties) -> R) -> R {
        f(&self.properties.read())
    }

    /// Swap in new properties, returning the old ones.
    pub(crate) fn replace_properties(&self, properties: Properties) -> Properties {
        self.ranking.store(properties.ranking(), AtomicOrdering::Release);
        std::mem::replace(&mut *self.properties.write(), properties)
    }

    pub(crate) fn instance(&self) -> Option<ServiceObject> {
        self.instance.read().clone()
    }
}

/// A handle to a registered service.
///
/// References order by ranking, highest first, then by service id, lowest
/// first, so the best candidate for an interface sorts first. Holding a
/// reference never keeps a service registered: once the service is
/// unregistered the reference reports [`is_valid`](Self::is_valid) false
/// and dereferencing it fails.
#[derive(Clone)]
pub struct ServiceReference {
    entry: Arc<ServiceEntry>,
}

impl ServiceReference {
    pub(crate) fn new(entry: &Arc<ServiceEntry>) -> Self {
        Self {
            entry: Arc::clone(entry),
        }
    }

    pub(crate) fn entry(&self) -> &Arc<ServiceEntry> {
        &self.entry
    }

    /// The registry-assigned service id.
    pub fn id(&self) -> ServiceId {
        self.entry.id
    }

    /// The bundle that registered the service.
    pub fn bundle_id(&self) -> BundleId {
        self.entry.bundle
    }

    /// Interface names the service is published under.
    pub fn interfaces(&self) -> &[String] {
        &self.entry.interfaces
    }

    /// Current ranking.
    pub fn ranking(&self) -> i32 {
        self.entry.ranking()
    }

    /// Current value of one property.
    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.entry.with_properties(|p| p.get(key).cloned())
    }

    /// Snapshot of all current properties.
    pub fn properties(&self) -> Properties {
        self.entry.properties()
    }

    /// Name of the concrete type the service was registered with.
    pub fn type_name(&self) -> &'static str {
        self.entry.type_name
    }

    /// False once the service has been unregistered. Still true while
    /// UNREGISTERING listeners run.
    pub fn is_valid(&self) -> bool {
        !self.entry.is_unregistered()
    }
}

impl PartialEq for ServiceReference {
    fn eq(&self, other: &Self) -> bool {
        self.entry.id == other.entry.id
    }
}

impl Eq for ServiceReference {}

impl Hash for ServiceReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entry.id.hash(state);
    }
}

impl PartialOrd for ServiceReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceReference {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.entry.id == other.entry.id {
            return Ordering::Equal;
        }
        other
            .ranking()
            .cmp(&self.ranking())
            .then(self.entry.id.cmp(&other.entry.id))
    }
}

impl fmt::Debug for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReference")
            .field("id", &self.entry.id)
            .field("bundle", &self.entry.bundle)
            .field("interfaces", &self.entry.interfaces)
            .field("ranking", &self.ranking())
            .finish()
    }
}

impl fmt::Display for ServiceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.entry.id, self.entry.interfaces)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::SERVICE_RANKING;

    fn entry(id: u64, ranking: i32) -> Arc<ServiceEntry> {
        Arc::new(ServiceEntry::new(
            ServiceId::from_raw(id),
            BundleId::from_raw(1),
            vec!["X".to_string()],
            "u32",
            Properties::new().with(SERVICE_RANKING, ranking),
            Arc::new(id as u32),
        ))
    }

    #[test]
    fn test_reference_ordering() {
        let a = ServiceReference::new(&entry(1, 0));
        let b = ServiceReference::new(&entry(2, 10));
        let c = ServiceReference::new(&entry(3, 10));
        let d = ServiceReference::new(&entry(4, -5));

        let mut refs = vec![d.clone(), a.clone(), c.clone(), b.clone()];
        refs.sort();
        assert_eq!(refs, vec![b, c, a, d]);
    }

    #[test]
    fn test_unregister_lifecycle() {
        let e = entry(1, 0);
        let reference = ServiceReference::new(&e);

        assert!(e.begin_unregister());
        assert!(!e.begin_unregister(), "only one unregister may win");
        assert!(reference.is_valid());
        assert!(e.instance().is_some());

        e.finish_unregister();
        assert!(!reference.is_valid());
        assert!(e.instance().is_none());
    }
}
