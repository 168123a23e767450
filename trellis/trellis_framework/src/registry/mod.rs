//! Service Registry
//!
//! Maps registered service instances to their interface names, properties
//! and owning bundle, and answers ranked, filtered lookups.
//!
//! Lookups take the registry's read lock and mutations its write lock, so
//! a lookup sees a registration either completely or not at all. Events
//! for a mutation are delivered after the lock is released, which lets
//! listeners call back into the registry, including unregistering the very
//! service they are being told about.

pub mod reference;
pub mod registration;

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use trellis_core::error::{Result, ServiceError};
use trellis_core::id::{BundleId, IdGenerator, ServiceId, ServiceMarker};
use trellis_core::types::{
    Properties, OBJECTCLASS, SERVICE_BUNDLE_ID, SERVICE_ID, SERVICE_RANKING,
};

use crate::event::{EventDispatcher, ServiceEvent, ServiceEventKind};
use crate::filter::Filter;

pub use reference::ServiceReference;
pub use registration::ServiceRegistration;

use reference::{ServiceEntry, ServiceObject};

#[derive(Default)]
struct RegistryState {
    /// Every live registration
    services: HashMap<ServiceId, Arc<ServiceEntry>>,

    /// Interface name to the services published under it
    by_interface: HashMap<String, BTreeSet<ServiceId>>,

    /// Bundle to the services it registered
    by_bundle: HashMap<BundleId, BTreeSet<ServiceId>>,

    /// Bundles whose services have been released; they cannot register
    /// until they are activated again
    closed: HashSet<BundleId>,
}

impl RegistryState {
    fn insert(&mut self, entry: Arc<ServiceEntry>) -> Result<()> {
        if self.closed.contains(&entry.bundle) {
            return Err(ServiceError::BundleNotActive(entry.bundle).into());
        }

        for interface in &entry.interfaces {
            self.by_interface
                .entry(interface.clone())
                .or_default()
                .insert(entry.id);
        }
        self.by_bundle.entry(entry.bundle).or_default().insert(entry.id);
        self.services.insert(entry.id, entry);
        Ok(())
    }

    fn remove(&mut self, entry: &ServiceEntry) {
        for interface in &entry.interfaces {
            if let Some(ids) = self.by_interface.get_mut(interface) {
                ids.remove(&entry.id);
                if ids.is_empty() {
                    self.by_interface.remove(interface);
                }
            }
        }
        if let Some(ids) = self.by_bundle.get_mut(&entry.bundle) {
            ids.remove(&entry.id);
            if ids.is_empty() {
                self.by_bundle.remove(&entry.bundle);
            }
        }
        self.services.remove(&entry.id);
    }
}

pub(crate) struct RegistryInner {
    state: RwLock<RegistryState>,
    ids: IdGenerator<ServiceMarker>,
    events: EventDispatcher,
}

/// The shared service registry.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
}

impl ServiceRegistry {
    /// Create an empty registry that raises its events through `events`
    pub fn new(events: EventDispatcher) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                state: RwLock::new(RegistryState::default()),
                ids: IdGenerator::starting_at(1),
                events,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    /// Register a service on behalf of `bundle`.
    ///
    /// Raises `REGISTERED` once the registration is visible to lookups.
    pub(crate) fn register(
        &self,
        bundle: BundleId,
        interfaces: &[&str],
        instance: ServiceObject,
        type_name: &'static str,
        properties: Properties,
    ) -> Result<ServiceRegistration> {
        let interfaces = normalize_interfaces(interfaces)?;
        let id = self.inner.ids.next();
        let properties = standard_properties(id, bundle, &interfaces, properties);

        let entry = Arc::new(ServiceEntry::new(
            id,
            bundle,
            interfaces,
            type_name,
            properties.clone(),
            instance,
        ));

        self.inner.state.write().insert(Arc::clone(&entry))?;
        debug!(
            "Registered service {} {:?} for bundle {}",
            id, entry.interfaces, bundle
        );

        let event = ServiceEvent::new(
            ServiceEventKind::Registered,
            ServiceReference::new(&entry),
            properties,
        );
        self.inner.events.fire_service_event(&event, None);

        Ok(ServiceRegistration::new(Arc::downgrade(&self.inner), entry))
    }

    pub(crate) fn unregister(&self, entry: &Arc<ServiceEntry>) -> Result<()> {
        if !entry.begin_unregister() {
            return Err(ServiceError::Unregistered(entry.id).into());
        }

        let event = ServiceEvent::new(
            ServiceEventKind::Unregistering,
            ServiceReference::new(entry),
            entry.properties(),
        );
        self.inner.events.fire_service_event(&event, None);

        {
            let mut state = self.inner.state.write();
            state.remove(entry);
            entry.finish_unregister();
        }
        debug!("Unregistered service {}", entry.id);

        Ok(())
    }

    pub(crate) fn update_properties(
        &self,
        entry: &Arc<ServiceEntry>,
        properties: Properties,
    ) -> Result<()> {
        let properties = standard_properties(entry.id, entry.bundle, &entry.interfaces, properties);

        let previous = {
            let _state = self.inner.state.write();
            if !entry.is_registered() {
                return Err(ServiceError::Unregistered(entry.id).into());
            }
            entry.replace_properties(properties.clone())
        };
        debug!("Modified properties of service {}", entry.id);

        let event = ServiceEvent::new(
            ServiceEventKind::Modified,
            ServiceReference::new(entry),
            properties,
        );
        self.inner.events.fire_service_event(&event, Some(&previous));

        Ok(())
    }

    /// Let `bundle` register services again after
    /// [`unregister_all`](Self::unregister_all).
    pub(crate) fn reopen(&self, bundle: BundleId) {
        self.inner.state.write().closed.remove(&bundle);
    }

    /// Unregister every service `bundle` still owns, lowest id first, and
    /// refuse further registrations from it until it is reopened.
    /// Returns how many were unregistered by this call.
    pub(crate) fn unregister_all(&self, bundle: BundleId) -> usize {
        let entries: Vec<Arc<ServiceEntry>> = {
            let mut state = self.inner.state.write();
            state.closed.insert(bundle);
            state
                .by_bundle
                .get(&bundle)
                .map(|ids| ids.iter().filter_map(|id| state.services.get(id).cloned()).collect())
                .unwrap_or_default()
        };

        // Entries another thread unregistered in the meantime are skipped.
        entries
            .iter()
            .filter(|entry| self.unregister(entry).is_ok())
            .count()
    }

    /// All live services published under `interface` (or under any
    /// interface when `None`) whose properties satisfy `filter`, best first.
    pub fn references(&self, interface: Option<&str>, filter: Option<&Filter>) -> Vec<ServiceReference> {
        let state = self.inner.state.read();

        let candidates: Vec<&Arc<ServiceEntry>> = match interface {
            Some(name) => state
                .by_interface
                .get(name)
                .map(|ids| ids.iter().filter_map(|id| state.services.get(id)).collect())
                .unwrap_or_default(),
            None => state.services.values().collect(),
        };

        let mut references: Vec<ServiceReference> = candidates
            .into_iter()
            .filter(|entry| filter.map_or(true, |f| entry.with_properties(|p| f.matches(p))))
            .map(ServiceReference::new)
            .collect();
        references.sort();
        references
    }

    /// The best service for `interface` satisfying `filter`, if any.
    pub fn reference(&self, interface: &str, filter: Option<&Filter>) -> Option<ServiceReference> {
        self.references(Some(interface), filter).into_iter().next()
    }

    /// Services currently registered by `bundle`, best first.
    pub fn registered_by(&self, bundle: BundleId) -> Vec<ServiceReference> {
        let state = self.inner.state.read();
        let mut references: Vec<ServiceReference> = state
            .by_bundle
            .get(&bundle)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.services.get(id))
                    .map(ServiceReference::new)
                    .collect()
            })
            .unwrap_or_default();
        references.sort();
        references
    }

    /// Dereference a service, checking its concrete type.
    pub fn get_service<T: Any + Send + Sync>(&self, reference: &ServiceReference) -> Result<Arc<T>> {
        let entry = reference.entry();
        let instance = entry
            .instance()
            .ok_or(ServiceError::Unregistered(entry.id))?;

        instance.downcast::<T>().map_err(|_| {
            ServiceError::TypeMismatch {
                id: entry.id,
                expected: std::any::type_name::<T>(),
                actual: entry.type_name,
            }
            .into()
        })
    }

    /// Number of live registrations.
    pub fn len(&self) -> usize {
        self.inner.state.read().services.len()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize_interfaces(interfaces: &[&str]) -> Result<Vec<String>> {
    if interfaces.is_empty() {
        return Err(ServiceError::NoInterfaces.into());
    }

    let mut names: Vec<String> = Vec::with_capacity(interfaces.len());
    for name in interfaces {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::EmptyInterfaceName.into());
        }
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Overlay the registry-owned properties onto caller-supplied ones.
fn standard_properties(
    id: ServiceId,
    bundle: BundleId,
    interfaces: &[String],
    mut properties: Properties,
) -> Properties {
    let ranking = properties.ranking();
    properties.insert(OBJECTCLASS, interfaces.to_vec());
    properties.insert(SERVICE_ID, id.value());
    properties.insert(SERVICE_BUNDLE_ID, bundle.value());
    properties.insert(SERVICE_RANKING, ranking);
    properties
}
