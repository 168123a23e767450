//! Bundle contexts.
//!
//! A context is handed to a bundle's activator and is the bundle's only
//! way into the framework. It is valid for one activation: once the bundle
//! has stopped, every operation on it fails with an illegal-state error,
//! even if the bundle is started again later (which creates a new context).

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use trellis_core::error::{BundleError, Result, ServiceError};
use trellis_core::id::{BundleId, ListenerId};
use trellis_core::types::{Properties, PropertyValue};

use super::{Bundle, BundleData};
use crate::event::{BundleEvent, ServiceEvent};
use crate::filter::Filter;
use crate::registry::{ServiceReference, ServiceRegistration};
use crate::system::bootstrap::FrameworkShared;

struct ContextInner {
    bundle_id: BundleId,
    framework: Weak<FrameworkShared>,
    bundle: Weak<BundleData>,
    valid: AtomicBool,
}

/// A bundle's view of the framework.
///
/// Cloning yields another handle to the same context.
#[derive(Clone)]
pub struct BundleContext {
    inner: Arc<ContextInner>,
}

impl BundleContext {
    pub(crate) fn new(framework: Weak<FrameworkShared>, bundle: &Arc<BundleData>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                bundle_id: bundle.id,
                framework,
                bundle: Arc::downgrade(bundle),
                valid: AtomicBool::new(true),
            }),
        }
    }

    pub(crate) fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
    }

    fn resolve(&self) -> Result<(Arc<FrameworkShared>, Arc<BundleData>)> {
        let invalid = || BundleError::InvalidContext(self.inner.bundle_id);

        if !self.is_valid() {
            return Err(invalid().into());
        }
        let framework = self.inner.framework.upgrade().ok_or_else(invalid)?;
        let bundle = self.inner.bundle.upgrade().ok_or_else(invalid)?;
        Ok((framework, bundle))
    }

    /// Check if the context can still be used.
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    /// Id of the bundle this context belongs to. Available even after the
    /// context became invalid.
    pub fn bundle_id(&self) -> BundleId {
        self.inner.bundle_id
    }

    /// The bundle this context belongs to.
    pub fn bundle(&self) -> Result<Bundle> {
        let (framework, data) = self.resolve()?;
        Ok(Bundle::new(&framework, data))
    }

    /// Every installed bundle, in install order.
    pub fn bundles(&self) -> Result<Vec<Bundle>> {
        let (framework, _) = self.resolve()?;
        Ok(framework.bundles())
    }

    /// A framework launch property.
    pub fn get_property(&self, key: &str) -> Result<Option<PropertyValue>> {
        let (framework, _) = self.resolve()?;
        Ok(framework.properties.get(key).cloned())
    }

    /// Publish a service under one or more interface names.
    ///
    /// Only a STARTING, ACTIVE or STOPPING bundle may register services.
    /// The registration stays visible until it is unregistered or the
    /// bundle stops.
    pub fn register_service<T: Any + Send + Sync>(
        &self,
        interfaces: &[&str],
        service: Arc<T>,
        properties: Properties,
    ) -> Result<ServiceRegistration> {
        let (framework, data) = self.resolve()?;
        if !data.state().is_active() {
            return Err(ServiceError::BundleNotActive(data.id).into());
        }

        framework.registry.register(
            data.id,
            interfaces,
            service,
            std::any::type_name::<T>(),
            properties,
        )
    }

    /// Unregister a service this bundle registered.
    pub fn unregister_service(&self, registration: &ServiceRegistration) -> Result<()> {
        self.resolve()?;
        registration.unregister()
    }

    /// References to the services published under `interface` that match
    /// `filter`, best first. An empty filter matches everything.
    pub fn service_references(&self, interface: &str, filter: &str) -> Result<Vec<ServiceReference>> {
        let filter = Filter::parse_optional(filter)?;
        self.references_matching(Some(interface), filter.as_ref())
    }

    /// The best service published under `interface` that matches `filter`.
    pub fn service_reference(&self, interface: &str, filter: &str) -> Result<Option<ServiceReference>> {
        Ok(self.service_references(interface, filter)?.into_iter().next())
    }

    /// Lookup with a precompiled filter; `None` for `interface` searches
    /// every interface.
    pub fn references_matching(
        &self,
        interface: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Vec<ServiceReference>> {
        let (framework, _) = self.resolve()?;
        Ok(framework.registry.references(interface, filter))
    }

    /// Dereference a service, checking that it is a `T`.
    pub fn get_service<T: Any + Send + Sync>(&self, reference: &ServiceReference) -> Result<Arc<T>> {
        let (framework, _) = self.resolve()?;
        framework.registry.get_service(reference)
    }

    /// Listen to bundle events. The listener is removed when this bundle
    /// stops.
    pub fn add_bundle_listener<F>(&self, listener: F) -> Result<ListenerId>
    where
        F: Fn(&BundleEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let (framework, data) = self.resolve()?;
        Ok(framework.events.add_bundle_listener(data.id, Arc::new(listener)))
    }

    /// Listen to events of services matching `filter` (empty for all). The
    /// listener is removed when this bundle stops.
    pub fn add_service_listener<F>(&self, filter: &str, listener: F) -> Result<ListenerId>
    where
        F: Fn(&ServiceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let filter = Filter::parse_optional(filter)?;
        self.add_service_listener_with(filter, listener)
    }

    /// [`add_service_listener`](Self::add_service_listener) with a
    /// precompiled filter.
    pub fn add_service_listener_with<F>(&self, filter: Option<Filter>, listener: F) -> Result<ListenerId>
    where
        F: Fn(&ServiceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let (framework, data) = self.resolve()?;
        Ok(framework
            .events
            .add_service_listener(data.id, filter, Arc::new(listener)))
    }

    /// Remove a listener added through this context. Returns false if it
    /// was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> Result<bool> {
        let (framework, _) = self.resolve()?;
        Ok(framework.events.remove_listener(id))
    }
}

impl fmt::Debug for BundleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleContext")
            .field("bundle", &self.inner.bundle_id)
            .field("valid", &self.is_valid())
            .finish()
    }
}
