//! Handles returned to the registering bundle.

use std::fmt;
use std::sync::{Arc, Weak};

use trellis_core::error::{Result, ServiceError};
use trellis_core::id::ServiceId;
use trellis_core::types::Properties;

use super::reference::{ServiceEntry, ServiceReference};
use super::{RegistryInner, ServiceRegistry};

/// The registering side of a service.
///
/// Only the holder of the registration can update the service's properties
/// or unregister it. Clones share the same registration.
#[derive(Clone)]
pub struct ServiceRegistration {
    registry: Weak<RegistryInner>,
    entry: Arc<ServiceEntry>,
}

impl ServiceRegistration {
    pub(crate) fn new(registry: Weak<RegistryInner>, entry: Arc<ServiceEntry>) -> Self {
        Self { registry, entry }
    }

    fn registry(&self) -> Result<ServiceRegistry> {
        self.registry
            .upgrade()
            .map(ServiceRegistry::from_inner)
            .ok_or_else(|| ServiceError::Unregistered(self.entry.id).into())
    }

    /// The registry-assigned service id.
    pub fn id(&self) -> ServiceId {
        self.entry.id
    }

    /// A reference to the registered service.
    ///
    /// Fails with an illegal-state error once the service is unregistered.
    pub fn reference(&self) -> Result<ServiceReference> {
        if self.entry.is_unregistered() {
            return Err(ServiceError::Unregistered(self.entry.id).into());
        }
        Ok(ServiceReference::new(&self.entry))
    }

    /// Check if the service is still registered.
    pub fn is_registered(&self) -> bool {
        self.entry.is_registered()
    }

    /// Replace the service's properties and raise `MODIFIED`.
    ///
    /// `objectclass`, `service.id` and `service.bundleid` keep their
    /// registry-assigned values; `service.ranking` is re-read.
    pub fn set_properties(&self, properties: Properties) -> Result<()> {
        self.registry()?.update_properties(&self.entry, properties)
    }

    /// Unregister the service.
    ///
    /// `UNREGISTERING` is delivered while the service can still be
    /// dereferenced; afterwards no lookup returns it. Unregistering twice
    /// fails with an illegal-state error.
    pub fn unregister(&self) -> Result<()> {
        self.registry()?.unregister(&self.entry)
    }
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("id", &self.entry.id)
            .field("registered", &self.entry.is_registered())
            .finish()
    }
}
