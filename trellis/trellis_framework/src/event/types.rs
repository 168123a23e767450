//! Bundle and service event values.
//!
//! Events are immutable, produced synchronously on the thread that caused
//! them and discarded once every listener has seen them.

use std::fmt;

use trellis_core::id::{BundleId, ServiceId};
use trellis_core::types::Properties;

use crate::bundle::Bundle;
use crate::registry::ServiceReference;

/// Kind of a bundle lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleEventKind {
    /// The bundle was installed.
    Installed,

    /// The bundle's requirements were resolved.
    Resolved,

    /// The bundle is about to run its activator's `start`.
    Starting,

    /// The bundle's activator started successfully.
    Started,

    /// The bundle is about to run its activator's `stop`.
    Stopping,

    /// The bundle stopped and its services were released.
    Stopped,

    /// The bundle went back from RESOLVED to INSTALLED.
    Unresolved,

    /// The bundle's activator or descriptor was replaced.
    Updated,

    /// The bundle was uninstalled.
    Uninstalled,
}

impl BundleEventKind {
    /// Get the name of this event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "INSTALLED",
            Self::Resolved => "RESOLVED",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Unresolved => "UNRESOLVED",
            Self::Updated => "UPDATED",
            Self::Uninstalled => "UNINSTALLED",
        }
    }
}

impl fmt::Display for BundleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bundle lifecycle event.
#[derive(Clone)]
pub struct BundleEvent {
    kind: BundleEventKind,
    bundle: Bundle,
}

impl BundleEvent {
    pub(crate) fn new(kind: BundleEventKind, bundle: Bundle) -> Self {
        Self { kind, bundle }
    }

    /// What happened.
    pub fn kind(&self) -> BundleEventKind {
        self.kind
    }

    /// The bundle the event is about.
    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    /// Shorthand for `bundle().id()`.
    pub fn bundle_id(&self) -> BundleId {
        self.bundle.id()
    }
}

impl fmt::Debug for BundleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BundleEvent")
            .field("kind", &self.kind)
            .field("bundle", &self.bundle.id())
            .finish()
    }
}

/// Kind of a service registry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceEventKind {
    /// The service was registered.
    Registered,

    /// The service's properties changed.
    Modified,

    /// The service's properties changed and no longer match the
    /// receiving listener's filter, although they matched before.
    ModifiedEndMatch,

    /// The service is about to be unregistered. It can still be
    /// dereferenced while this event is delivered.
    Unregistering,
}

impl ServiceEventKind {
    /// Get the name of this event kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "REGISTERED",
            Self::Modified => "MODIFIED",
            Self::ModifiedEndMatch => "MODIFIED_ENDMATCH",
            Self::Unregistering => "UNREGISTERING",
        }
    }
}

impl fmt::Display for ServiceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service registry event.
///
/// Carries the registration's properties as they were when the event was
/// emitted, independent of later updates.
#[derive(Clone)]
pub struct ServiceEvent {
    kind: ServiceEventKind,
    reference: ServiceReference,
    properties: Properties,
}

impl ServiceEvent {
    pub(crate) fn new(
        kind: ServiceEventKind,
        reference: ServiceReference,
        properties: Properties,
    ) -> Self {
        Self {
            kind,
            reference,
            properties,
        }
    }

    pub(crate) fn with_kind(&self, kind: ServiceEventKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// What happened.
    pub fn kind(&self) -> ServiceEventKind {
        self.kind
    }

    /// The service the event is about.
    pub fn reference(&self) -> &ServiceReference {
        &self.reference
    }

    /// Shorthand for `reference().id()`.
    pub fn service_id(&self) -> ServiceId {
        self.reference.id()
    }

    /// Properties at the moment of emission.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl fmt::Debug for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEvent")
            .field("kind", &self.kind)
            .field("service", &self.reference.id())
            .field("properties", &self.properties)
            .finish()
    }
}
