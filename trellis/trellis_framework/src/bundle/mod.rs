//! Bundle Lifecycle
//!
//! Every installed bundle moves through the state machine
//!
//! ```text
//!   INSTALLED --resolve--> RESOLVED --start--> STARTING --> ACTIVE
//!       ^                   |    ^                 |           |
//!       +----unresolve------+    |                 v         stop
//!                                +--------------- STOPPING <---+
//! ```
//!
//! and can be uninstalled from any state but UNINSTALLED. Transitions of
//! one bundle are serialized; transitions of different bundles proceed
//! independently. Every transition raises a bundle event.

pub mod activator;
pub mod context;
mod lifecycle;

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use trellis_core::error::{BundleError, Result};
use trellis_core::id::{BundleId, SYSTEM_BUNDLE_ID};
use trellis_core::types::{BundleDescriptor, BundleState, Properties};
use trellis_core::utils::Version;

use crate::registry::ServiceReference;
use crate::system::bootstrap::FrameworkShared;

pub use activator::{BundleActivator, FnActivator, NoopActivator};
pub use context::BundleContext;

pub(crate) use lifecycle::install;

/// Per-bundle state shared by every handle to the bundle.
pub(crate) struct BundleData {
    pub(crate) id: BundleId,
    descriptor: RwLock<BundleDescriptor>,
    state: RwLock<BundleState>,
    activator: Mutex<Box<dyn BundleActivator>>,

    /// Held for the whole of a transition. Re-entrant so that listeners
    /// and activators running inside a transition can inspect the bundle;
    /// a nested transition is rejected by the state check instead.
    pub(crate) transition: ReentrantMutex<()>,

    /// Context of the current activation, if any.
    pub(crate) context: Mutex<Option<BundleContext>>,
}

impl BundleData {
    pub(crate) fn new(
        id: BundleId,
        descriptor: BundleDescriptor,
        state: BundleState,
        activator: Box<dyn BundleActivator>,
    ) -> Self {
        Self {
            id,
            descriptor: RwLock::new(descriptor),
            state: RwLock::new(state),
            activator: Mutex::new(activator),
            transition: ReentrantMutex::new(()),
            context: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> BundleState {
        *self.state.read()
    }

    pub(crate) fn symbolic_name(&self) -> String {
        self.descriptor.read().symbolic_name.clone()
    }

    pub(crate) fn version(&self) -> Version {
        self.descriptor.read().version.clone()
    }

    pub(crate) fn set_context(&self, context: Option<BundleContext>) {
        *self.context.lock() = context;
    }
}

/// A handle to an installed bundle.
///
/// Handles stay usable after the bundle is uninstalled: queries keep
/// answering with the last known identity and state, and lifecycle
/// operations fail with an illegal-state error.
#[derive(Clone)]
pub struct Bundle {
    framework: Weak<FrameworkShared>,
    data: Arc<BundleData>,
}

impl Bundle {
    pub(crate) fn new(framework: &Arc<FrameworkShared>, data: Arc<BundleData>) -> Self {
        Self {
            framework: Arc::downgrade(framework),
            data,
        }
    }

    pub(crate) fn data(&self) -> &Arc<BundleData> {
        &self.data
    }

    fn framework(&self) -> Result<Arc<FrameworkShared>> {
        self.framework
            .upgrade()
            .ok_or_else(|| BundleError::FrameworkStopped.into())
    }

    /// The bundle's id.
    pub fn id(&self) -> BundleId {
        self.data.id
    }

    /// Check if this is the system bundle.
    pub fn is_system(&self) -> bool {
        self.data.id == SYSTEM_BUNDLE_ID
    }

    /// The bundle's symbolic name.
    pub fn symbolic_name(&self) -> String {
        self.data.symbolic_name()
    }

    /// The bundle's version.
    pub fn version(&self) -> Version {
        self.data.version()
    }

    /// A copy of the bundle's descriptor.
    pub fn descriptor(&self) -> BundleDescriptor {
        self.data.descriptor.read().clone()
    }

    /// The descriptor's free-form headers.
    pub fn headers(&self) -> Properties {
        self.data.descriptor.read().headers.clone()
    }

    /// The bundle's current state.
    pub fn state(&self) -> BundleState {
        self.data.state()
    }

    /// The context of the current activation, while there is one.
    pub fn context(&self) -> Option<BundleContext> {
        self.data.context.lock().clone()
    }

    /// Services this bundle currently has registered, best first.
    pub fn registered_services(&self) -> Vec<ServiceReference> {
        match self.framework() {
            Ok(framework) => framework.registry.registered_by(self.data.id),
            Err(_) => Vec::new(),
        }
    }

    /// Resolve the bundle's requirements, moving it from INSTALLED to
    /// RESOLVED. Does nothing in any other live state.
    pub fn resolve(&self) -> Result<()> {
        let framework = self.framework()?;
        let _transition = self.data.transition.lock();

        match self.state() {
            BundleState::Uninstalled => Err(BundleError::Uninstalled(self.id()).into()),
            BundleState::Installed => self.resolve_locked(&framework),
            _ => Ok(()),
        }
    }

    /// Start the bundle.
    ///
    /// An INSTALLED bundle is resolved first. The activator's `start` runs
    /// on the calling thread; if it fails the bundle ends up RESOLVED and
    /// the failure is returned. Starting an ACTIVE bundle does nothing.
    pub fn start(&self) -> Result<()> {
        let framework = self.framework()?;
        let _transition = self.data.transition.lock();

        match self.state() {
            BundleState::Uninstalled => return Err(BundleError::Uninstalled(self.id()).into()),
            BundleState::Active => return Ok(()),
            state @ (BundleState::Starting | BundleState::Stopping) => {
                return Err(self.invalid_state(state, "start"))
            }
            BundleState::Installed | BundleState::Resolved => {}
        }

        if self.is_system() {
            return Err(BundleError::SystemBundle("restart").into());
        }
        if !framework.is_running() {
            return Err(BundleError::FrameworkStopped.into());
        }

        if self.state() == BundleState::Installed {
            self.resolve_locked(&framework)?;
        }
        self.activate(&framework)
    }

    /// Stop the bundle.
    ///
    /// The activator's `stop` runs on the calling thread. Whether or not it
    /// succeeds, the bundle's remaining services are unregistered, its
    /// listeners removed, its context invalidated and the bundle ends up
    /// RESOLVED. Stopping a bundle that is not ACTIVE does nothing.
    pub fn stop(&self) -> Result<()> {
        if self.is_system() {
            return Err(BundleError::SystemBundle("stop").into());
        }

        let framework = self.framework()?;
        let _transition = self.data.transition.lock();

        match self.state() {
            BundleState::Uninstalled => Err(BundleError::Uninstalled(self.id()).into()),
            state @ (BundleState::Starting | BundleState::Stopping) => {
                Err(self.invalid_state(state, "stop"))
            }
            BundleState::Installed | BundleState::Resolved => Ok(()),
            BundleState::Active => self.deactivate(&framework),
        }
    }

    /// Uninstall the bundle.
    ///
    /// An ACTIVE bundle is stopped first; a failure of its activator is
    /// reported to diagnostics and does not prevent the uninstall.
    pub fn uninstall(&self) -> Result<()> {
        if self.is_system() {
            return Err(BundleError::SystemBundle("uninstall").into());
        }

        let framework = self.framework()?;
        let _transition = self.data.transition.lock();
        self.uninstall_locked(&framework)
    }

    /// Replace the bundle's activator and, optionally, its descriptor.
    ///
    /// The symbolic name cannot change. An ACTIVE bundle is stopped, moved
    /// back to INSTALLED, updated and started again.
    pub fn update(
        &self,
        descriptor: Option<BundleDescriptor>,
        activator: impl BundleActivator + 'static,
    ) -> Result<()> {
        if self.is_system() {
            return Err(BundleError::SystemBundle("update").into());
        }

        let framework = self.framework()?;
        let _transition = self.data.transition.lock();
        self.update_locked(&framework, descriptor, Box::new(activator))
    }

    fn invalid_state(&self, state: BundleState, operation: &'static str) -> trellis_core::Error {
        BundleError::InvalidState {
            id: self.id(),
            state,
            operation,
        }
        .into()
    }
}

impl PartialEq for Bundle {
    fn eq(&self, other: &Self) -> bool {
        self.data.id == other.data.id
    }
}

impl Eq for Bundle {}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("id", &self.data.id)
            .field("symbolic_name", &self.symbolic_name())
            .field("version", &self.version().to_string())
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Display for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.symbolic_name(), self.data.id)
    }
}
