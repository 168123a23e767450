//! Trellis Framework - dynamic modular service runtime
//!
//! This crate runs bundles: independently installable units of code that
//! publish services into a shared registry and consume each other's
//! services, while a per-bundle state machine decides when each bundle's
//! code may run.
//!
//! - **bundle**: Bundle lifecycle, activators and bundle contexts
//! - **event**: Bundle and service events and their synchronous dispatch
//! - **filter**: LDAP-style filter expressions over service properties
//! - **registry**: Service registry, references and registrations
//! - **system**: Configuration, bootstrap and shutdown
//! - **tracker**: Live views over the services matching a query
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{properties, BundleDescriptor, BundleState, Version};
//! use trellis_framework::bundle::FnActivator;
//! use trellis_framework::system::FrameworkConfig;
//! use trellis_framework::Framework;
//!
//! struct Greeter;
//!
//! let framework = Framework::new(FrameworkConfig::default()).unwrap();
//! let bundle = framework
//!     .install(
//!         BundleDescriptor::new("org.example.greeter", Version::new(1, 0, 0)),
//!         FnActivator::new(
//!             |ctx| {
//!                 ctx.register_service(&["org.example.Greeter"], Arc::new(Greeter), properties! {})?;
//!                 Ok(())
//!             },
//!             |_ctx| Ok(()),
//!         ),
//!     )
//!     .unwrap();
//!
//! bundle.start().unwrap();
//! assert_eq!(bundle.state(), BundleState::Active);
//!
//! let context = framework.context();
//! let reference = context.service_reference("org.example.Greeter", "").unwrap().unwrap();
//! assert!(context.get_service::<Greeter>(&reference).is_ok());
//!
//! bundle.stop().unwrap();
//! assert!(context.service_reference("org.example.Greeter", "").unwrap().is_none());
//! framework.shutdown().unwrap();
//! ```

pub mod bundle;
pub mod event;
pub mod filter;
pub mod registry;
pub mod system;
pub mod tracker;

use std::fmt;
use std::sync::Arc;

use tracing::info;
use trellis_core::error::{Error, Result};
use trellis_core::id::{BundleId, FrameworkId};
use trellis_core::types::{BundleDescriptor, BundleState, PropertyValue};
use trellis_core::utils::{set_log_level, Diagnostics, LogDiagnostics};

use bundle::{Bundle, BundleActivator, BundleContext};
use registry::ServiceRegistry;
use system::bootstrap::FrameworkShared;
use system::FrameworkConfig;

/// A running framework instance.
///
/// Dropping the framework shuts it down.
pub struct Framework {
    inner: Arc<FrameworkShared>,
}

impl Framework {
    /// Create and start a framework.
    ///
    /// Applies the configured log level to the process-wide threshold and
    /// reports internal failures through the `log` facade.
    pub fn new(config: FrameworkConfig) -> Result<Self> {
        Self::with_diagnostics(config, Arc::new(LogDiagnostics))
    }

    /// Create and start a framework reporting internal failures to
    /// `diagnostics`.
    pub fn with_diagnostics(config: FrameworkConfig, diagnostics: Arc<dyn Diagnostics>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;
        set_log_level(config.log_level);

        info!("Initializing Trellis framework");
        Ok(Self {
            inner: FrameworkShared::bootstrap(config, diagnostics),
        })
    }

    /// The framework instance's id.
    pub fn id(&self) -> FrameworkId {
        self.inner.id
    }

    /// The configuration the framework was started with.
    pub fn config(&self) -> &FrameworkConfig {
        &self.inner.config
    }

    /// The system bundle's context. Invalid after shutdown.
    pub fn context(&self) -> BundleContext {
        self.inner.system_context.clone()
    }

    /// The system bundle, id 0.
    pub fn system_bundle(&self) -> Bundle {
        self.inner.system_bundle()
    }

    /// The service registry, for read-only queries from outside any bundle.
    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    /// Install a bundle. It starts out INSTALLED.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - The bundle's identity and requirements.
    /// * `activator` - The code run when the bundle starts and stops.
    ///
    /// # Returns
    ///
    /// * `Ok(Bundle)` for the new bundle.
    /// * `Err` if the descriptor is invalid, a bundle with the same name
    ///   and version is installed, or the framework is shut down.
    pub fn install(
        &self,
        descriptor: BundleDescriptor,
        activator: impl BundleActivator + 'static,
    ) -> Result<Bundle> {
        bundle::install(&self.inner, descriptor, Box::new(activator))
    }

    /// The installed bundle with the given id.
    pub fn bundle(&self, id: BundleId) -> Option<Bundle> {
        self.inner.bundle(id)
    }

    /// Every installed bundle, in install order, the system bundle first.
    pub fn bundles(&self) -> Vec<Bundle> {
        self.inner.bundles()
    }

    /// Installed bundles with the given symbolic name, in install order.
    pub fn find_bundles(&self, symbolic_name: &str) -> Vec<Bundle> {
        self.bundles()
            .into_iter()
            .filter(|b| b.symbolic_name() == symbolic_name)
            .collect()
    }

    /// A framework launch property.
    pub fn property(&self, key: &str) -> Option<PropertyValue> {
        self.inner.properties.get(key).cloned()
    }

    /// Check if the framework is running.
    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    /// The system bundle's state: ACTIVE while running, RESOLVED after
    /// shutdown.
    pub fn state(&self) -> BundleState {
        self.inner.system.state()
    }

    /// Stop every bundle and the framework itself. Does nothing the second
    /// time.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown()
    }
}

impl Drop for Framework {
    fn drop(&mut self) {
        if let Err(e) = self.inner.shutdown() {
            tracing::warn!("Framework {} did not shut down cleanly: {}", self.inner.id, e);
        }
    }
}

impl fmt::Debug for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Framework")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("bundles", &self.inner.bundles.read().len())
            .finish()
    }
}
