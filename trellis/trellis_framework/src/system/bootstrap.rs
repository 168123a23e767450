//! Framework bootstrap.
//!
//! Builds the state every bundle, context and registration shares: the
//! listener table, the service registry, the bundle table and the system
//! bundle that stands for the framework itself.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;
use trellis_core::id::{BundleId, BundleMarker, FrameworkId, IdGenerator, SYSTEM_BUNDLE_ID};
use trellis_core::types::{BundleDescriptor, BundleState, Properties};
use trellis_core::utils::{Diagnostics, Version};

use super::config::FrameworkConfig;
use crate::bundle::{Bundle, BundleContext, BundleData, NoopActivator};
use crate::event::EventDispatcher;
use crate::registry::ServiceRegistry;

/// Launch property holding the framework instance's UUID
pub const FRAMEWORK_UUID: &str = "framework.uuid";

/// Launch property holding the framework's version
pub const FRAMEWORK_VERSION: &str = "framework.version";

/// State shared by every handle into one framework instance.
///
/// Bundles, contexts and registrations only hold weak references to it, so
/// dropping the [`Framework`](crate::Framework) releases everything.
pub(crate) struct FrameworkShared {
    pub(crate) id: FrameworkId,
    pub(crate) config: FrameworkConfig,
    pub(crate) properties: Properties,
    pub(crate) diagnostics: Arc<dyn Diagnostics>,
    pub(crate) events: EventDispatcher,
    pub(crate) registry: ServiceRegistry,

    /// Every bundle that is not uninstalled, the system bundle included
    pub(crate) bundles: RwLock<BTreeMap<BundleId, Arc<BundleData>>>,
    pub(crate) bundle_ids: IdGenerator<BundleMarker>,

    pub(crate) system: Arc<BundleData>,
    pub(crate) system_context: BundleContext,
}

impl FrameworkShared {
    /// Bootstrap a framework. The system bundle starts out ACTIVE.
    pub(crate) fn bootstrap(config: FrameworkConfig, diagnostics: Arc<dyn Diagnostics>) -> Arc<Self> {
        let id = FrameworkId::new();
        let events = EventDispatcher::new(Arc::clone(&diagnostics));
        let registry = ServiceRegistry::new(events.clone());
        let properties = launch_properties(id, &config);

        let system = Arc::new(BundleData::new(
            SYSTEM_BUNDLE_ID,
            BundleDescriptor::new(config.system_bundle_name.clone(), framework_version()),
            BundleState::Active,
            Box::new(NoopActivator),
        ));

        let mut bundles = BTreeMap::new();
        bundles.insert(SYSTEM_BUNDLE_ID, Arc::clone(&system));

        let shared = Arc::new_cyclic(|weak| {
            let system_context = BundleContext::new(weak.clone(), &system);
            system.set_context(Some(system_context.clone()));

            Self {
                id,
                config,
                properties,
                diagnostics,
                events,
                registry,
                bundles: RwLock::new(bundles),
                bundle_ids: IdGenerator::starting_at(1),
                system,
                system_context,
            }
        });

        info!("Framework {} started", shared.id);
        shared
    }

    /// Check if the system bundle is still ACTIVE.
    pub(crate) fn is_running(&self) -> bool {
        self.system.state() == BundleState::Active
    }

    /// Handles to every installed bundle, in install order.
    pub(crate) fn bundles(self: &Arc<Self>) -> Vec<Bundle> {
        self.bundles
            .read()
            .values()
            .map(|data| Bundle::new(self, Arc::clone(data)))
            .collect()
    }

    pub(crate) fn bundle(self: &Arc<Self>, id: BundleId) -> Option<Bundle> {
        let data = self.bundles.read().get(&id).cloned()?;
        Some(Bundle::new(self, data))
    }

    pub(crate) fn system_bundle(self: &Arc<Self>) -> Bundle {
        Bundle::new(self, Arc::clone(&self.system))
    }
}

fn framework_version() -> Version {
    env!("CARGO_PKG_VERSION").parse().unwrap_or_default()
}

fn launch_properties(id: FrameworkId, config: &FrameworkConfig) -> Properties {
    let mut properties: Properties = config
        .properties
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    properties.insert(FRAMEWORK_UUID, id.to_string());
    properties.insert(FRAMEWORK_VERSION, framework_version().to_string());
    properties
}
