//! Framework shutdown.
//!
//! Shutdown moves the system bundle through STOPPING to RESOLVED. While it
//! is STOPPING the installed bundles are stopped, most recently installed
//! first. A bundle that fails to stop is reported and the shutdown carries
//! on with the next one.

use std::sync::Arc;

use tracing::{info, warn};
use trellis_core::diagnostic;
use trellis_core::error::Result;
use trellis_core::id::SYSTEM_BUNDLE_ID;
use trellis_core::types::BundleState;
use trellis_core::utils::LogLevel;

use super::bootstrap::FrameworkShared;
use crate::event::BundleEventKind;

impl FrameworkShared {
    /// Shut the framework down. Does nothing if it is already stopped.
    pub(crate) fn shutdown(self: &Arc<Self>) -> Result<()> {
        let system = self.system_bundle();
        let _transition = self.system.transition.lock();

        if self.system.state() != BundleState::Active {
            return Ok(());
        }

        info!("Shutting down framework {}", self.id);
        system.set_state(BundleState::Stopping)?;
        system.fire(self, BundleEventKind::Stopping);

        if self.config.stop_bundles_on_shutdown {
            self.stop_bundles();
        }

        let services = self.registry.unregister_all(SYSTEM_BUNDLE_ID);
        if services > 0 {
            info!("Unregistered {} services of the system bundle", services);
        }

        system.set_state(BundleState::Resolved)?;
        system.fire(self, BundleEventKind::Stopped);

        self.events.clear();
        if let Some(context) = self.system.context.lock().take() {
            context.invalidate();
        }

        info!("Framework {} stopped", self.id);
        Ok(())
    }

    fn stop_bundles(self: &Arc<Self>) {
        let mut bundles = self.bundles();
        bundles.retain(|b| !b.is_system());
        bundles.reverse();

        for bundle in bundles {
            if bundle.state() != BundleState::Active {
                continue;
            }

            if let Err(e) = bundle.stop() {
                warn!("Bundle {} failed to stop during shutdown", bundle.id());
                diagnostic!(
                    self.diagnostics,
                    LogLevel::Error,
                    "Failed to stop bundle {} during shutdown: {}",
                    bundle,
                    e
                );
            }
        }
    }
}
