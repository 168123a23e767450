//! Transition bodies. Every function here expects the bundle's transition
//! lock to be held by the caller.

use std::sync::Arc;

use tracing::{debug, info, warn};
use trellis_core::diagnostic;
use trellis_core::error::{BundleError, Result};
use trellis_core::types::{BundleDescriptor, BundleState};
use trellis_core::utils::LogLevel;

use super::activator::{BundleActivator, NoopActivator};
use super::context::BundleContext;
use super::{Bundle, BundleData};
use crate::event::dispatcher::guarded;
use crate::event::{BundleEvent, BundleEventKind};
use crate::system::bootstrap::FrameworkShared;

/// Install a bundle. It starts out INSTALLED.
pub(crate) fn install(
    framework: &Arc<FrameworkShared>,
    descriptor: BundleDescriptor,
    activator: Box<dyn BundleActivator>,
) -> Result<Bundle> {
    if !framework.is_running() {
        return Err(BundleError::FrameworkStopped.into());
    }
    validate_descriptor(&descriptor)?;

    let data = {
        let mut bundles = framework.bundles.write();
        let duplicate = bundles.values().any(|b| {
            b.state() != BundleState::Uninstalled
                && b.symbolic_name() == descriptor.symbolic_name
                && b.version() == descriptor.version
        });
        if duplicate {
            return Err(BundleError::AlreadyInstalled {
                symbolic_name: descriptor.symbolic_name,
                version: descriptor.version,
            }
            .into());
        }

        let id = framework.bundle_ids.next();
        let data = Arc::new(BundleData::new(
            id,
            descriptor,
            BundleState::Installed,
            activator,
        ));
        bundles.insert(id, Arc::clone(&data));
        data
    };

    let bundle = Bundle::new(framework, data);
    info!(
        "Installed bundle {} ({} {})",
        bundle.id(),
        bundle.symbolic_name(),
        bundle.version()
    );
    bundle.fire(framework, BundleEventKind::Installed);

    Ok(bundle)
}

fn validate_descriptor(descriptor: &BundleDescriptor) -> Result<()> {
    if descriptor.symbolic_name.trim().is_empty() {
        return Err(BundleError::InvalidDescriptor("symbolic name cannot be empty".into()).into());
    }

    if descriptor
        .requirements
        .iter()
        .any(|r| r.symbolic_name.trim().is_empty())
    {
        return Err(BundleError::InvalidDescriptor(format!(
            "bundle {} has a requirement without a symbolic name",
            descriptor.symbolic_name
        ))
        .into());
    }

    Ok(())
}

impl Bundle {
    pub(crate) fn fire(&self, framework: &FrameworkShared, kind: BundleEventKind) {
        framework
            .events
            .fire_bundle_event(&BundleEvent::new(kind, self.clone()));
    }

    /// Move to `next`, refusing anything the state table does not allow.
    pub(crate) fn set_state(&self, next: BundleState) -> Result<()> {
        let mut state = self.data.state.write();
        if !state.can_transition_to(next) {
            return Err(BundleError::InvalidState {
                id: self.data.id,
                state: *state,
                operation: transition_name(next),
            }
            .into());
        }

        debug!("Bundle {} {} -> {}", self.data.id, *state, next);
        *state = next;
        Ok(())
    }

    pub(super) fn resolve_locked(&self, framework: &FrameworkShared) -> Result<()> {
        let requirements = self.data.descriptor.read().requirements.clone();

        {
            let bundles = framework.bundles.read();
            for requirement in &requirements {
                let satisfied = bundles.values().any(|other| {
                    other.id != self.data.id
                        && other.state() != BundleState::Uninstalled
                        && requirement.is_satisfied_by(&other.symbolic_name(), &other.version())
                });

                if !satisfied {
                    warn!(
                        "Bundle {} cannot be resolved: missing {}",
                        self.data.id, requirement
                    );
                    return Err(BundleError::Unresolved {
                        id: self.data.id,
                        requirement: requirement.to_string(),
                    }
                    .into());
                }
            }
        }

        self.set_state(BundleState::Resolved)?;
        self.fire(framework, BundleEventKind::Resolved);
        Ok(())
    }

    /// RESOLVED -> STARTING -> ACTIVE, or back to RESOLVED through
    /// STOPPING if the activator fails.
    pub(super) fn activate(&self, framework: &Arc<FrameworkShared>) -> Result<()> {
        self.set_state(BundleState::Starting)?;
        self.fire(framework, BundleEventKind::Starting);

        framework.registry.reopen(self.data.id);
        let context = BundleContext::new(Arc::downgrade(framework), &self.data);
        self.data.set_context(Some(context.clone()));

        match guarded(|| self.data.activator.lock().start(&context)) {
            Ok(()) => {
                self.set_state(BundleState::Active)?;
                info!("Started bundle {} ({})", self.data.id, self.symbolic_name());
                self.fire(framework, BundleEventKind::Started);
                Ok(())
            }
            Err(reason) => {
                warn!("Bundle {} failed to start: {}", self.data.id, reason);

                self.set_state(BundleState::Stopping)?;
                self.fire(framework, BundleEventKind::Stopping);
                self.release(framework);
                self.set_state(BundleState::Resolved)?;
                self.fire(framework, BundleEventKind::Stopped);

                Err(BundleError::ActivationFailed {
                    id: self.data.id,
                    reason,
                }
                .into())
            }
        }
    }

    /// ACTIVE -> STOPPING -> RESOLVED. The bundle is cleaned up even when
    /// the activator fails; the failure is returned afterwards.
    pub(super) fn deactivate(&self, framework: &FrameworkShared) -> Result<()> {
        self.set_state(BundleState::Stopping)?;
        self.fire(framework, BundleEventKind::Stopping);

        let context = self.data.context.lock().clone();
        let outcome = match &context {
            Some(context) => guarded(|| self.data.activator.lock().stop(context)),
            None => Ok(()),
        };

        self.release(framework);
        self.set_state(BundleState::Resolved)?;
        info!("Stopped bundle {} ({})", self.data.id, self.symbolic_name());
        self.fire(framework, BundleEventKind::Stopped);

        outcome.map_err(|reason| {
            warn!("Bundle {} failed to stop cleanly: {}", self.data.id, reason);
            BundleError::DeactivationFailed {
                id: self.data.id,
                reason,
            }
            .into()
        })
    }

    /// Invalidate the bundle's context and drop its listeners, then
    /// unregister its services. The registry refuses registrations from the
    /// bundle until it is activated again.
    pub(crate) fn release(&self, framework: &FrameworkShared) {
        if let Some(context) = self.data.context.lock().take() {
            context.invalidate();
        }

        let listeners = framework.events.remove_listeners_of(self.data.id);
        let services = framework.registry.unregister_all(self.data.id);

        debug!(
            "Released {} services and {} listeners of bundle {}",
            services, listeners, self.data.id
        );
    }

    pub(super) fn uninstall_locked(&self, framework: &Arc<FrameworkShared>) -> Result<()> {
        match self.state() {
            BundleState::Uninstalled => {
                return Err(BundleError::Uninstalled(self.data.id).into());
            }
            state @ (BundleState::Starting | BundleState::Stopping) => {
                return Err(self.invalid_state(state, "uninstall"));
            }
            BundleState::Active => {
                if let Err(e) = self.deactivate(framework) {
                    diagnostic!(
                        framework.diagnostics,
                        LogLevel::Warning,
                        "Bundle {} failed to stop while being uninstalled: {}",
                        self.data.id,
                        e
                    );
                }
            }
            BundleState::Installed | BundleState::Resolved => {}
        }

        if self.state() == BundleState::Resolved {
            self.set_state(BundleState::Installed)?;
            self.fire(framework, BundleEventKind::Unresolved);
        }

        self.set_state(BundleState::Uninstalled)?;
        framework.bundles.write().remove(&self.data.id);
        self.release(framework);
        *self.data.activator.lock() = Box::new(NoopActivator);

        info!("Uninstalled bundle {} ({})", self.data.id, self.symbolic_name());
        self.fire(framework, BundleEventKind::Uninstalled);
        Ok(())
    }

    pub(super) fn update_locked(
        &self,
        framework: &Arc<FrameworkShared>,
        descriptor: Option<BundleDescriptor>,
        activator: Box<dyn BundleActivator>,
    ) -> Result<()> {
        let was_active = match self.state() {
            BundleState::Uninstalled => {
                return Err(BundleError::Uninstalled(self.data.id).into());
            }
            state @ (BundleState::Starting | BundleState::Stopping) => {
                return Err(self.invalid_state(state, "update"));
            }
            state => state == BundleState::Active,
        };

        if let Some(descriptor) = &descriptor {
            self.check_replacement(framework, descriptor)?;
        }

        if was_active {
            if let Err(e) = self.deactivate(framework) {
                diagnostic!(
                    framework.diagnostics,
                    LogLevel::Warning,
                    "Bundle {} failed to stop while being updated: {}",
                    self.data.id,
                    e
                );
            }
        }

        if self.state() == BundleState::Resolved {
            self.set_state(BundleState::Installed)?;
            self.fire(framework, BundleEventKind::Unresolved);
        }

        if let Some(descriptor) = descriptor {
            *self.data.descriptor.write() = descriptor;
        }
        *self.data.activator.lock() = activator;

        info!(
            "Updated bundle {} ({} {})",
            self.data.id,
            self.symbolic_name(),
            self.version()
        );
        self.fire(framework, BundleEventKind::Updated);

        if was_active {
            self.start()?;
        }
        Ok(())
    }

    fn check_replacement(&self, framework: &FrameworkShared, descriptor: &BundleDescriptor) -> Result<()> {
        validate_descriptor(descriptor)?;

        let current = self.symbolic_name();
        if descriptor.symbolic_name != current {
            return Err(BundleError::InvalidDescriptor(format!(
                "symbolic name cannot change from {} to {}",
                current, descriptor.symbolic_name
            ))
            .into());
        }

        let bundles = framework.bundles.read();
        let duplicate = bundles.values().any(|b| {
            b.id != self.data.id
                && b.symbolic_name() == descriptor.symbolic_name
                && b.version() == descriptor.version
        });
        if duplicate {
            return Err(BundleError::AlreadyInstalled {
                symbolic_name: descriptor.symbolic_name.clone(),
                version: descriptor.version.clone(),
            }
            .into());
        }

        Ok(())
    }
}

fn transition_name(next: BundleState) -> &'static str {
    match next {
        BundleState::Installed => "unresolve",
        BundleState::Resolved => "resolve",
        BundleState::Starting => "start",
        BundleState::Active => "activate",
        BundleState::Stopping => "stop",
        BundleState::Uninstalled => "uninstall",
    }
}
