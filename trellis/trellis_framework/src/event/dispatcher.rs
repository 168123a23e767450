//! Synchronous event fan-out.
//!
//! Each event is delivered to a snapshot of the listeners registered when
//! delivery begins, in registration order. A listener added during delivery
//! misses the event in flight; a listener removed during delivery is
//! skipped from the moment its removal is recorded. Listener failures,
//! whether returned errors or panics, are reported to the diagnostics sink
//! and never reach the emitter or the other listeners.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use trellis_core::diagnostic;
use trellis_core::id::{BundleId, IdGenerator, ListenerId, ListenerMarker};
use trellis_core::types::Properties;
use trellis_core::utils::{Diagnostics, LogLevel};

use super::types::{BundleEvent, ServiceEvent, ServiceEventKind};
use crate::filter::Filter;

/// Callback receiving bundle events.
pub type BundleListener = Arc<dyn Fn(&BundleEvent) -> anyhow::Result<()> + Send + Sync>;

/// Callback receiving service events.
pub type ServiceListener = Arc<dyn Fn(&ServiceEvent) -> anyhow::Result<()> + Send + Sync>;

/// Run user code, turning both errors and panics into a description.
pub(crate) fn guarded<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(format!("{:#}", error)),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

struct ListenerEntry<L> {
    id: ListenerId,
    owner: BundleId,
    filter: Option<Filter>,
    callback: L,
    active: AtomicBool,
}

impl<L> ListenerEntry<L> {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct Listeners {
    bundle: Vec<Arc<ListenerEntry<BundleListener>>>,
    service: Vec<Arc<ListenerEntry<ServiceListener>>>,
}

struct DispatcherInner {
    listeners: RwLock<Listeners>,
    ids: IdGenerator<ListenerMarker>,
    diagnostics: Arc<dyn Diagnostics>,
}

/// Delivers bundle and service events to registered listeners.
///
/// Cloning yields another handle to the same listener table.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    /// Create a dispatcher reporting listener failures to `diagnostics`
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                listeners: RwLock::new(Listeners::default()),
                ids: IdGenerator::starting_at(1),
                diagnostics,
            }),
        }
    }

    /// The sink listener failures are reported to
    pub fn diagnostics(&self) -> &Arc<dyn Diagnostics> {
        &self.inner.diagnostics
    }

    /// Add a bundle listener owned by `owner`
    pub fn add_bundle_listener(&self, owner: BundleId, callback: BundleListener) -> ListenerId {
        let id = self.inner.ids.next();
        self.inner.listeners.write().bundle.push(Arc::new(ListenerEntry {
            id,
            owner,
            filter: None,
            callback,
            active: AtomicBool::new(true),
        }));
        debug!("Added bundle listener {} for bundle {}", id, owner);
        id
    }

    /// Add a service listener owned by `owner`, optionally scoped by a filter
    pub fn add_service_listener(
        &self,
        owner: BundleId,
        filter: Option<Filter>,
        callback: ServiceListener,
    ) -> ListenerId {
        let id = self.inner.ids.next();
        self.inner.listeners.write().service.push(Arc::new(ListenerEntry {
            id,
            owner,
            filter,
            callback,
            active: AtomicBool::new(true),
        }));
        debug!("Added service listener {} for bundle {}", id, owner);
        id
    }

    /// Remove a listener of either kind. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();

        if let Some(index) = listeners.bundle.iter().position(|l| l.id == id) {
            listeners.bundle.remove(index).deactivate();
        } else if let Some(index) = listeners.service.iter().position(|l| l.id == id) {
            listeners.service.remove(index).deactivate();
        } else {
            return false;
        }

        debug!("Removed listener {}", id);
        true
    }

    /// Remove every listener owned by `owner`, returning how many were removed
    pub fn remove_listeners_of(&self, owner: BundleId) -> usize {
        let mut listeners = self.inner.listeners.write();
        let mut removed = 0;

        listeners.bundle.retain(|l| {
            let keep = l.owner != owner;
            if !keep {
                l.deactivate();
                removed += 1;
            }
            keep
        });
        listeners.service.retain(|l| {
            let keep = l.owner != owner;
            if !keep {
                l.deactivate();
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!("Removed {} listeners of bundle {}", removed, owner);
        }
        removed
    }

    /// Remove every listener
    pub fn clear(&self) {
        let mut listeners = self.inner.listeners.write();
        for l in listeners.bundle.drain(..) {
            l.deactivate();
        }
        for l in listeners.service.drain(..) {
            l.deactivate();
        }
    }

    /// Number of registered listeners of both kinds
    pub fn listener_count(&self) -> usize {
        let listeners = self.inner.listeners.read();
        listeners.bundle.len() + listeners.service.len()
    }

    /// Deliver a bundle event to every bundle listener
    pub fn fire_bundle_event(&self, event: &BundleEvent) {
        let snapshot = self.inner.listeners.read().bundle.clone();

        for listener in snapshot {
            if !listener.is_active() {
                continue;
            }

            if let Err(reason) = guarded(|| (listener.callback)(event)) {
                diagnostic!(
                    self.inner.diagnostics,
                    LogLevel::Error,
                    {
                        listener => listener.id,
                        owner => listener.owner,
                        event => event.kind(),
                        bundle => event.bundle_id(),
                    },
                    "Bundle listener {} failed on {} of bundle {}: {}",
                    listener.id,
                    event.kind(),
                    event.bundle_id(),
                    reason
                );
            }
        }
    }

    /// Deliver a service event to every service listener whose filter matches.
    ///
    /// For `Modified` events, `previous` holds the properties before the
    /// update; a listener whose filter matched those but not the new ones
    /// receives `ModifiedEndMatch` instead.
    pub fn fire_service_event(&self, event: &ServiceEvent, previous: Option<&Properties>) {
        let snapshot = self.inner.listeners.read().service.clone();
        let mut end_match: Option<ServiceEvent> = None;

        for listener in snapshot {
            if !listener.is_active() {
                continue;
            }

            let delivered = match &listener.filter {
                None => event,
                Some(filter) if filter.matches(event.properties()) => event,
                Some(filter)
                    if event.kind() == ServiceEventKind::Modified
                        && previous.map_or(false, |p| filter.matches(p)) =>
                {
                    &*end_match
                        .get_or_insert_with(|| event.with_kind(ServiceEventKind::ModifiedEndMatch))
                }
                Some(_) => continue,
            };

            if let Err(reason) = guarded(|| (listener.callback)(delivered)) {
                diagnostic!(
                    self.inner.diagnostics,
                    LogLevel::Error,
                    {
                        listener => listener.id,
                        owner => listener.owner,
                        event => delivered.kind(),
                        service => delivered.service_id(),
                    },
                    "Service listener {} failed on {} of service {}: {}",
                    listener.id,
                    delivered.kind(),
                    delivered.service_id(),
                    reason
                );
            }
        }
    }
}
