//! Service Tracking
//!
//! A [`ServiceTracker`] keeps a live view of the services registered under
//! one interface that match a filter. While open it follows the registry's
//! service events and calls a [`ServiceTrackerCustomizer`] as services
//! appear, change and go away.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::properties;
//! use trellis_framework::system::FrameworkConfig;
//! use trellis_framework::tracker::ServiceTracker;
//! use trellis_framework::Framework;
//!
//! struct Clock;
//!
//! let framework = Framework::new(FrameworkConfig::default()).unwrap();
//! let context = framework.context();
//!
//! let tracker = ServiceTracker::<Clock>::tracking(&context, "org.example.Clock", "").unwrap();
//! tracker.open().unwrap();
//! assert!(tracker.is_empty());
//!
//! context
//!     .register_service(&["org.example.Clock"], Arc::new(Clock), properties! {})
//!     .unwrap();
//! assert_eq!(tracker.size(), 1);
//!
//! tracker.close();
//! framework.shutdown().unwrap();
//! ```

pub mod customizer;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;
use trellis_core::error::{Result, ServiceError};
use trellis_core::id::{ListenerId, ServiceId};

use crate::bundle::BundleContext;
use crate::event::{ServiceEvent, ServiceEventKind};
use crate::filter::Filter;
use crate::registry::ServiceReference;

pub use customizer::{ServiceCustomizer, ServiceTrackerCustomizer};

struct TrackerState<T: ?Sized> {
    open: bool,
    listener: Option<ListenerId>,
    tracked: HashMap<ServiceId, (ServiceReference, Arc<T>)>,

    /// Services whose `adding_service` call is in flight
    adding: HashSet<ServiceId>,
    tracking_count: i64,
}

impl<T: ?Sized> TrackerState<T> {
    fn closed() -> Self {
        Self {
            open: false,
            listener: None,
            tracked: HashMap::new(),
            adding: HashSet::new(),
            tracking_count: -1,
        }
    }

    /// Tracked entries, best first.
    fn sorted(&self) -> Vec<(ServiceReference, Arc<T>)> {
        let mut entries: Vec<_> = self.tracked.values().cloned().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn best(&self) -> Option<Arc<T>> {
        self.tracked
            .values()
            .min_by(|a, b| a.0.cmp(&b.0))
            .map(|(_, service)| Arc::clone(service))
    }
}

struct TrackerInner<T: ?Sized> {
    context: BundleContext,
    interface: String,
    filter: Filter,
    customizer: Arc<dyn ServiceTrackerCustomizer<T>>,

    /// Serializes `open` and `close`
    lifecycle: Mutex<()>,
    state: Mutex<TrackerState<T>>,
    changed: Condvar,
}

/// A live view of the services matching an interface and a filter.
pub struct ServiceTracker<T: ?Sized + Send + Sync + 'static> {
    inner: Arc<TrackerInner<T>>,
}

impl<T: Send + Sync + 'static> ServiceTracker<T> {
    /// Create a tracker that tracks the service objects themselves.
    ///
    /// Services registered under `interface` whose object is not a `T` are
    /// ignored.
    pub fn tracking(context: &BundleContext, interface: &str, filter: &str) -> Result<Self> {
        Self::new(
            context,
            interface,
            filter,
            Arc::new(ServiceCustomizer::<T>::new(context.clone())),
        )
    }
}

impl<T: ?Sized + Send + Sync + 'static> ServiceTracker<T> {
    /// Create a closed tracker.
    ///
    /// # Arguments
    ///
    /// * `context` - The context of the bundle doing the tracking.
    /// * `interface` - The interface name to track.
    /// * `filter` - Additional filter on the service properties; empty to
    ///   track every service under `interface`.
    /// * `customizer` - Callbacks deciding what is tracked.
    ///
    /// # Returns
    ///
    /// * `Ok(ServiceTracker)` if the arguments are valid.
    /// * `Err` if `interface` is empty or `filter` is malformed.
    pub fn new(
        context: &BundleContext,
        interface: &str,
        filter: &str,
        customizer: Arc<dyn ServiceTrackerCustomizer<T>>,
    ) -> Result<Self> {
        // Registered interface names are trimmed, so the tracked one is too.
        let interface = interface.trim();
        if interface.is_empty() {
            return Err(ServiceError::EmptyInterfaceName.into());
        }

        let scope = Filter::objectclass(interface);
        let filter = match Filter::parse_optional(filter)? {
            Some(filter) => scope.and(filter),
            None => scope,
        };

        Ok(Self {
            inner: Arc::new(TrackerInner {
                context: context.clone(),
                interface: interface.to_string(),
                filter,
                customizer,
                lifecycle: Mutex::new(()),
                state: Mutex::new(TrackerState::closed()),
                changed: Condvar::new(),
            }),
        })
    }

    /// Start tracking.
    ///
    /// The service listener is registered before the registry is searched
    /// for services that already match, so no registration can fall between
    /// the two. Opening an open tracker does nothing.
    pub fn open(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock();

        {
            let mut state = self.inner.state.lock();
            if state.open {
                return Ok(());
            }
            state.open = true;
            state.tracking_count = 0;
        }

        let weak: Weak<TrackerInner<T>> = Arc::downgrade(&self.inner);
        let listener = self.inner.context.add_service_listener_with(
            Some(self.inner.filter.clone()),
            move |event: &ServiceEvent| {
                if let Some(inner) = weak.upgrade() {
                    inner.service_changed(event);
                }
                Ok(())
            },
        );

        let listener = match listener {
            Ok(id) => id,
            Err(e) => {
                *self.inner.state.lock() = TrackerState::closed();
                return Err(e);
            }
        };
        self.inner.state.lock().listener = Some(listener);

        let existing = self
            .inner
            .context
            .references_matching(Some(&self.inner.interface), Some(&self.inner.filter))?;
        debug!(
            "Opened tracker for {} with {} existing services",
            self.inner.filter,
            existing.len()
        );
        for reference in existing {
            self.inner.track(reference);
        }

        Ok(())
    }

    /// Stop tracking.
    ///
    /// `removed_service` is called for every tracked service, best first,
    /// and the tracker is emptied. A closed tracker can be opened again.
    pub fn close(&self) {
        let _lifecycle = self.inner.lifecycle.lock();

        let (listener, entries) = {
            let mut state = self.inner.state.lock();
            if !state.open {
                return;
            }
            let entries = state.sorted();
            let listener = state.listener.take();
            *state = TrackerState::closed();
            (listener, entries)
        };
        self.inner.changed.notify_all();

        if let Some(listener) = listener {
            if let Err(e) = self.inner.context.remove_listener(listener) {
                debug!("Tracker listener {} already gone: {}", listener, e);
            }
        }

        for (reference, service) in &entries {
            self.inner.customizer.removed_service(reference, service);
        }
        debug!("Closed tracker for {}", self.inner.filter);
    }

    /// Check if the tracker is open.
    pub fn is_open(&self) -> bool {
        self.inner.state.lock().open
    }

    /// References to every tracked service, best first.
    pub fn get_service_references(&self) -> Vec<ServiceReference> {
        self.inner
            .state
            .lock()
            .sorted()
            .into_iter()
            .map(|(reference, _)| reference)
            .collect()
    }

    /// Reference to the best tracked service.
    pub fn get_service_reference(&self) -> Option<ServiceReference> {
        self.get_service_references().into_iter().next()
    }

    /// The object tracked for `reference`, if it is tracked.
    pub fn get_tracked_object(&self, reference: &ServiceReference) -> Option<Arc<T>> {
        self.inner
            .state
            .lock()
            .tracked
            .get(&reference.id())
            .map(|(_, service)| Arc::clone(service))
    }

    /// The object tracked for the best service.
    pub fn get_service(&self) -> Option<Arc<T>> {
        self.inner.state.lock().best()
    }

    /// Every tracked object, best first.
    pub fn get_services(&self) -> Vec<Arc<T>> {
        self.inner
            .state
            .lock()
            .sorted()
            .into_iter()
            .map(|(_, service)| service)
            .collect()
    }

    /// Number of tracked services.
    pub fn size(&self) -> usize {
        self.inner.state.lock().tracked.len()
    }

    /// Check if no service is tracked.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of changes seen since the tracker was opened, or -1 while it
    /// is closed.
    pub fn tracking_count(&self) -> i64 {
        self.inner.state.lock().tracking_count
    }

    /// Wait until a service is tracked and return the best one.
    ///
    /// Returns `None` if `timeout` expires first or the tracker is closed.
    pub fn wait_for_service(&self, timeout: Duration) -> Option<Arc<T>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();

        loop {
            if let Some(service) = state.best() {
                return Some(service);
            }
            if !state.open {
                return None;
            }
            if self.inner.changed.wait_until(&mut state, deadline).timed_out() {
                return state.best();
            }
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Drop for ServiceTracker<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: ?Sized + Send + Sync + 'static> fmt::Debug for ServiceTracker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ServiceTracker")
            .field("filter", &self.inner.filter.to_string())
            .field("open", &state.open)
            .field("size", &state.tracked.len())
            .finish()
    }
}

impl<T: ?Sized + Send + Sync + 'static> TrackerInner<T> {
    fn service_changed(&self, event: &ServiceEvent) {
        match event.kind() {
            ServiceEventKind::Registered => self.track(event.reference().clone()),
            ServiceEventKind::Modified => self.modified(event.reference().clone()),
            ServiceEventKind::ModifiedEndMatch | ServiceEventKind::Unregistering => {
                self.untrack(event.reference())
            }
        }
    }

    /// Offer a newly matching service to the customizer.
    fn track(&self, reference: ServiceReference) {
        let id = reference.id();
        {
            let mut state = self.state.lock();
            if !state.open || state.tracked.contains_key(&id) || !state.adding.insert(id) {
                return;
            }
        }

        let service = self.customizer.adding_service(&reference);

        let mut state = self.state.lock();
        let wanted = state.adding.remove(&id) && state.open && reference.entry().is_registered();

        match service {
            Some(service) if wanted => {
                state.tracked.insert(id, (reference, service));
                state.tracking_count += 1;
                drop(state);
                self.changed.notify_all();
            }
            Some(service) => {
                // Removed or closed while the customizer ran.
                drop(state);
                self.customizer.removed_service(&reference, &service);
            }
            None => debug!("Customizer declined service {}", id),
        }
    }

    fn modified(&self, reference: ServiceReference) {
        let service = {
            let mut state = self.state.lock();
            if !state.open {
                return;
            }
            let tracked = state
                .tracked
                .get(&reference.id())
                .map(|(_, service)| Arc::clone(service));
            match tracked {
                Some(service) => {
                    state.tracking_count += 1;
                    service
                }
                None => {
                    drop(state);
                    return self.track(reference);
                }
            }
        };

        self.customizer.modified_service(&reference, &service);
    }

    fn untrack(&self, reference: &ServiceReference) {
        let id = reference.id();
        let removed = {
            let mut state = self.state.lock();
            if state.adding.remove(&id) {
                return;
            }
            let removed = state.tracked.remove(&id);
            if removed.is_some() {
                state.tracking_count += 1;
            }
            removed
        };

        if let Some((reference, service)) = removed {
            self.customizer.removed_service(&reference, &service);
        }
    }
}
