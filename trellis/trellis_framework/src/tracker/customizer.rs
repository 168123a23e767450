//! Tracker customizers.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::bundle::BundleContext;
use crate::registry::ServiceReference;

/// Decides what a [`ServiceTracker`](super::ServiceTracker) keeps for each
/// service it sees.
///
/// All three callbacks run without any tracker lock held, on whichever
/// thread raised the service event (or called `open`/`close`).
pub trait ServiceTrackerCustomizer<T: ?Sized>: Send + Sync {
    /// A matching service appeared.
    ///
    /// # Arguments
    ///
    /// * `reference` - The service that now matches the tracker.
    ///
    /// # Returns
    ///
    /// * `Some(object)` to track the service; `object` is what the tracker
    ///   hands out for it.
    /// * `None` to ignore the service. It is offered again on its next
    ///   modification.
    fn adding_service(&self, reference: &ServiceReference) -> Option<Arc<T>>;

    /// The properties of a tracked service changed and it still matches.
    fn modified_service(&self, reference: &ServiceReference, service: &Arc<T>) {
        let _ = (reference, service);
    }

    /// A tracked service is going away or no longer matches.
    ///
    /// When called because of an unregistration, the reference is still
    /// valid for the duration of the call.
    fn removed_service(&self, reference: &ServiceReference, service: &Arc<T>) {
        let _ = (reference, service);
    }
}

/// Customizer that tracks the service objects themselves.
///
/// A service whose object is not a `T` is skipped.
pub struct ServiceCustomizer<T> {
    context: BundleContext,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ServiceCustomizer<T> {
    /// Create a customizer that dereferences services through `context`
    pub fn new(context: BundleContext) -> Self {
        Self {
            context,
            _marker: PhantomData,
        }
    }
}

impl<T: Any + Send + Sync> ServiceTrackerCustomizer<T> for ServiceCustomizer<T> {
    fn adding_service(&self, reference: &ServiceReference) -> Option<Arc<T>> {
        match self.context.get_service::<T>(reference) {
            Ok(service) => Some(service),
            Err(e) => {
                debug!("Not tracking service {}: {}", reference.id(), e);
                None
            }
        }
    }
}
