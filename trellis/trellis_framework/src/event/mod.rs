//! Bundle and service events and their dispatcher.

pub mod dispatcher;
pub mod types;

pub use dispatcher::{BundleListener, EventDispatcher, ServiceListener};
pub use types::{BundleEvent, BundleEventKind, ServiceEvent, ServiceEventKind};
