//! Shared helpers for the framework integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use trellis_core::id::{BundleId, ServiceId};
use trellis_core::utils::RecordingDiagnostics;
use trellis_core::{BundleDescriptor, Version};
use trellis_framework::bundle::BundleContext;
use trellis_framework::event::{BundleEvent, BundleEventKind, ServiceEvent, ServiceEventKind};
use trellis_framework::system::FrameworkConfig;
use trellis_framework::Framework;

/// Route framework tracing to the test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A framework reporting into an in-memory diagnostics sink.
pub fn framework() -> (Framework, Arc<RecordingDiagnostics>) {
    init_tracing();
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let framework = Framework::with_diagnostics(FrameworkConfig::default(), diagnostics.clone())
        .expect("framework should start");
    (framework, diagnostics)
}

/// Descriptor for version 1.0.0 of `name`.
pub fn descriptor(name: &str) -> BundleDescriptor {
    BundleDescriptor::new(name, Version::new(1, 0, 0))
}

/// One recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Bundle(BundleEventKind, BundleId),
    Service(ServiceEventKind, ServiceId),
}

/// Records every bundle and service event seen through a context.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Recorded>>>,
}

impl EventRecorder {
    /// Register as both bundle and service listener on `context`.
    pub fn attach(context: &BundleContext) -> Self {
        let recorder = Self::default();

        let events = recorder.events.clone();
        context
            .add_bundle_listener(move |event: &BundleEvent| {
                events
                    .lock()
                    .push(Recorded::Bundle(event.kind(), event.bundle_id()));
                Ok(())
            })
            .expect("bundle listener");

        let events = recorder.events.clone();
        context
            .add_service_listener("", move |event: &ServiceEvent| {
                events
                    .lock()
                    .push(Recorded::Service(event.kind(), event.service_id()));
                Ok(())
            })
            .expect("service listener");

        recorder
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Bundle event kinds recorded for `bundle`, in order.
    pub fn bundle_events(&self, bundle: BundleId) -> Vec<BundleEventKind> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Bundle(kind, id) if *id == bundle => Some(*kind),
                _ => None,
            })
            .collect()
    }

    /// Service event kinds recorded for `service`, in order.
    pub fn service_events(&self, service: ServiceId) -> Vec<ServiceEventKind> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Service(kind, id) if *id == service => Some(*kind),
                _ => None,
            })
            .collect()
    }

    /// Assert the recorded events are exactly `expected`.
    pub fn assert_exact(&self, expected: &[Recorded]) {
        assert_eq!(self.events(), expected);
    }

    /// Assert `expected` appears, in order, among the recorded events.
    /// Events not mentioned in `expected` are ignored.
    pub fn assert_relaxed(&self, expected: &[Recorded]) {
        let events = self.events();
        let mut remaining = expected.iter().peekable();

        for event in &events {
            if remaining.peek() == Some(&event) {
                remaining.next();
            }
        }

        let missing: Vec<_> = remaining.collect();
        assert!(
            missing.is_empty(),
            "missing {:?} in recorded events {:?}",
            missing,
            events
        );
    }
}
