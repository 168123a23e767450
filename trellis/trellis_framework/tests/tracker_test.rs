//! Integration tests for service trackers.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use trellis_core::id::ServiceId;
use trellis_core::properties;
use trellis_core::types::SERVICE_RANKING;
use trellis_framework::bundle::{BundleContext, FnActivator};
use trellis_framework::registry::ServiceReference;
use trellis_framework::tracker::{ServiceTracker, ServiceTrackerCustomizer};

use common::descriptor;

struct Printer {
    name: &'static str,
}

/// Customizer recording every callback and tracking the service's name.
#[derive(Default)]
struct Recording {
    added: Mutex<Vec<ServiceId>>,
    modified: Mutex<Vec<ServiceId>>,
    removed: Mutex<Vec<(ServiceId, bool)>>,
    decline_color: Option<&'static str>,
}

impl ServiceTrackerCustomizer<String> for Recording {
    fn adding_service(&self, reference: &ServiceReference) -> Option<Arc<String>> {
        if let (Some(declined), Some(color)) = (self.decline_color, reference.property("color")) {
            if color.as_str() == Some(declined) {
                return None;
            }
        }
        self.added.lock().push(reference.id());
        Some(Arc::new(format!("printer-{}", reference.id())))
    }

    fn modified_service(&self, reference: &ServiceReference, _service: &Arc<String>) {
        self.modified.lock().push(reference.id());
    }

    fn removed_service(&self, reference: &ServiceReference, _service: &Arc<String>) {
        self.removed.lock().push((reference.id(), reference.is_valid()));
    }
}

fn register(context: &BundleContext, name: &'static str, ranking: i32) -> trellis_framework::registry::ServiceRegistration {
    context
        .register_service(
            &["Printer"],
            Arc::new(Printer { name }),
            properties! { SERVICE_RANKING => ranking, "color" => "black" },
        )
        .unwrap()
}

#[test]
fn test_tracker_sees_exactly_the_registered_services() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let customizer = Arc::new(Recording::default());

    let tracker = ServiceTracker::<String>::new(&context, "Printer", "", customizer.clone()).unwrap();
    tracker.open().unwrap();
    assert!(tracker.is_empty());
    assert_eq!(tracker.tracking_count(), 0);

    let registrations: Vec<_> = (0..5).map(|i| register(&context, "p", i)).collect();
    assert_eq!(customizer.added.lock().len(), 5);
    assert_eq!(tracker.size(), 5);

    registrations[2].unregister().unwrap();
    assert_eq!(tracker.size(), 4);
    let removed = customizer.removed.lock().clone();
    assert_eq!(removed, vec![(registrations[2].id(), true)]);

    let tracked: Vec<_> = tracker.get_service_references().iter().map(|r| r.id()).collect();
    let expected: Vec<_> = [4, 3, 1, 0].iter().map(|&i| registrations[i].id()).collect();
    assert_eq!(tracked, expected);
    assert_eq!(tracker.tracking_count(), 6);
}

#[test]
fn test_open_seeds_existing_services() {
    let (framework, _) = common::framework();
    let context = framework.context();

    let low = register(&context, "low", 1);
    let high = register(&context, "high", 9);
    context
        .register_service(&["Scanner"], Arc::new(Printer { name: "scanner" }), properties! {})
        .unwrap();

    let tracker = ServiceTracker::<Printer>::tracking(&context, "Printer", "").unwrap();
    assert!(!tracker.is_open());
    assert_eq!(tracker.tracking_count(), -1);

    tracker.open().unwrap();
    assert_eq!(tracker.size(), 2);
    assert_eq!(tracker.get_service().unwrap().name, "high");
    assert_eq!(tracker.get_service_reference().unwrap().id(), high.id());

    let names: Vec<_> = tracker.get_services().iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["high", "low"]);

    let reference = low.reference().unwrap();
    assert_eq!(tracker.get_tracked_object(&reference).unwrap().name, "low");
}

#[test]
fn test_filter_scopes_the_tracker() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let customizer = Arc::new(Recording::default());

    let tracker = ServiceTracker::<String>::new(&context, "Printer", "(color=black)", customizer.clone()).unwrap();
    tracker.open().unwrap();

    let registration = register(&context, "p", 0);
    assert_eq!(tracker.size(), 1);

    registration
        .set_properties(properties! { "color" => "black", "duplex" => true })
        .unwrap();
    assert_eq!(*customizer.modified.lock(), vec![registration.id()]);
    assert_eq!(tracker.size(), 1);

    // Losing the match removes the service while it is still registered.
    registration.set_properties(properties! { "color" => "red" }).unwrap();
    assert!(tracker.is_empty());
    assert_eq!(*customizer.removed.lock(), vec![(registration.id(), true)]);

    // Matching again adds it again.
    registration.set_properties(properties! { "color" => "black" }).unwrap();
    assert_eq!(tracker.size(), 1);
    assert_eq!(customizer.added.lock().len(), 2);
}

#[test]
fn test_declined_service_is_not_tracked() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let customizer = Arc::new(Recording {
        decline_color: Some("black"),
        ..Recording::default()
    });

    let tracker = ServiceTracker::<String>::new(&context, "Printer", "", customizer.clone()).unwrap();
    tracker.open().unwrap();

    let registration = register(&context, "p", 0);
    assert!(tracker.is_empty());

    // Offered again on modification.
    registration.set_properties(properties! { "color" => "white" }).unwrap();
    assert_eq!(tracker.size(), 1);

    registration.unregister().unwrap();
    assert!(tracker.is_empty());
    assert_eq!(customizer.removed.lock().len(), 1);
}

#[test]
fn test_close_removes_everything_and_reopen_starts_fresh() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let customizer = Arc::new(Recording::default());

    let tracker = ServiceTracker::<String>::new(&context, "Printer", "", customizer.clone()).unwrap();
    tracker.open().unwrap();
    register(&context, "a", 0);
    register(&context, "b", 5);

    tracker.close();
    assert!(!tracker.is_open());
    assert!(tracker.is_empty());
    assert_eq!(tracker.tracking_count(), -1);
    assert_eq!(customizer.removed.lock().len(), 2);

    // Closed trackers ignore events.
    register(&context, "c", 0);
    assert!(tracker.is_empty());

    tracker.open().unwrap();
    assert_eq!(tracker.size(), 3);
    assert_eq!(tracker.tracking_count(), 3);
    assert_eq!(customizer.added.lock().len(), 5);
}

#[test]
fn test_tracker_follows_bundle_lifecycle() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let tracker = ServiceTracker::<Printer>::tracking(&context, "Printer", "").unwrap();
    tracker.open().unwrap();

    let provider = framework
        .install(
            descriptor("com.acme.printers"),
            FnActivator::new(
                |ctx| {
                    ctx.register_service(&["Printer"], Arc::new(Printer { name: "laser" }), properties! {})?;
                    ctx.register_service(&["Printer"], Arc::new(Printer { name: "inkjet" }), properties! {})?;
                    Ok(())
                },
                |_ctx| Ok(()),
            ),
        )
        .unwrap();

    provider.start().unwrap();
    assert_eq!(tracker.size(), 2);

    provider.stop().unwrap();
    assert!(tracker.is_empty());
}

#[test]
fn test_tracker_owned_by_a_bundle_dies_with_it() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let removals = Arc::new(AtomicUsize::new(0));
    let holder: Arc<Mutex<Option<ServiceTracker<String>>>> = Arc::new(Mutex::new(None));

    struct Counting(Arc<AtomicUsize>);

    impl ServiceTrackerCustomizer<String> for Counting {
        fn adding_service(&self, _reference: &ServiceReference) -> Option<Arc<String>> {
            Some(Arc::new("tracked".to_string()))
        }

        fn removed_service(&self, _reference: &ServiceReference, _service: &Arc<String>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let slot = holder.clone();
    let counter = removals.clone();
    let consumer = framework
        .install(
            descriptor("com.acme.consumer"),
            FnActivator::new(
                move |ctx| {
                    let tracker = ServiceTracker::<String>::new(ctx, "Printer", "", Arc::new(Counting(counter.clone())))?;
                    tracker.open()?;
                    *slot.lock() = Some(tracker);
                    Ok(())
                },
                |_ctx| Ok(()),
            ),
        )
        .unwrap();
    consumer.start().unwrap();

    register(&context, "a", 0);
    let tracker = holder.lock().take().unwrap();
    assert_eq!(tracker.size(), 1);

    // The tracker's listener went away with its bundle.
    consumer.stop().unwrap();
    register(&context, "b", 0);
    assert_eq!(tracker.size(), 1);

    tracker.close();
    assert_eq!(removals.load(Ordering::SeqCst), 1);
}

#[test]
fn test_wait_for_service() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let tracker = ServiceTracker::<Printer>::tracking(&context, "Printer", "").unwrap();
    tracker.open().unwrap();

    assert!(tracker.wait_for_service(Duration::from_millis(20)).is_none());

    let publisher = context.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        register(&publisher, "late", 0);
    });

    let printer = tracker.wait_for_service(Duration::from_secs(10)).unwrap();
    assert_eq!(printer.name, "late");
    handle.join().unwrap();
}

#[test]
fn test_invalid_tracker_arguments() {
    let (framework, _) = common::framework();
    let context = framework.context();

    let err = ServiceTracker::<Printer>::tracking(&context, "", "").unwrap_err();
    assert!(err.is_invalid_argument());

    let err = ServiceTracker::<Printer>::tracking(&context, "Printer", "(color=").unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn test_interface_name_is_trimmed_like_registrations() {
    let (framework, _) = common::framework();
    let context = framework.context();
    register(&context, "early", 0);

    let tracker = ServiceTracker::<Printer>::tracking(&context, "  Printer\t", "(color=black)").unwrap();
    tracker.open().unwrap();
    assert_eq!(tracker.size(), 1);

    register(&context, "late", 5);
    assert_eq!(tracker.size(), 2);
    assert_eq!(tracker.get_service().unwrap().name, "late");

    let err = ServiceTracker::<Printer>::tracking(&context, " \t ", "").unwrap_err();
    assert!(err.is_invalid_argument());
}
