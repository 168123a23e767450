//! Integration tests for framework startup, configuration and shutdown.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use trellis_core::id::BundleId;
use trellis_core::properties;
use trellis_core::utils::{LogLevel, RecordingDiagnostics};
use trellis_core::BundleState;
use trellis_framework::bundle::{FnActivator, NoopActivator};
use trellis_framework::event::BundleEventKind;
use trellis_framework::system::{FrameworkConfig, FRAMEWORK_UUID, FRAMEWORK_VERSION};
use trellis_framework::Framework;

use common::{descriptor, EventRecorder, Recorded};

#[test]
fn test_shutdown_stops_bundles_in_reverse_install_order() {
    let (framework, _) = common::framework();
    let order: Arc<Mutex<Vec<BundleId>>> = Arc::new(Mutex::new(Vec::new()));

    let mut bundles = Vec::new();
    for name in ["com.acme.first", "com.acme.second", "com.acme.third"] {
        let stopped = order.clone();
        let bundle = framework
            .install(
                descriptor(name),
                FnActivator::new(
                    |_ctx| Ok(()),
                    move |ctx| {
                        stopped.lock().push(ctx.bundle_id());
                        Ok(())
                    },
                ),
            )
            .unwrap();
        bundle.start().unwrap();
        bundles.push(bundle);
    }

    // Never started: stays as it is.
    let idle = framework.install(descriptor("com.acme.idle"), NoopActivator).unwrap();

    framework.shutdown().unwrap();

    let expected: Vec<_> = bundles.iter().rev().map(|b| b.id()).collect();
    assert_eq!(*order.lock(), expected);
    assert!(bundles.iter().all(|b| b.state() == BundleState::Resolved));
    assert_eq!(idle.state(), BundleState::Installed);
    assert!(!framework.is_running());
    assert_eq!(framework.state(), BundleState::Resolved);
}

#[test]
fn test_shutdown_continues_past_failing_bundles() {
    let (framework, diagnostics) = common::framework();

    let failing = framework
        .install(
            descriptor("com.acme.failing"),
            FnActivator::new(|_ctx| Ok(()), |_ctx| anyhow::bail!("cannot let go")),
        )
        .unwrap();
    let healthy = framework.install(descriptor("com.acme.healthy"), NoopActivator).unwrap();
    failing.start().unwrap();
    healthy.start().unwrap();

    framework.shutdown().unwrap();

    assert_eq!(failing.state(), BundleState::Resolved);
    assert_eq!(healthy.state(), BundleState::Resolved);
    assert!(diagnostics.contains(LogLevel::Error, "cannot let go"));
}

#[test]
fn test_shutdown_invalidates_system_context() {
    let (framework, _) = common::framework();
    let context = framework.context();
    let recorder = EventRecorder::attach(&context);

    let registration = context
        .register_service(&["Framework.Owned"], Arc::new(()), properties! {})
        .unwrap();

    framework.shutdown().unwrap();

    assert!(!registration.is_registered());
    assert!(!context.is_valid());
    assert!(context.bundles().unwrap_err().is_illegal_state());
    assert!(framework.registry().is_empty());

    recorder.assert_relaxed(&[
        Recorded::Bundle(BundleEventKind::Stopping, BundleId::from_raw(0)),
        Recorded::Bundle(BundleEventKind::Stopped, BundleId::from_raw(0)),
    ]);

    // A second shutdown is a no-op.
    framework.shutdown().unwrap();
}

#[test]
fn test_nothing_can_be_installed_or_started_after_shutdown() {
    let (framework, _) = common::framework();
    let bundle = framework.install(descriptor("com.acme.late"), NoopActivator).unwrap();

    framework.shutdown().unwrap();

    let err = framework
        .install(descriptor("com.acme.later"), NoopActivator)
        .unwrap_err();
    assert!(err.is_illegal_state());
    assert!(bundle.start().unwrap_err().is_illegal_state());
}

#[test]
fn test_dropping_the_framework_stops_bundles() {
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let framework = Framework::with_diagnostics(FrameworkConfig::default(), diagnostics).unwrap();
    let bundle = framework.install(descriptor("com.acme.orphan"), NoopActivator).unwrap();
    bundle.start().unwrap();

    drop(framework);

    assert_eq!(bundle.state(), BundleState::Resolved);
    assert!(bundle.start().unwrap_err().is_illegal_state());
    assert!(bundle.registered_services().is_empty());
}

#[test]
fn test_shutdown_can_leave_bundles_running() {
    let config = FrameworkConfig {
        stop_bundles_on_shutdown: false,
        ..FrameworkConfig::default()
    };
    let framework = Framework::new(config).unwrap();
    let bundle = framework.install(descriptor("com.acme.kept"), NoopActivator).unwrap();
    bundle.start().unwrap();

    framework.shutdown().unwrap();
    assert_eq!(bundle.state(), BundleState::Active);
}

#[test]
fn test_launch_properties() {
    let config = FrameworkConfig::default()
        .with_property("org.example.region", "eu-west")
        .with_property("org.example.replicas", 3);
    let framework = Framework::new(config).unwrap();

    assert_eq!(
        framework.property("org.example.region").and_then(|v| v.as_str().map(String::from)),
        Some("eu-west".to_string())
    );
    assert_eq!(
        framework.property(FRAMEWORK_UUID).and_then(|v| v.as_str().map(String::from)),
        Some(framework.id().to_string())
    );
    assert!(framework.property(FRAMEWORK_VERSION).is_some());

    let context = framework.context();
    assert_eq!(
        context.get_property("org.example.replicas").unwrap().and_then(|v| v.as_integer()),
        Some(3)
    );
    assert!(context.get_property("missing").unwrap().is_none());
}

#[test]
fn test_invalid_configuration_is_rejected() {
    let config = FrameworkConfig {
        system_bundle_name: String::new(),
        ..FrameworkConfig::default()
    };
    let err = Framework::new(config).unwrap_err();
    assert!(err.is_invalid_argument());
}

#[test]
fn test_two_frameworks_are_independent() {
    let (one, _) = common::framework();
    let (two, _) = common::framework();
    assert_ne!(one.id(), two.id());

    one.context()
        .register_service(&["Shared"], Arc::new(()), properties! {})
        .unwrap();
    assert!(two.context().service_reference("Shared", "").unwrap().is_none());

    let a = one.install(descriptor("com.acme.same"), NoopActivator).unwrap();
    let b = two.install(descriptor("com.acme.same"), NoopActivator).unwrap();
    assert_eq!(a.id(), b.id());
}
