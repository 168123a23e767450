//! Bundle activation contract.
//!
//! A bundle's code runs only inside its activator. The framework calls
//! [`BundleActivator::start`] while the bundle is STARTING and
//! [`BundleActivator::stop`] while it is STOPPING, each time on the thread
//! that requested the transition.

use super::context::BundleContext;

/// Code run when a bundle starts and stops.
///
/// Both callbacks receive the bundle's [`BundleContext`], the only surface
/// the framework grants to bundle code. The context stays valid from the
/// beginning of `start` until `stop` returns.
///
/// Returning an error (or panicking) from `start` aborts the start: the
/// bundle's services and listeners are released, the bundle goes back to
/// RESOLVED and the caller of [`Bundle::start`](crate::bundle::Bundle::start)
/// receives an activation failure. An error from `stop` is reported to the
/// caller of [`Bundle::stop`](crate::bundle::Bundle::stop), but the bundle
/// is stopped and cleaned up regardless.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use trellis_framework::bundle::{BundleActivator, BundleContext};
/// use trellis_framework::registry::ServiceRegistration;
/// use trellis_core::properties;
///
/// struct Greeter;
///
/// #[derive(Default)]
/// struct GreeterActivator {
///     registration: Option<ServiceRegistration>,
/// }
///
/// impl BundleActivator for GreeterActivator {
///     fn start(&mut self, context: &BundleContext) -> anyhow::Result<()> {
///         let registration = context.register_service(
///             &["org.example.Greeter"],
///             Arc::new(Greeter),
///             properties! { "language" => "en" },
///         )?;
///         self.registration = Some(registration);
///         Ok(())
///     }
///
///     fn stop(&mut self, _context: &BundleContext) -> anyhow::Result<()> {
///         // Services still registered are released by the framework anyway.
///         self.registration = None;
///         Ok(())
///     }
/// }
/// ```
pub trait BundleActivator: Send {
    /// Start the bundle.
    ///
    /// # Arguments
    ///
    /// * `context` - The bundle's context for this activation.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the bundle started; it becomes ACTIVE.
    /// * `Err` to abort the start; the bundle returns to RESOLVED.
    fn start(&mut self, context: &BundleContext) -> anyhow::Result<()>;

    /// Stop the bundle.
    ///
    /// # Arguments
    ///
    /// * `context` - The context that was passed to `start`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the bundle stopped cleanly.
    /// * `Err` if it did not; the bundle is still stopped.
    fn stop(&mut self, context: &BundleContext) -> anyhow::Result<()> {
        let _ = context;
        Ok(())
    }
}

/// Activator for bundles that have no code of their own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopActivator;

impl BundleActivator for NoopActivator {
    fn start(&mut self, _context: &BundleContext) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Activator built from a pair of closures.
///
/// ```
/// use trellis_framework::bundle::FnActivator;
///
/// let activator = FnActivator::new(
///     |_ctx| Ok(()),
///     |_ctx| Ok(()),
/// );
/// # let _ = activator;
/// ```
pub struct FnActivator<S, T> {
    on_start: S,
    on_stop: T,
}

impl<S, T> FnActivator<S, T>
where
    S: FnMut(&BundleContext) -> anyhow::Result<()> + Send,
    T: FnMut(&BundleContext) -> anyhow::Result<()> + Send,
{
    /// Create an activator from start and stop closures.
    pub fn new(on_start: S, on_stop: T) -> Self {
        Self { on_start, on_stop }
    }
}

impl<S, T> BundleActivator for FnActivator<S, T>
where
    S: FnMut(&BundleContext) -> anyhow::Result<()> + Send,
    T: FnMut(&BundleContext) -> anyhow::Result<()> + Send,
{
    fn start(&mut self, context: &BundleContext) -> anyhow::Result<()> {
        (self.on_start)(context)
    }

    fn stop(&mut self, context: &BundleContext) -> anyhow::Result<()> {
        (self.on_stop)(context)
    }
}
