//! Error types for the Trellis runtime.
//!
//! Errors are organized by subsystem: bundle lifecycle, service registry
//! and filter parsing. The root error type, `Error`, wraps each of them so
//! callers can propagate everything with `?` and still classify a failure
//! with [`Error::kind`].
//!
//! No error in this crate is process-fatal. Every variant describes a
//! condition the caller can recover from at the call site.

use crate::id::{BundleId, ServiceId};
use crate::types::BundleState;
use crate::utils::Version;
use thiserror::Error;

/// Root error type for the Trellis runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// Bundle lifecycle errors
    #[error("Bundle error: {0}")]
    Bundle(#[from] BundleError),

    /// Service registry errors
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Filter expression errors
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Invalid framework configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: registration arguments, filters, descriptors.
    InvalidArgument,

    /// The target bundle, context or service is in a lifecycle state that
    /// does not permit the operation.
    IllegalState,

    /// A bundle's own activation or deactivation code failed, or the bundle
    /// could not be resolved on start.
    ActivationFailure,

    /// Failures outside the lifecycle core, such as configuration I/O.
    Runtime,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Bundle(e) => e.kind(),
            Self::Service(e) => e.kind(),
            Self::Filter(_) => ErrorKind::InvalidArgument,
            Self::Config(_) => ErrorKind::InvalidArgument,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Runtime,
        }
    }

    /// Shorthand for `kind() == ErrorKind::IllegalState`.
    pub fn is_illegal_state(&self) -> bool {
        self.kind() == ErrorKind::IllegalState
    }

    /// Shorthand for `kind() == ErrorKind::InvalidArgument`.
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// Shorthand for `kind() == ErrorKind::ActivationFailure`.
    pub fn is_activation_failure(&self) -> bool {
        self.kind() == ErrorKind::ActivationFailure
    }
}

/// Errors related to bundle lifecycle operations.
#[derive(Debug, Error)]
pub enum BundleError {
    /// The bundle has been uninstalled and can no longer be used
    #[error("Bundle {0} is uninstalled")]
    Uninstalled(BundleId),

    /// The bundle is in a state that does not permit the operation
    #[error("Cannot {operation} bundle {id} in state {state}")]
    InvalidState {
        /// The bundle the operation targeted
        id: BundleId,

        /// The state the bundle was in
        state: BundleState,

        /// The attempted operation
        operation: &'static str,
    },

    /// The bundle context was used after its bundle stopped
    #[error("Bundle context of bundle {0} is no longer valid")]
    InvalidContext(BundleId),

    /// The operation is not permitted on the system bundle
    #[error("Cannot {0} the system bundle")]
    SystemBundle(&'static str),

    /// The framework has been shut down or dropped
    #[error("The framework is not running")]
    FrameworkStopped,

    /// A bundle with the same symbolic name and version is already installed
    #[error("Bundle {symbolic_name} {version} is already installed")]
    AlreadyInstalled {
        /// Symbolic name of the duplicate
        symbolic_name: String,

        /// Version of the duplicate
        version: Version,
    },

    /// The bundle descriptor is malformed
    #[error("Invalid bundle descriptor: {0}")]
    InvalidDescriptor(String),

    /// A requirement of the bundle could not be satisfied
    #[error("Bundle {id} has an unresolved requirement: {requirement}")]
    Unresolved {
        /// The bundle that failed to resolve
        id: BundleId,

        /// The unsatisfied requirement
        requirement: String,
    },

    /// The bundle's activator failed while starting
    #[error("Activator of bundle {id} failed to start: {reason}")]
    ActivationFailed {
        /// The bundle being started
        id: BundleId,

        /// The failure reported by the activator
        reason: String,
    },

    /// The bundle's activator failed while stopping
    #[error("Activator of bundle {id} failed to stop: {reason}")]
    DeactivationFailed {
        /// The bundle being stopped
        id: BundleId,

        /// The failure reported by the activator
        reason: String,
    },
}

impl BundleError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Uninstalled(_)
            | Self::InvalidState { .. }
            | Self::InvalidContext(_)
            | Self::SystemBundle(_)
            | Self::FrameworkStopped => ErrorKind::IllegalState,
            Self::AlreadyInstalled { .. } | Self::InvalidDescriptor(_) => {
                ErrorKind::InvalidArgument
            }
            Self::Unresolved { .. }
            | Self::ActivationFailed { .. }
            | Self::DeactivationFailed { .. } => ErrorKind::ActivationFailure,
        }
    }
}

/// Errors related to service registry operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A service must be published under at least one interface name
    #[error("A service must be registered under at least one interface")]
    NoInterfaces,

    /// An interface name was empty
    #[error("Interface names must not be empty")]
    EmptyInterfaceName,

    /// The registration behind a reference or registration handle is gone
    #[error("Service {0} has been unregistered")]
    Unregistered(ServiceId),

    /// The service instance is not of the requested type
    #[error("Service {id} is a {actual}, not a {expected}")]
    TypeMismatch {
        /// The service that was dereferenced
        id: ServiceId,

        /// The type the caller asked for
        expected: &'static str,

        /// The type the service was registered with
        actual: &'static str,
    },

    /// Only starting, active or stopping bundles may register services
    #[error("Bundle {0} is not active and cannot register services")]
    BundleNotActive(BundleId),
}

impl ServiceError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoInterfaces | Self::EmptyInterfaceName | Self::TypeMismatch { .. } => {
                ErrorKind::InvalidArgument
            }
            Self::Unregistered(_) | Self::BundleNotActive(_) => ErrorKind::IllegalState,
        }
    }
}

/// Errors raised while compiling a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// The expression is not well formed
    #[error("Malformed filter at offset {position}: {message}")]
    Parse {
        /// Byte offset into the expression where parsing stopped
        position: usize,

        /// What the parser expected
        message: String,
    },
}

impl FilterError {
    /// Create a parse error at the given byte offset.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }
}

/// Result type used throughout the Trellis runtime.
pub type Result<T> = std::result::Result<T, Error>;
