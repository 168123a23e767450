//! # Trellis Core
//!
//! `trellis_core` provides the building blocks shared by every part of the
//! Trellis modular service runtime: error types, identifier types, the
//! bundle state table, property maps and the diagnostics sink.
//!
//! ## Concepts
//!
//! 1. **Bundles** are independently installable units of code. Each bundle
//!    moves through a fixed state machine (`INSTALLED`, `RESOLVED`,
//!    `STARTING`, `ACTIVE`, `STOPPING`, `UNINSTALLED`); [`BundleState`]
//!    holds the table of legal transitions.
//!
//! 2. **Services** are objects a bundle publishes under one or more
//!    interface names, together with a [`Properties`] map that consumers
//!    query with filter expressions.
//!
//! 3. **Identifiers** for bundles, services and listeners are numeric,
//!    monotonically assigned and never reused ([`id`]).
//!
//! 4. **Diagnostics**: framework-internal failures are reported through
//!    the [`Diagnostics`](utils::Diagnostics) trait, filtered by a
//!    process-wide minimum [`LogLevel`].
//!
//! ## Crate Structure
//!
//! - **error**: Error types and their classification
//! - **id**: Strongly-typed identifier types
//! - **types**: Bundle states, descriptors, property maps
//! - **utils**: Diagnostics, log levels and versions
//! - **macros**: `log_event!`, `diagnostic!` and `properties!`

pub mod error;
pub mod id;
pub mod macros;
pub mod types;
pub mod utils;

#[doc(hidden)]
pub use log as __log;

pub use error::{BundleError, Error, ErrorKind, FilterError, Result, ServiceError};
pub use id::{BundleId, FrameworkId, ListenerId, ServiceId, SYSTEM_BUNDLE_ID};
pub use types::{BundleDescriptor, BundleState, Properties, PropertyValue, Requirement};
pub use utils::{Diagnostics, LogLevel, Version};
