//! Core data types for the Trellis runtime.
//!
//! This module defines the bundle state table, bundle descriptors and the
//! property maps that services and descriptors carry.

pub mod bundle;
pub mod properties;

pub use bundle::{BundleDescriptor, BundleState, Requirement};
pub use properties::{
    Properties, PropertyValue, OBJECTCLASS, SERVICE_BUNDLE_ID, SERVICE_ID, SERVICE_RANKING,
};
