//! Bundle-related data types.
//!
//! This module defines the bundle state machine table and the descriptor a
//! bundle is installed from. The transitions themselves are driven by the
//! lifecycle manager in `trellis_framework`; this table is the single source
//! of truth it checks every state change against.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::Properties;
use crate::utils::Version;

/// Bundle state in the lifecycle.
///
/// ```text
/// INSTALLED --resolve--> RESOLVED --start--> STARTING --> ACTIVE
///                          ^  |                  |           |
///                          |  +--update--> INSTALLED      stop
///                          |                     v           v
///                          +------------------ STOPPING <----+
///
/// any state except UNINSTALLED --uninstall--> UNINSTALLED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BundleState {
    /// Bundle is installed but its requirements have not been checked.
    Installed,

    /// Bundle requirements are satisfied; the bundle can be started.
    Resolved,

    /// The activator's start callback is running.
    Starting,

    /// Bundle has been started and its activator returned successfully.
    Active,

    /// The activator's stop callback is running.
    Stopping,

    /// Bundle has been uninstalled. Terminal.
    Uninstalled,
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => write!(f, "INSTALLED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Starting => write!(f, "STARTING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Stopping => write!(f, "STOPPING"),
            Self::Uninstalled => write!(f, "UNINSTALLED"),
        }
    }
}

impl BundleState {
    /// Check if a bundle in this state may use its bundle context.
    ///
    /// # Returns
    ///
    /// `true` for STARTING, ACTIVE and STOPPING.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Active | Self::Stopping)
    }

    /// Check if this state is the middle of a start or stop transition.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Starting | Self::Stopping)
    }

    /// Check if this state allows further transitions.
    pub fn allows_transitions(&self) -> bool {
        !matches!(self, Self::Uninstalled)
    }

    /// Get the valid next states from this state.
    ///
    /// STARTING may fall back to STOPPING when the activator fails, which
    /// is how a failed start returns to RESOLVED without skipping a state.
    pub fn valid_next_states(&self) -> &'static [BundleState] {
        match self {
            Self::Installed => &[Self::Resolved, Self::Uninstalled],
            Self::Resolved => &[Self::Starting, Self::Installed, Self::Uninstalled],
            Self::Starting => &[Self::Active, Self::Stopping],
            Self::Active => &[Self::Stopping],
            Self::Stopping => &[Self::Resolved],
            Self::Uninstalled => &[],
        }
    }

    /// Check if a transition to the given state is valid.
    pub fn can_transition_to(&self, next: BundleState) -> bool {
        self.valid_next_states().contains(&next)
    }
}

/// A dependency of one bundle on another, checked on resolve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    /// Symbolic name of the required bundle.
    pub symbolic_name: String,

    /// Lowest acceptable version, inclusive.
    #[serde(default)]
    pub minimum_version: Option<Version>,
}

impl Requirement {
    /// Require any version of the named bundle.
    pub fn bundle(symbolic_name: impl Into<String>) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            minimum_version: None,
        }
    }

    /// Require at least `version` of the named bundle.
    pub fn bundle_at_least(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            minimum_version: Some(version),
        }
    }

    /// Check if a bundle with the given name and version satisfies this requirement.
    pub fn is_satisfied_by(&self, symbolic_name: &str, version: &Version) -> bool {
        self.symbolic_name == symbolic_name
            && self
                .minimum_version
                .as_ref()
                .map_or(true, |minimum| version >= minimum)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.minimum_version {
            Some(minimum) => write!(f, "{} >= {}", self.symbolic_name, minimum),
            None => write!(f, "{}", self.symbolic_name),
        }
    }
}

/// Everything the framework needs to know about a bundle before it runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleDescriptor {
    /// Symbolic name; together with the version it identifies the bundle.
    pub symbolic_name: String,

    /// Bundle version.
    #[serde(default)]
    pub version: Version,

    /// Bundles that must be installed for this one to resolve.
    #[serde(default)]
    pub requirements: Vec<Requirement>,

    /// Free-form descriptive headers (vendor, description, ...).
    #[serde(default)]
    pub headers: Properties,
}

impl BundleDescriptor {
    /// Create a descriptor with no requirements or headers.
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version,
            requirements: Vec::new(),
            headers: Properties::new(),
        }
    }

    /// Add a requirement.
    pub fn require(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Add a header.
    pub fn with_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<crate::types::PropertyValue>,
    ) -> Self {
        self.headers.insert(key, value);
        self
    }
}
