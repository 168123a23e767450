//! Utility types shared by the runtime: diagnostics and versions.

pub mod logging;
pub mod version;

pub use logging::{
    log_level, set_log_level, Diagnostics, LogDiagnostics, LogLevel, LogRecord,
    RecordingDiagnostics,
};
pub use version::{Version, VersionParseError};
