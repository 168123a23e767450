//! Convenience macros for the Trellis runtime.

/// Log an event with the given level through the `log` facade.
///
/// # Examples
///
/// ```
/// use trellis_core::log_event;
/// use trellis_core::utils::LogLevel;
///
/// log_event!(LogLevel::Info, "Framework started");
///
/// log_event!(LogLevel::Warning, "Listener failed",
///     listener => 4,
///     event => "STARTED",
/// );
/// ```
#[macro_export]
macro_rules! log_event {
    ($level:expr, $message:expr) => {
        {
            use $crate::utils::LogLevel;
            match $level {
                LogLevel::Error => $crate::__log::error!("[{}] {}", module_path!(), $message),
                LogLevel::Warning => $crate::__log::warn!("[{}] {}", module_path!(), $message),
                LogLevel::Info => $crate::__log::info!("[{}] {}", module_path!(), $message),
                LogLevel::Debug => $crate::__log::debug!("[{}] {}", module_path!(), $message),
            }
        }
    };

    ($level:expr, $message:expr, $($key:ident => $value:expr),+ $(,)?) => {
        {
            use $crate::utils::LogLevel;
            let metadata = vec![$(format!("{}={}", stringify!($key), $value)),+].join(" ");
            match $level {
                LogLevel::Error => $crate::__log::error!("[{}] {}: {}", module_path!(), $message, metadata),
                LogLevel::Warning => $crate::__log::warn!("[{}] {}: {}", module_path!(), $message, metadata),
                LogLevel::Info => $crate::__log::info!("[{}] {}: {}", module_path!(), $message, metadata),
                LogLevel::Debug => $crate::__log::debug!("[{}] {}: {}", module_path!(), $message, metadata),
            }
        }
    };
}

/// Report a formatted message to a [`Diagnostics`](crate::utils::Diagnostics) sink.
///
/// The message is only formatted when the sink accepts the level. A braced
/// list of `key => value` pairs before the format string is attached to the
/// record as metadata, together with the calling module's path.
///
/// # Examples
///
/// ```
/// use trellis_core::diagnostic;
/// use trellis_core::utils::{Diagnostics, LogLevel, RecordingDiagnostics};
///
/// let sink = RecordingDiagnostics::new();
/// diagnostic!(sink, LogLevel::Error, "listener {} failed: {}", 4, "boom");
/// assert!(sink.contains(LogLevel::Error, "listener 4 failed"));
///
/// diagnostic!(sink, LogLevel::Error, { listener => 4 }, "listener failed: {}", "boom");
/// assert_eq!(sink.records()[1].metadata["listener"], "4");
/// ```
#[macro_export]
macro_rules! diagnostic {
    ($sink:expr, $level:expr, { $($key:ident => $value:expr),+ $(,)? }, $($arg:tt)+) => {
        {
            use $crate::utils::Diagnostics as _;
            let level = $level;
            if $sink.enabled(level) {
                let record = $crate::utils::LogRecord::new(level, format!($($arg)+), module_path!())
                    $(.with_metadata(stringify!($key), $value.to_string()))+;
                $sink.record(record);
            }
        }
    };

    ($sink:expr, $level:expr, $($arg:tt)+) => {
        {
            use $crate::utils::Diagnostics as _;
            let level = $level;
            if $sink.enabled(level) {
                $sink.message(level, &format!($($arg)+));
            }
        }
    };
}

/// Build a [`Properties`](crate::types::Properties) map from literal pairs.
///
/// # Examples
///
/// ```
/// use trellis_core::properties;
///
/// let props = properties! {
///     "color" => "red",
///     "size" => 7,
/// };
/// assert_eq!(props.len(), 2);
/// ```
#[macro_export]
macro_rules! properties {
    () => {
        $crate::types::Properties::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        {
            let mut props = $crate::types::Properties::new();
            $(props.insert($key, $value);)+
            props
        }
    };
}
