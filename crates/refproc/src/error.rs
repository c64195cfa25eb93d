//! Error Module - refproc Error Types
//!
//! Reference processing has almost no recoverable failures: broken list
//! invariants are debug assertions (see [`debug_assert_context!`]) because the
//! surrounding collector has already committed to a heap layout by the time
//! they could fire. What remains are setup and API misuse errors.
//!
//! # Error Categories
//!
//! ## Setup Errors
//! - `Configuration` - Invalid [`RefProcConfig`](crate::RefProcConfig)
//! - `WorkerSpawn` - Worker or handler thread could not be started
//! - `ResourceExhausted` - Object table ran out of handles
//!
//! ## Argument Errors
//! - `InvalidArgument` - Argument fails validation
//! - `InvalidHandle` - Object handle not allocated by this table
//! - `InvalidState` - Operation called in the wrong lifecycle state
//!
//! ## Internal Errors
//! - `Internal` - Invariant violation detected at runtime

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for all refproc operations
///
/// # Examples
///
/// ```rust
/// use refproc::RefProcError;
///
/// fn describe(err: &RefProcError) -> &'static str {
///     match err {
///         RefProcError::Configuration(_) => "fix the configuration",
///         RefProcError::InvalidHandle { .. } => "handle came from another table",
///         _ if err.is_bug() => "report a bug",
///         _ => "retry",
///     }
/// }
/// ```
#[derive(Debug, Error)]
pub enum RefProcError {
    /// Configuration error
    ///
    /// **When returned:** `RefProcConfig::validate` rejected the configuration
    ///
    /// **Recovery strategy:** Use default configuration or fail fast
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid argument
    ///
    /// **When returned:** Function argument fails validation
    ///
    /// **Example scenarios:**
    /// - Worker pool created with zero workers
    /// - Strong edge added from an object to itself twice
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Object handle is not part of the object table
    ///
    /// **When returned:** A handle from another table, or a forged index, was
    /// passed to an `ObjectTable` operation that validates its inputs
    #[error("Invalid object handle {index} (table holds {len} objects)")]
    InvalidHandle { index: usize, len: usize },

    /// Invalid state
    ///
    /// **When returned:** Lifecycle violation, e.g. stopping a reference
    /// handler that was never started
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Resource exhausted
    ///
    /// **When returned:** The object table cannot hand out more handles
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    /// Thread spawn failed
    ///
    /// **When returned:** The OS refused to create a handler thread
    ///
    /// **Recovery strategy:** Process the pending list synchronously instead
    #[error("Failed to spawn thread {name}: {reason}")]
    WorkerSpawn { name: String, reason: String },

    /// Internal error - indicates a bug in refproc
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RefProcError {
    /// Check if this error indicates a bug in the code
    pub fn is_bug(&self) -> bool {
        matches!(self, RefProcError::Internal(_))
    }

    /// Check if retrying the operation could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RefProcError::WorkerSpawn { .. } | RefProcError::ResourceExhausted { .. }
        )
    }
}

impl From<ConfigError> for RefProcError {
    fn from(err: ConfigError) -> Self {
        RefProcError::Configuration(err.to_string())
    }
}

/// Result type alias for refproc operations
pub type Result<T> = std::result::Result<T, RefProcError>;

/// Macro for assertion with context
#[macro_export]
macro_rules! assert_context {
    ($cond:expr, $context:expr) => {
        if !$cond {
            panic!("Assertion failed at {}: {}", stringify!($cond), $context);
        }
    };
    ($cond:expr, $context:expr, $($arg:tt)*) => {
        if !$cond {
            panic!("Assertion failed at {}: {}", stringify!($cond), format!($context, $($arg)*));
        }
    };
}

/// Like [`assert_context!`], but only checked in debug builds
///
/// Used for the list invariants of reference processing. Release builds trust
/// the collector and skip the check entirely.
#[macro_export]
macro_rules! debug_assert_context {
    ($($arg:tt)*) => {
        if cfg!(debug_assertions) {
            $crate::assert_context!($($arg)*);
        }
    };
}
