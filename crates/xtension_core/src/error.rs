//! Error types for the binding layer.

use thiserror::Error;

use crate::handle::HandleState;

/// Result type for binding operations.
pub type Result<T> = std::result::Result<T, XwfError>;

/// Broad failure class, used by the dispatcher to decide whether to abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The host module or one of its symbols is missing. Fatal.
    Binding,
    /// Rejected before crossing into the host.
    Validation,
    /// The host call completed but reported failure.
    Sentinel,
    /// The host call faulted.
    Fault,
}

/// Errors that can occur while talking to the host.
#[derive(Debug, Error)]
pub enum XwfError {
    /// The host module could not be located or loaded.
    #[error("host module unavailable: {0}")]
    HostModuleUnavailable(String),

    /// A required symbol is not exported by the host module.
    #[error("required symbol {symbol} not found in host module")]
    SymbolNotFound {
        /// The missing symbol name.
        symbol: &'static str,
    },

    /// An argument was rejected before the host was called.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A handle is not in the Open state.
    #[error("{kind} handle {raw:#x} is {state}")]
    InvalidHandle {
        /// Handle kind name.
        kind: &'static str,
        /// Raw handle value.
        raw: usize,
        /// State the handle was found in.
        state: HandleState,
    },

    /// No session is bound yet.
    #[error("binding not initialized")]
    NotInitialized,

    /// An entry point was invoked from a thread other than the one that initialized the binding.
    #[error("entry point called from a thread other than the initializing thread")]
    WrongThread,

    /// The host reported failure through the function's return convention.
    #[error("{symbol} reported failure: {detail}")]
    Sentinel {
        /// The host function.
        symbol: &'static str,
        /// What the sentinel was.
        detail: String,
    },

    /// The host function faulted while executing.
    #[error("{symbol} faulted: {message}")]
    ForeignFault {
        /// The host function.
        symbol: &'static str,
        /// Fault description.
        message: String,
    },

    /// The growing-retry protocol hit its ceiling.
    #[error("{symbol} output exceeds {limit} bytes after {attempts} attempts")]
    BufferLimit {
        /// The host function.
        symbol: &'static str,
        /// Configured byte ceiling.
        limit: usize,
        /// Number of calls made.
        attempts: u32,
    },

    /// An item's parent chain loops back on itself.
    #[error("parent chain of item {item} contains a cycle")]
    ParentCycle {
        /// The item whose path was requested.
        item: i32,
    },

    /// An item's parent chain exceeds the configured depth.
    #[error("parent chain of item {item} exceeds {depth} levels")]
    PathTooDeep {
        /// The item whose path was requested.
        item: i32,
        /// Configured depth limit.
        depth: usize,
    },
}

impl XwfError {
    /// Creates a sentinel failure.
    pub fn sentinel(symbol: &'static str, detail: impl Into<String>) -> Self {
        Self::Sentinel {
            symbol,
            detail: detail.into(),
        }
    }

    /// Creates an argument validation error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns the failure class of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            XwfError::HostModuleUnavailable(_) | XwfError::SymbolNotFound { .. } => {
                ErrorClass::Binding
            }
            XwfError::InvalidArgument(_)
            | XwfError::InvalidHandle { .. }
            | XwfError::NotInitialized
            | XwfError::WrongThread => ErrorClass::Validation,
            XwfError::Sentinel { .. }
            | XwfError::BufferLimit { .. }
            | XwfError::ParentCycle { .. }
            | XwfError::PathTooDeep { .. } => ErrorClass::Sentinel,
            XwfError::ForeignFault { .. } => ErrorClass::Fault,
        }
    }

    /// Returns true if the extension must stop operating.
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Binding
    }
}
