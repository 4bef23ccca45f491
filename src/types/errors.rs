//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Fatal startup failures map to distinct
//! process exit codes so an operator can tell auth, profile, trust, and launch
//! problems apart without reading logs.

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the hostwrap supervisor.
#[derive(Error, Debug)]
pub enum Error {
    /// Remote service rejected the submitted credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Persisted session/OAuth credential was invalid or expired.
    #[error("session restore failed: {0}")]
    Restore(String),

    /// Profile catalogue unreachable or malformed.
    #[error("profile fetch failed: {0}")]
    ProfileFetch(String),

    /// Signature/trust check failed under the strict enforcement mode.
    #[error("module trust violation: {0}")]
    ModuleTrust(String),

    /// Entry point symbol could not be resolved.
    #[error("entry point resolution failed: {0}")]
    EntryPointResolution(String),

    /// A requested feature is missing a required setting.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Operation is not supported by this restricted variant.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Internal errors.
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Process exit code for a fatal startup failure under `stop_on_error`.
    ///
    /// Each cause gets its own status so the failing phase is visible to the
    /// process supervisor. Normal completion never reaches this path: control
    /// transfers to the external entry point.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => 10,
            Error::Restore(_) => 11,
            Error::ProfileFetch(_) => 12,
            Error::ModuleTrust(_) => 13,
            Error::EntryPointResolution(_) => 14,
            Error::Configuration(_) => 15,
            Error::Unsupported(_) => 16,
            Error::Internal(_) | Error::Serialization(_) | Error::Io(_) => 1,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn restore(msg: impl Into<String>) -> Self {
        Self::Restore(msg.into())
    }

    pub fn profile_fetch(msg: impl Into<String>) -> Self {
        Self::ProfileFetch(msg.into())
    }

    pub fn module_trust(msg: impl Into<String>) -> Self {
        Self::ModuleTrust(msg.into())
    }

    pub fn entry_point(msg: impl Into<String>) -> Self {
        Self::EntryPointResolution(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
