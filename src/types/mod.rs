//! Core types for the hostwrap supervisor.
//!
//! This module provides foundational types used throughout the system:
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: The persisted wrapper configuration record

mod config;
mod errors;

pub use config::{SavedCredential, WrapperConfig};
pub use errors::{Error, Result};
