//! # Hostwrap - Embedded Server Supervisor
//!
//! Host-side supervisor that prepares an execution environment for an
//! externally supplied server entry point:
//! - Machine-identity authentication with a durable session (raw session
//!   token or OAuth pair, restored across restarts and disconnects)
//! - Trust-gated extension module loading with ordered lifecycle events
//! - Profile resolution matching the local server binding against the
//!   remote catalogue
//! - Entry-point dispatch through a pluggable resolver
//!
//! ## Architecture
//!
//! ```text
//!             ┌──────────────────────────────────────┐
//!  startup →  │            Supervisor                │
//!             │  ┌─────────┐ ┌─────────┐ ┌────────┐  │
//!             │  │ Session │ │ Profile │ │ Module │  │
//!             │  │ Manager │ │Resolver │ │ Loader │  │
//!             │  └─────────┘ └─────────┘ └────────┘  │
//!             │        ┌───────────────┐             │
//!  disconnect │        │   Reconnect   │             │ → entry point
//!  notices  → │        │  Supervisor   │             │   (blocking)
//!             │        └───────────────┘             │
//!             └──────────────────────────────────────┘
//! ```
//!
//! The wire transport, the remote launch service, and config file parsing are
//! external collaborators behind the `transport` and `config_store`
//! boundaries.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod config_store;
pub mod launch;
pub mod modules;
pub mod profiles;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod types;

// Internal utilities
pub mod observability;

pub use supervisor::Supervisor;
pub use types::{Error, Result, SavedCredential, WrapperConfig};
