//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Owner-only operational commands
pub mod admin;

/// General utility commands
pub mod general;

/// Mining commands: state, purchase, claim and history
pub mod mining;

// Export commands
pub use admin::*;
pub use general::*;
pub use mining::*;
