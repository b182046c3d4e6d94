//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// General utility commands
pub mod general;

/// Reminder engine administration commands
pub mod reminder;

// Export commands
pub use general::*;
pub use reminder::*;
