//! HOTP engine: sub-modules.

pub mod types;
pub mod core;

// Re-export top-level items for convenience.
pub use types::*;
pub use self::core::{generate, generate_with, key_uri, verify, verify_with};
