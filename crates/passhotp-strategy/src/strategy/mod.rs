//! Strategy crate: sub-modules.

pub mod types;
pub mod field;
pub mod form;
pub mod collaborators;
pub mod memory_store;
pub mod service;

// Re-export top-level items for convenience.
pub use types::*;
pub use collaborators::{CounterResync, HotpKey, KeyLookup};
pub use memory_store::{MemoryKeyStore, MemoryStoreError};
pub use service::{HotpStrategy, Strategy};
pub use passhotp_engine::hotp::{Algorithm, HotpError, HotpParams, SecretKey, Verification};
