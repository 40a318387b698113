//! # passhotp – HOTP Engine
//!
//! Pure counter-based one-time password primitives:
//!
//! - **RFC 4226** – HOTP generation with SHA-1 (default), SHA-256, SHA-512
//! - **Look-ahead verification** – forward window search with constant-time comparison
//! - **Secrets** – zeroised key buffers, base-32 import/export, random generation
//! - **otpauth:// URIs** – provisioning links per the Google Authenticator key URI format
//!
//! Nothing in this crate performs I/O or holds state; every function may be
//! called concurrently from any thread.

pub mod hotp;
