//! # passhotp – Verification Coordinator
//!
//! Plugs the HOTP engine into a request authentication pipeline:
//!
//! - **Field extraction** – bracket-path lookup (`otp[code]`) over body and query data
//! - **Form decoding** – urlencoded bodies into nested request values
//! - **Collaborators** – async key lookup and counter resync supplied by the application
//! - **Strategy** – the `lookup → verify → resync → success` state machine with
//!   distinct `Fail` and `Error` outcomes
//! - **Memory store** – an in-process collaborator for tests and single-node setups

pub mod strategy;
