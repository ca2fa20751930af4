//! Retry module (ergonomic namespace)
//! - policy.rs: bounded exponential-backoff retries for token exchanges

pub mod policy;

pub use policy::*;
