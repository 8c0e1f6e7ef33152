//! # AdRelay Core
//!
//! Shared building blocks for every AdRelay crate:
//! - `types`: flat records (accounts, ads, destinations, forwarding logs)
//! - `traits`: the `Store` and `Transport` seams the scheduler runs against
//! - `config`: TOML configuration with serde defaults
//! - `tier`: free vs. premium policy (cycle delay, forced footer)
//! - `error`: the crate-wide error type

pub mod config;
pub mod error;
pub mod tier;
pub mod traits;
pub mod types;

pub use config::AdRelayConfig;
pub use error::{AdRelayError, Result};
pub use tier::{Tier, TierPolicy};
