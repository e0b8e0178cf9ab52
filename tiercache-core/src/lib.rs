//! TierCache Core - two-tier key-value cache
//!
//! This crate provides:
//! - A bounded in-memory overlay of decoded values
//! - A durable SQLite store driven by a single serial worker
//! - The hybrid cache coordinating both tiers
//! - Generic value encoding through the `Codable` capability

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod shared;
pub mod storage;

pub use cache::*;
pub use codec::Codable;
pub use config::*;
pub use error::*;
pub use monitoring::*;
pub use shared::shared;
pub use storage::*;
