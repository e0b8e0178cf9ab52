//! Persistent storage layer for TierCache
//!
//! This module provides the SQLite-backed store, the record envelope written
//! to it, and the hybrid cache coordinating the store with the memory overlay

pub mod hybrid;
pub mod persistent;
pub mod record;

pub use hybrid::*;
pub use persistent::*;
pub use record::*;
