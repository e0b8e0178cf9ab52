//! Memory overlay for TierCache
//!
//! This module provides the bounded in-process tier and its eviction policies

pub mod eviction;
pub mod overlay;

pub use eviction::*;
pub use overlay::*;
