pub mod config;
pub mod entries;
pub mod maintenance;
pub mod stats;

pub use config::*;
pub use entries::*;
pub use maintenance::*;
pub use stats::*;
