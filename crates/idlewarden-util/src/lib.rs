//! Shared utilities for idlewarden
//!
//! This crate provides:
//! - ID types (ClientId, ChannelId, ClientDbId)
//! - Time utilities (monotonic instants for expiry, wall-clock helpers)
//! - Default paths for the config file and data directory

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
