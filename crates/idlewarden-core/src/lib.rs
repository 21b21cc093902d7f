//! Moderation core for idlewarden
//!
//! This crate is the heart of idlewarden, containing:
//! - The protection registry (time-bounded exemptions from idle moves)
//! - The idle sweeper (finds idle clients and moves them to the holding channel)
//! - The command interpreter (chat commands that grant protection)
//! - The reconnect supervisor (Connected -> Reconnecting -> Connected)
//! - The moderator dispatch loop tying them to the session event stream

mod commands;
mod error;
mod gauge;
mod history;
mod moderator;
mod registry;
mod supervisor;
mod sweeper;

pub use commands::*;
pub use error::*;
pub use gauge::*;
pub use history::*;
pub use moderator::*;
pub use registry::*;
pub use supervisor::*;
pub use sweeper::*;
