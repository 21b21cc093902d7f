//! Session connection interface for idlewarden
//!
//! This crate defines the narrow interface between the moderation core and
//! the live voice-server connection. It contains no protocol code itself;
//! `idlewarden-serverquery` provides the real implementation and
//! [`MockSession`] stands in for it in tests.

mod events;
mod mock;
mod traits;
mod types;

pub use events::*;
pub use mock::*;
pub use traits::*;
pub use types::*;
