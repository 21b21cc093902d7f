//! ServerQuery adapter for idlewarden
//!
//! This crate provides:
//! - The ServerQuery line codec (escaping, records, error lines)
//! - A TCP connection with a background reader and serialized commands
//! - [`ServerQuerySession`], the `SessionConnection` used in production

mod adapter;
mod codec;
mod connection;
#[cfg(test)]
mod testing;

pub use adapter::*;
pub use codec::*;
