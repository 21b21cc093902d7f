//! Online-client gauge

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of voice clients currently online.
///
/// Cheap to clone; every clone reads and writes the same value.
#[derive(Debug, Clone, Default)]
pub struct OnlineGauge {
    value: Arc<AtomicU64>,
}

impl OnlineGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Store `value`, returning whether it changed
    pub fn set(&self, value: u64) -> bool {
        self.value.swap(value, Ordering::Relaxed) != value
    }
}
