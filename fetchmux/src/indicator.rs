//! Network activity indicator sinks.
//!
//! The [`DownloadManager`](crate::manager::DownloadManager) reports whether any
//! download is in flight through an injected [`ActivityIndicator`]. Updates are
//! always delivered on the notification context, so a sink backed by UI state
//! can be written to directly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::info;

/// A boolean sink for "network activity in progress".
pub trait ActivityIndicator: Send + Sync {
    /// Sets the indicator. May be called repeatedly with the same value.
    fn set_active(&self, active: bool);
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl ActivityIndicator for NoopIndicator {
    fn set_active(&self, _active: bool) {}
}

/// An indicator whose state can be observed, e.g. by a status line or a test.
#[derive(Debug, Default)]
pub struct SharedIndicator {
    active: AtomicBool,
    updates: AtomicU64,
}

impl SharedIndicator {
    /// Creates an inactive indicator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last value written.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns how many times the indicator has been written.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }
}

impl ActivityIndicator for SharedIndicator {
    fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

/// Logs transitions between idle and active.
#[derive(Debug, Default)]
pub struct LogIndicator {
    active: AtomicBool,
}

impl ActivityIndicator for LogIndicator {
    fn set_active(&self, active: bool) {
        if self.active.swap(active, Ordering::SeqCst) != active {
            if active {
                info!("network activity started");
            } else {
                info!("network activity finished");
            }
        }
    }
}
