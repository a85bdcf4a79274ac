//! Advisory memory-pressure monitor.
//!
//! Samples the process resident set size through `sysinfo`. Exceeding the threshold never
//! fails a computation; workers only pause briefly so allocations can settle and callers can
//! shrink caches.

use log::warn;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use sysinfo::{Pid, System};

use crate::common::config::MemoryConfig;

pub struct MemoryMonitor {
    enabled: bool,
    threshold_bytes: u64,
    backoff: Duration,
    pid: Option<Pid>,
    system: Mutex<System>,
    pressure_events: AtomicU64,
}

impl MemoryMonitor {
    pub fn new(config: &MemoryConfig) -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() && config.enabled {
            warn!("Memory monitoring unavailable on this platform");
        }
        Self {
            enabled: config.enabled,
            threshold_bytes: config.threshold_mb.saturating_mul(1024 * 1024),
            backoff: Duration::from_millis(config.backoff_ms),
            pid,
            system: Mutex::new(System::new()),
            pressure_events: AtomicU64::new(0),
        }
    }

    /// Resident set size of this process in bytes, if it can be read.
    pub fn resident_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        system.refresh_process(pid);
        system.process(pid).map(|p| p.memory())
    }

    pub fn is_under_pressure(&self) -> bool {
        if !self.enabled {
            return false;
        }
        matches!(self.resident_bytes(), Some(rss) if rss > self.threshold_bytes)
    }

    /// Sleeps for the configured backoff when memory is above the threshold.
    ///
    /// Returns true if it backed off.
    pub fn backoff_if_needed(&self) -> bool {
        if !self.is_under_pressure() {
            return false;
        }
        let events = self.pressure_events.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(
            "Resident memory above {} MiB (event #{}), backing off {:?}",
            self.threshold_bytes / (1024 * 1024),
            events,
            self.backoff
        );
        std::thread::sleep(self.backoff);
        true
    }

    pub fn pressure_events(&self) -> u64 {
        self.pressure_events.load(Ordering::Relaxed)
    }
}
