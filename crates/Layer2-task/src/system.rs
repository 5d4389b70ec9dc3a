//! Host resource snapshot for status reports
//!
//! cpu/memory/disk via sysinfo. Disk usage is measured on the filesystem
//! mounted at `/`.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use sysinfo::{Disks, System};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_usage: f64,
}

/// Used share in percent, `None` when the total is unknown
pub fn used_percent(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(total.saturating_sub(available) as f64 * 100.0 / total as f64)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Samples host usage; cpu is measured since the previous call
pub struct SystemProbe {
    system: Mutex<System>,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // baseline for the first cpu delta
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
        }
    }

    fn root_disk_percent() -> Option<f64> {
        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))?;
        used_percent(root.total_space(), root.available_space())
    }

    pub fn snapshot(&self) -> SystemSnapshot {
        let (cpu, memory) = {
            let mut system = self.system.lock();
            system.refresh_cpu();
            system.refresh_memory();
            let cpu = f64::from(system.global_cpu_info().cpu_usage());
            let memory = used_percent(system.total_memory(), system.available_memory());
            (cpu, memory)
        };

        SystemSnapshot {
            cpu_percent: round1(cpu.clamp(0.0, 100.0)),
            memory_percent: round1(memory.unwrap_or(0.0)),
            disk_usage: round1(Self::root_disk_percent().unwrap_or(0.0)),
        }
    }
}
