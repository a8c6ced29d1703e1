//! Metrics collection using sysinfo.

use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use sysinfo::{
    CpuRefreshKind, Disks, MemoryRefreshKind, ProcessRefreshKind, ProcessesToUpdate, RefreshKind,
    System, MINIMUM_CPU_UPDATE_INTERVAL,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use crate::error::MetricsError;
use crate::types::SystemMetrics;

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self) -> Result<SystemMetrics, MetricsError>;
}

/// Persistent sysinfo handles. CPU usage is a delta between two refreshes, so the
/// `System` must outlive a single poll.
pub struct SysinfoMetrics {
    sys: Mutex<System>,
    disks: Mutex<Disks>,
    primed_at: Instant,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        let mut sys = System::new_with_specifics(refresh_kind);
        sys.refresh_cpu_usage();

        Self {
            sys: Mutex::new(sys),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            primed_at: Instant::now(),
        }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricsSource for SysinfoMetrics {
    async fn fetch(&self) -> Result<SystemMetrics, MetricsError> {
        // First poll right after startup: wait out the minimum sampling window.
        let since_prime = self.primed_at.elapsed();
        if since_prime < MINIMUM_CPU_UPDATE_INTERVAL {
            sleep(MINIMUM_CPU_UPDATE_INTERVAL - since_prime).await;
        }

        let (memory_percent, cpu_percent, process_count) = {
            let mut sys = self.sys.lock().await;
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                sys.refresh_cpu_usage();
                sys.refresh_memory();
                sys.refresh_processes_specifics(
                    ProcessesToUpdate::All,
                    true,
                    ProcessRefreshKind::nothing(),
                );
            })) {
                warn!("sysinfo refresh panicked: {e:?}");
                return Err(MetricsError::Collection("sysinfo refresh panicked".into()));
            }

            let total = sys.total_memory();
            if total == 0 {
                return Err(MetricsError::Collection("total memory reported as zero".into()));
            }
            let used = total.saturating_sub(sys.available_memory());
            (
                percent(used as f64 / total as f64 * 100.0),
                percent(f64::from(sys.global_cpu_usage())),
                sys.processes().len(),
            )
        };

        let disk_percent = {
            let mut disks = self.disks.lock().await;
            disks.refresh(true);
            disk_usage_percent(
                disks
                    .list()
                    .iter()
                    .map(|d| (d.mount_point(), d.total_space(), d.available_space())),
            )
        };

        Ok(SystemMetrics {
            memory_percent,
            disk_percent,
            cpu_percent,
            process_count,
        })
    }
}

fn percent(v: f64) -> u8 {
    v.round().clamp(0.0, 100.0) as u8
}

// Root filesystem if present, else the first disk with a size; 0 without any disk.
fn disk_usage_percent<'a, I>(disks: I) -> u8
where
    I: IntoIterator<Item = (&'a Path, u64, u64)>,
{
    let sized: Vec<_> = disks.into_iter().filter(|(_, total, _)| *total > 0).collect();
    let pick = sized
        .iter()
        .find(|(mount, _, _)| *mount == Path::new("/"))
        .or_else(|| sized.first());
    match pick {
        Some((_, total, available)) => {
            let used = total.saturating_sub(*available);
            percent(used as f64 / *total as f64 * 100.0)
        }
        None => 0,
    }
}

/// Operating system description for prompts, e.g. `Linux (6.8.0-45-generic)`.
pub fn os_description() -> String {
    let name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| std::env::consts::OS.to_string());
    match System::kernel_version() {
        Some(kernel) => format!("{name} ({kernel})"),
        None => name,
    }
}
