//! Threshold evaluation: maps one metrics snapshot to at most one breach.

use chrono::Utc;

use crate::config::ThresholdConfig;
use crate::types::{BreachKind, SystemMetrics, ThresholdBreach};

/// Returns the first configured metric (memory, then disk, then cpu) whose value is
/// strictly above its ceiling. Unset ceilings are skipped. `process_name` is not evaluated.
pub fn evaluate(metrics: &SystemMetrics, thresholds: &ThresholdConfig) -> Option<ThresholdBreach> {
    let checks = [
        (BreachKind::Memory, metrics.memory_percent, thresholds.memory_percent),
        (BreachKind::Disk, metrics.disk_percent, thresholds.disk_percent),
        (BreachKind::Cpu, metrics.cpu_percent, thresholds.cpu_percent),
    ];

    checks.into_iter().find_map(|(kind, current, ceiling)| {
        let ceiling = ceiling?;
        (current > ceiling).then(|| ThresholdBreach {
            kind,
            current_value: current,
            threshold_value: ceiling,
            timestamp: Utc::now(),
        })
    })
}
