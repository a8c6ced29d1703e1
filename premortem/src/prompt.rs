//! Diagnostic prompt built from a breach and the metrics snapshot that triggered it.

use chrono::SecondsFormat;

use crate::types::{SystemMetrics, ThresholdBreach};

pub fn generate_prompt(
    breach: &ThresholdBreach,
    metrics: &SystemMetrics,
    os: &str,
    custom_prompt: Option<&str>,
) -> String {
    let breach_description = format!(
        "CRITICAL: {} usage at {}% (threshold: {}%)",
        breach.kind, breach.current_value, breach.threshold_value
    );

    let metrics_formatted = format!(
        "System Metrics at {}:\n\
         - Operating System: {os}\n\
         - Memory: {}%\n\
         - Disk: {}%\n\
         - CPU: {}%\n\
         - Processes: {}",
        breach.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        metrics.memory_percent,
        metrics.disk_percent,
        metrics.cpu_percent,
        metrics.process_count,
    );

    let diagnostic_request = format!(
        "The system has breached a critical threshold. Please diagnose what is happening on this machine:\n\n\
         {breach_description}\n\n\
         {metrics_formatted}\n\n\
         Investigate and provide a detailed analysis of what might be causing this issue. \
         Do NOT stop to ask for permission or ask questions -- there is not enough time. \
         This is extremely urgent. Your investigation should:\n\
         - identify which processes are running that are causing problems\n\
         - get as granular as possible, down to specific function calls\n\
         - use OS tools like strace, dtruss, and lsof\n\
         - use profilers like py-spy or node inspect\n\n\
         Produce a paragraph detailing what is happening with as much context as possible"
    );

    match custom_prompt.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}\n\n{diagnostic_request}"),
        None => diagnostic_request,
    }
}

/// Human-readable body of the synthetic vitals message sent ahead of the agent output.
pub fn vitals_summary(breach: &ThresholdBreach, metrics: &SystemMetrics) -> String {
    format!(
        "System Vitals at Breach Detection:\n\n\
         Breach Type: {}\n\
         Current Value: {}%\n\
         Threshold: {}%\n\n\
         System Metrics:\n\
         - Memory: {}%\n\
         - Disk: {}%\n\
         - CPU: {}%\n\
         - Processes: {}",
        breach.kind,
        breach.current_value,
        breach.threshold_value,
        metrics.memory_percent,
        metrics.disk_percent,
        metrics.cpu_percent,
        metrics.process_count,
    )
}
