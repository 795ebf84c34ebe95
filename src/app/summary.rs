use crate::args::OutputFormat;
use crate::error::AppResult;
use crate::metrics::{LatencySummary, RunStatistics};
use crate::runner::{RunReport, RunState};

pub(crate) const EXIT_OK: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_FAILED: u8 = 2;
pub(crate) const EXIT_CANCELLED: u8 = 130;

/// Print the report to stdout in the requested format.
///
/// # Errors
///
/// Returns an error when JSON serialization fails.
pub(crate) fn print_report(report: &RunReport, format: OutputFormat) -> AppResult<()> {
    match format {
        OutputFormat::Text => {
            for line in summary_lines(report) {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }
    Ok(())
}

/// Process exit code for a finished run.
pub(crate) const fn exit_code(report: &RunReport) -> u8 {
    match report.state {
        RunState::Completed => match report.check_passed() {
            Some(false) => EXIT_FAILED,
            Some(true) | None => EXIT_OK,
        },
        RunState::Aborted => EXIT_FAILED,
        RunState::Cancelled => EXIT_CANCELLED,
        RunState::Idle | RunState::Running => EXIT_ERROR,
    }
}

pub(crate) fn summary_lines(report: &RunReport) -> Vec<String> {
    let stats = &report.statistics;
    let mut lines = Vec::new();

    lines.push(format!("Mode: {}", report.mode.as_str()));
    lines.push(format!("State: {}", report.state.as_str()));
    if let Some(passed) = report.check_passed() {
        lines.push(format!("Check: {}", if passed { "passed" } else { "failed" }));
    }
    lines.push(format!("Duration: {}", format_millis(stats)));
    lines.push(format!("Total Requests: {}", stats.total));
    lines.push(format!(
        "Successful: {} ({}.{:02}%)",
        stats.successes,
        stats.success_rate_x100 / 100,
        stats.success_rate_x100 % 100
    ));
    lines.push(format!("HTTP Errors: {}", stats.http_errors));
    lines.push(format!("Transport Errors: {}", stats.transport_errors));
    lines.push(format!(
        "Achieved RPS: {}.{:02}",
        stats.achieved_rps_x100 / 100,
        stats.achieved_rps_x100 % 100
    ));
    lines.push(format!("Latency (all): {}", latency_line(&stats.latency)));
    lines.push(format!("Latency (ok): {}", latency_line(&stats.success_latency)));
    lines.push(format!("Status Codes: {}", status_codes_line(stats)));
    lines.push(format!("Transport Error Kinds: {}", error_kinds_line(stats)));
    lines.push(format!("Response Bytes: {}", stats.response_bytes));
    lines.push(format!("Peak In-Flight: {}", stats.peak_in_flight));
    if stats.skipped_ticks > 0 {
        lines.push(format!("Skipped Ticks: {}", stats.skipped_ticks));
    }

    if stats.targets.len() > 1 {
        lines.push("Targets:".to_owned());
        for (url, target) in &stats.targets {
            lines.push(format!(
                "  {}: {} attempts, {} ok, {} http errors, {} transport errors, avg {}",
                url,
                target.attempts,
                target.successes,
                target.http_errors,
                target.transport_errors,
                format_us(target.mean_latency_us)
            ));
        }
    }
    lines
}

fn format_millis(stats: &RunStatistics) -> String {
    let millis = u64::try_from(stats.duration.as_millis()).unwrap_or(u64::MAX);
    format!("{}.{:02}s", millis / 1_000, (millis % 1_000) / 10)
}

fn format_us(us: u64) -> String {
    format!("{}.{:02}ms", us / 1_000, (us % 1_000) / 10)
}

fn latency_line(latency: &LatencySummary) -> String {
    if latency.count == 0 {
        return "n/a".to_owned();
    }
    format!(
        "min {} / avg {} / max {} | p50 {} / p90 {} / p99 {}",
        format_us(latency.min_us),
        format_us(latency.mean_us),
        format_us(latency.max_us),
        format_us(latency.p50_us),
        format_us(latency.p90_us),
        format_us(latency.p99_us)
    )
}

fn status_codes_line(stats: &RunStatistics) -> String {
    if stats.status_codes.is_empty() {
        return "none".to_owned();
    }
    stats
        .status_codes
        .iter()
        .map(|(code, count)| format!("{}={}", code, count))
        .collect::<Vec<_>>()
        .join(", ")
}

fn error_kinds_line(stats: &RunStatistics) -> String {
    if stats.transport_error_kinds.is_empty() {
        return "none".to_owned();
    }
    stats
        .transport_error_kinds
        .iter()
        .map(|(kind, count)| format!("{}={}", kind.as_str(), count))
        .collect::<Vec<_>>()
        .join(", ")
}
