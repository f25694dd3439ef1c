//! Text and JSON renderings of a [`RunResult`].

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::errors::{categorize_status_code, ErrorKind};
use crate::result::RunResult;
use crate::utils::truncate_string;

/// Detailed error samples shown in verbose text output.
const MAX_DETAILED_ERRORS: usize = 10;

const RULE: &str = "════════════════════════════════════════════════════════════════";

/// Renders the human-readable summary.
pub fn format_text_report(result: &RunResult, verbose: bool) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_text_report(&mut out, result, verbose);
    out
}

fn write_text_report(out: &mut String, result: &RunResult, verbose: bool) -> std::fmt::Result {
    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "                      BENCHMARK RESULTS")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Benchmark:        {}", result.benchmark_type)?;

    if result.is_cycle() {
        writeln!(out, "CRUD Cycles:      {}", result.total_requests)?;
        writeln!(
            out,
            "  Success:        {} cycles ({:.2}%)",
            result.success_requests,
            result.success_percent()
        )?;
        writeln!(
            out,
            "  Failed:         {} cycles ({:.2}%)",
            result.failed_requests,
            result.failed_percent()
        )?;
        writeln!(out, "Total HTTP Reqs:  ~{}", result.total_http_requests())?;
        writeln!(out, "Duration:         {:?}", result.total_duration)?;
        writeln!(out, "Actual RPS:       {:.2} req/s", result.actual_rps())?;
        writeln!(out, "Cycles/sec:       {:.2} cycles/s", result.cycles_per_second())?;
    } else {
        writeln!(out, "Total Requests:   {}", result.total_requests)?;
        writeln!(
            out,
            "Success:          {} ({:.2}%)",
            result.success_requests,
            result.success_percent()
        )?;
        writeln!(
            out,
            "Failed:           {} ({:.2}%)",
            result.failed_requests,
            result.failed_percent()
        )?;
        writeln!(out, "Duration:         {:?}", result.total_duration)?;
        writeln!(out, "Actual RPS:       {:.2} req/s", result.actual_rps())?;
    }
    if result.dispatched_tasks != result.total_requests {
        writeln!(out, "Dispatched:       {}", result.dispatched_tasks)?;
    }

    let stats = &result.stats;
    writeln!(out)?;
    writeln!(out, "Latency:")?;
    if result.is_cycle() {
        writeln!(out, "  (Full CRUD cycle: CREATE->GET->UPDATE->DELETE)")?;
    }
    writeln!(out, "  Min:            {:?}", stats.min)?;
    writeln!(out, "  Avg:            {:?}", stats.avg)?;
    writeln!(out, "  Max:            {:?}", stats.max)?;
    writeln!(out, "  P50:            {:?}", stats.p50)?;
    writeln!(out, "  P95:            {:?}", stats.p95)?;
    writeln!(out, "  P99:            {:?}", stats.p99)?;

    if result.errors.total_count() > 0 {
        write_error_section(out, result, verbose)?;
    }

    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    Ok(())
}

fn write_error_section(out: &mut String, result: &RunResult, verbose: bool) -> std::fmt::Result {
    let errors = result.errors.sorted_errors();

    writeln!(out)?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "                      ERROR STATISTICS")?;
    writeln!(out, "{}", RULE)?;
    writeln!(out, "Total Errors:     {}", result.errors.total_count())?;
    writeln!(out, "Unique Errors:    {}", errors.len())?;
    writeln!(out)?;

    writeln!(out, "By Category:")?;
    for kind in ErrorKind::all() {
        let count: u64 = errors
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.count)
            .sum();
        if count > 0 {
            writeln!(out, "  {:<30} {}", kind.description(), count)?;
        }
    }
    writeln!(out)?;

    writeln!(out, "┌─────────┬────────────────────────────────┬───────────────┬────────────────────────────────────────┐")?;
    writeln!(out, "│  COUNT  │           OPERATION            │     TYPE      │                MESSAGE                 │")?;
    writeln!(out, "├─────────┼────────────────────────────────┼───────────────┼────────────────────────────────────────┤")?;
    for error in &errors {
        writeln!(
            out,
            "│ {:>7} │ {:<30} │ {:<13} │ {:<38} │",
            error.count,
            cell(&error.operation, 30),
            cell(error.kind.label(), 13),
            cell(&error.message, 38)
        )?;
    }
    writeln!(out, "└─────────┴────────────────────────────────┴───────────────┴────────────────────────────────────────┘")?;

    if !verbose {
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "Detailed Error Samples (with response bodies):")?;
    writeln!(out, "───────────────────────────────────────────────")?;
    for error in errors.iter().take(MAX_DETAILED_ERRORS) {
        writeln!(out)?;
        writeln!(out, "[{}] {} | {}", error.count, error.operation, error.kind)?;
        writeln!(out, "    Message: {}", error.message)?;
        if let Some(status) = error.status_code {
            writeln!(
                out,
                "    Status:  {} ({})",
                status,
                categorize_status_code(status)
            )?;
        }
        writeln!(out, "    First:   {}", clock_time(&error.first_seen))?;
        writeln!(out, "    Last:    {}", clock_time(&error.last_seen))?;
        if !error.sample_body.is_empty() {
            writeln!(out, "    Body:    {}", error.sample_body)?;
        }
    }
    if errors.len() > MAX_DETAILED_ERRORS {
        writeln!(out)?;
        writeln!(
            out,
            "... and {} more unique error types",
            errors.len() - MAX_DETAILED_ERRORS
        )?;
    }
    Ok(())
}

/// Fits `s` into a table column of `width` characters.
fn cell(s: &str, width: usize) -> String {
    if s.trim().chars().count() > width {
        truncate_string(s, width.saturating_sub(3))
    } else {
        s.trim().to_string()
    }
}

fn clock_time(ts: &DateTime<Utc>) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Machine-readable summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub benchmark_type: String,
    pub duration_seconds: f64,
    #[serde(flatten)]
    pub counts: JsonCounts,
    pub dispatched_tasks: u64,
    pub rps: f64,
    pub latency: JsonLatency,
    pub errors: JsonErrors,
}

/// Totals, keyed as requests for simple runs and as cycles for CRUD cycles.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonCounts {
    Requests {
        total_requests: u64,
        success_requests: u64,
        failed_requests: u64,
    },
    Cycles {
        crud_cycles: u64,
        success_cycles: u64,
        failed_cycles: u64,
        total_http_requests: u64,
        cycles_per_second: f64,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonLatency {
    pub min: String,
    pub avg: String,
    pub max: String,
    pub p50: String,
    pub p95: String,
    pub p99: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonErrors {
    pub total: u64,
    pub unique: usize,
    pub list: Vec<JsonError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonError {
    pub count: u64,
    pub operation: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub status_code: Option<u16>,
    pub first_seen: String,
    pub last_seen: String,
}

impl JsonReport {
    pub fn from_result(result: &RunResult) -> Self {
        let counts = if result.is_cycle() {
            JsonCounts::Cycles {
                crud_cycles: result.total_requests,
                success_cycles: result.success_requests,
                failed_cycles: result.failed_requests,
                total_http_requests: result.total_http_requests(),
                cycles_per_second: result.cycles_per_second(),
            }
        } else {
            JsonCounts::Requests {
                total_requests: result.total_requests,
                success_requests: result.success_requests,
                failed_requests: result.failed_requests,
            }
        };

        let stats = &result.stats;
        let list = result
            .errors
            .sorted_errors()
            .into_iter()
            .map(|e| JsonError {
                count: e.count,
                operation: e.operation,
                error_type: e.kind.label().to_string(),
                message: e.message,
                status_code: e.status_code,
                first_seen: rfc3339(&e.first_seen),
                last_seen: rfc3339(&e.last_seen),
            })
            .collect::<Vec<_>>();

        JsonReport {
            benchmark_type: result.benchmark_type.label().to_string(),
            duration_seconds: result.total_duration.as_secs_f64(),
            counts,
            dispatched_tasks: result.dispatched_tasks,
            rps: result.actual_rps(),
            latency: JsonLatency {
                min: format!("{:?}", stats.min),
                avg: format!("{:?}", stats.avg),
                max: format!("{:?}", stats.max),
                p50: format!("{:?}", stats.p50),
                p95: format!("{:?}", stats.p95),
                p99: format!("{:?}", stats.p99),
            },
            errors: JsonErrors {
                total: result.errors.total_count(),
                unique: list.len(),
                list,
            },
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::task::{BenchmarkType, ExecutionOutcome, TaskFailure};
    use crate::worker::RunState;
    use std::time::Duration;

    fn result(kind: BenchmarkType, failures: usize) -> RunResult {
        let state = RunState::new();
        for i in 0..10u64 {
            state.record(&ExecutionOutcome::success(Duration::from_millis(i + 1)));
        }
        for i in 0..failures {
            state.record(&ExecutionOutcome::failure(
                Duration::from_millis(50),
                TaskFailure::new(
                    format!("GET /api/products/{}", i),
                    ErrorKind::ServerError,
                    "server error: 500",
                )
                .with_status(500)
                .with_body("{\"error\":\"boom\"}"),
            ));
        }
        RunResult::calculate(kind, &state, 10 + failures as u64, Duration::from_secs(2))
    }

    #[test]
    fn test_text_report_simple_run() {
        let text = format_text_report(&result(BenchmarkType::GetProducts, 0), false);
        assert!(text.contains("Total Requests:   10"));
        assert!(text.contains("Success:          10 (100.00%)"));
        assert!(text.contains("Actual RPS:       5.00 req/s"));
        assert!(!text.contains("ERROR STATISTICS"));
    }

    #[test]
    fn test_text_report_cycle_and_errors() {
        let text = format_text_report(&result(BenchmarkType::MixedOperations, 2), false);
        assert!(text.contains("CRUD Cycles:      12"));
        assert!(text.contains("Total HTTP Reqs:  ~42"));
        assert!(text.contains("ERROR STATISTICS"));
        assert!(text.contains("server_error"));
        assert!(text.contains("HTTP 5xx Server Errors"));
        assert!(!text.contains("Detailed Error Samples"));
    }

    #[test]
    fn test_verbose_report_caps_detailed_samples() {
        let text = format_text_report(&result(BenchmarkType::GetProductById, 12), true);
        assert!(text.contains("Detailed Error Samples"));
        assert!(text.contains("... and 2 more unique error types"));
        assert!(text.contains("    Status:  500 (Internal Server Error)"));
        assert!(text.contains("    Body:    {\"error\":\"boom\"}"));
    }

    #[test]
    fn test_cell_truncates_long_values() {
        let long = "x".repeat(50);
        let fitted = cell(&long, 38);
        assert_eq!(fitted.chars().count(), 38);
        assert!(fitted.ends_with("..."));
        assert_eq!(cell("short", 38), "short");
    }

    #[test]
    fn test_json_report_simple_keys() {
        let report = JsonReport::from_result(&result(BenchmarkType::GetProducts, 1));
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json_string().unwrap()).unwrap();

        assert_eq!(json["total_requests"], 11);
        assert_eq!(json["failed_requests"], 1);
        assert!(json.get("crud_cycles").is_none());
        assert_eq!(json["errors"]["total"], 1);
        let entry = &json["errors"]["list"][0];
        assert_eq!(entry["type"], "server_error");
        assert_eq!(entry["statusCode"], 500);
        assert!(entry["firstSeen"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_json_report_cycle_keys() {
        let report = JsonReport::from_result(&result(BenchmarkType::MixedOperations, 0));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["crud_cycles"], 10);
        assert_eq!(json["total_http_requests"], 40);
        assert_eq!(json["cycles_per_second"], 5.0);
        assert!(json.get("total_requests").is_none());
        assert_eq!(json["latency"]["p50"], "6ms");
    }
}
