//! At-exit KPI report for an embedding program, gated by the `QUILL_REPORT`
//! environment variable:
//! - unset or `0` -> no report, zero cost
//! - `1` -> human-readable to stderr
//! - `json` -> JSON to stderr (needs the `report-json` feature)
//! - `json:/path` -> JSON to a file
//!
//! Reports this runtime's actual session metrics: heap occupancy and
//! collection count, call/fast-call quota consumed, and peak recursion
//! depth.

#![cfg(feature = "diagnostics")]

use crate::config::VmConfig;
use crate::session::Session;
use quill_core::Heap;
use std::io::Write;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportDestination {
    Stderr,
    File(String),
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub format: ReportFormat,
    pub destination: ReportDestination,
}

impl ReportConfig {
    pub fn from_env() -> Option<Self> {
        let val = std::env::var("QUILL_REPORT").ok()?;
        if val.is_empty() {
            return None;
        }
        match val.as_str() {
            "0" => None,
            "1" => Some(ReportConfig { format: ReportFormat::Human, destination: ReportDestination::Stderr }),
            "json" => Some(ReportConfig { format: ReportFormat::Json, destination: ReportDestination::Stderr }),
            s if s.starts_with("json:") => Some(ReportConfig {
                format: ReportFormat::Json,
                destination: ReportDestination::File(s[5..].to_string()),
            }),
            _ => {
                tracing::warn!(value = %val, "QUILL_REPORT not recognized, ignoring");
                None
            }
        }
    }
}

fn report_config() -> &'static Option<ReportConfig> {
    static CONFIG: OnceLock<Option<ReportConfig>> = OnceLock::new();
    CONFIG.get_or_init(ReportConfig::from_env)
}

#[derive(Debug)]
pub struct ReportData {
    pub heap_used_bytes: usize,
    pub heap_capacity_bytes: usize,
    pub collections: u64,
    pub call_quota: u64,
    pub call_budget_remaining: u64,
    pub fast_call_quota: u64,
    pub fast_call_budget_remaining: u64,
    pub recursion_limit: usize,
    pub recursion_depth: usize,
}

impl ReportData {
    pub fn collect(heap: &Heap, session: &Session, config: &VmConfig) -> ReportData {
        ReportData {
            heap_used_bytes: heap.used(),
            heap_capacity_bytes: heap.capacity(),
            collections: heap.collections(),
            call_quota: config.call_quota,
            call_budget_remaining: session.call_budget_remaining(),
            fast_call_quota: config.fast_call_quota,
            fast_call_budget_remaining: session.fast_call_budget_remaining(),
            recursion_limit: config.recursion_limit,
            recursion_depth: session.recursion_depth(),
        }
    }
}

fn format_human(data: &ReportData) -> String {
    let mut out = String::new();
    out.push_str("=== QUILL REPORT ===\n");
    out.push_str(&format!("Heap used:        {} bytes\n", data.heap_used_bytes));
    out.push_str(&format!("Heap capacity:    {} bytes\n", data.heap_capacity_bytes));
    out.push_str(&format!("Collections:      {}\n", data.collections));
    out.push_str(&format!(
        "Calls consumed:   {}/{}\n",
        data.call_quota - data.call_budget_remaining,
        data.call_quota
    ));
    out.push_str(&format!(
        "Fast calls used:  {}/{}\n",
        data.fast_call_quota - data.fast_call_budget_remaining,
        data.fast_call_quota
    ));
    out.push_str(&format!("Recursion depth:  {}/{}\n", data.recursion_depth, data.recursion_limit));
    out.push_str("=====================\n");
    out
}

#[cfg(feature = "report-json")]
fn format_json(data: &ReportData) -> String {
    let mut map = serde_json::Map::new();
    map.insert("heap_used_bytes".into(), data.heap_used_bytes.into());
    map.insert("heap_capacity_bytes".into(), data.heap_capacity_bytes.into());
    map.insert("collections".into(), data.collections.into());
    map.insert("call_quota".into(), data.call_quota.into());
    map.insert("calls_consumed".into(), (data.call_quota - data.call_budget_remaining).into());
    map.insert("fast_call_quota".into(), data.fast_call_quota.into());
    map.insert(
        "fast_calls_consumed".into(),
        (data.fast_call_quota - data.fast_call_budget_remaining).into(),
    );
    map.insert("recursion_limit".into(), data.recursion_limit.into());
    map.insert("recursion_depth".into(), data.recursion_depth.into());
    serde_json::to_string(&serde_json::Value::Object(map)).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(not(feature = "report-json"))]
fn format_json(data: &ReportData) -> String {
    tracing::warn!("QUILL_REPORT=json requires the 'report-json' feature; falling back to human format");
    format_human(data)
}

/// Emit the configured report, if `QUILL_REPORT` asked for one. A no-op
/// otherwise — intended to be called once, at the end of an embedder's
/// `main`, after the session that produced `heap`/`session` has ended.
pub fn maybe_emit(heap: &Heap, session: &Session, config: &VmConfig) {
    let Some(report_config) = report_config() else { return };
    let data = ReportData::collect(heap, session, config);
    let output = match report_config.format {
        ReportFormat::Human => format_human(&data),
        ReportFormat::Json => format_json(&data),
    };
    match &report_config.destination {
        ReportDestination::Stderr => {
            let _ = std::io::stderr().write_all(output.as_bytes());
        }
        ReportDestination::File(path) => {
            if let Ok(mut f) = std::fs::File::create(path) {
                let _ = f.write_all(output.as_bytes());
            } else {
                tracing::warn!(path, "could not write report to file");
                let _ = std::io::stderr().write_all(output.as_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::Heap;

    #[test]
    fn human_format_reports_quota_consumption() {
        let config = VmConfig::default();
        let mut session = Session::new(&config);
        session.tick_call().unwrap();
        session.tick_call().unwrap();
        let heap = Heap::new(4096);
        let data = ReportData::collect(&heap, &session, &config);
        let out = format_human(&data);
        assert!(out.contains("Calls consumed:   2/"));
    }

    #[test]
    fn parses_a_json_file_destination() {
        std::env::set_var("QUILL_REPORT", "json:/tmp/quill-report-test.json");
        let cfg = ReportConfig::from_env().unwrap();
        assert_eq!(cfg.format, ReportFormat::Json);
        assert_eq!(cfg.destination, ReportDestination::File("/tmp/quill-report-test.json".to_string()));
        std::env::remove_var("QUILL_REPORT");
    }
}
