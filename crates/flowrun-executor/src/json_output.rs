//! Machine-readable run events, one JSON object per stdout line.

use serde::Serialize;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use flowrun_core::ExecutorStatusSnapshot;

use crate::wiring::WiringReport;

/// Set once by the binary when `--json` is passed.
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Turn on JSON lines on stdout for the rest of the process.
pub fn enable_json_mode() {
    JSON_MODE.store(true, Ordering::SeqCst);
}

pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

/// Kinds of run events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonEventType {
    AgentListening,
    RunSkipped,
    RunCompleted,
    RunFailed,
}

/// One line of JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEvent {
    pub event: JsonEventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl JsonEvent {
    /// Stamp an event with the current time.
    pub fn new(event: JsonEventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Write the event to stdout when JSON mode is on.
    pub fn emit(&self) {
        if !is_json_mode() {
            return;
        }
        let mut stdout = io::stdout().lock();
        if serde_json::to_writer(&mut stdout, self).is_ok() {
            let _ = stdout.write_all(b"\n");
            let _ = stdout.flush();
        }
    }
}

/// Emit an agent_listening event.
pub fn emit_agent_listening(addr: &str) {
    JsonEvent::new(
        JsonEventType::AgentListening,
        serde_json::json!({ "addr": addr }),
    )
    .emit();
}

/// Emit a run_skipped event for a flow of another context.
pub fn emit_run_skipped(flow_id: i32, context_id: i32) {
    JsonEvent::new(
        JsonEventType::RunSkipped,
        serde_json::json!({
            "flow_id": flow_id,
            "context_id": context_id,
        }),
    )
    .emit();
}

/// Emit a run_completed event with the final status.
pub fn emit_run_completed(report: WiringReport, status: ExecutorStatusSnapshot) {
    JsonEvent::new(
        JsonEventType::RunCompleted,
        serde_json::json!({
            "wiring": report,
            "status": status,
        }),
    )
    .emit();
}

/// Emit a run_failed event.
pub fn emit_run_failed(error: &str, resolution_failure: bool) {
    JsonEvent::new(
        JsonEventType::RunFailed,
        serde_json::json!({
            "error": error,
            "resolution_failure": resolution_failure,
        }),
    )
    .emit();
}
