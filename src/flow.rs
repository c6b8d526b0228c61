//! Flow Record emission (spec §3, §4.8). Storage is external; the core only names the events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    OpenAi,
    Anthropic,
    Gemini,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Success,
    Failure,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowRecord {
    pub id: Uuid,
    pub protocol: Protocol,
    pub client_model: String,
    pub upstream_model: String,
    pub account_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: FlowStatus,
    pub tokens_in: u32,
    pub tokens_out: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// External collaborator the core calls out to on request termination; storage/dashboards are
/// out of scope (spec §1) and live entirely on the other side of this trait.
pub trait FlowSink: Send + Sync {
    fn record(&self, record: FlowRecord);
}

/// Default sink: one structured log line per flow. Good enough standalone, and a real
/// monitoring store can wrap/replace it without touching the orchestrator.
pub struct TracingFlowSink;

impl FlowSink for TracingFlowSink {
    fn record(&self, record: FlowRecord) {
        tracing::info!(
            flow.id = %record.id,
            flow.protocol = ?record.protocol,
            flow.client_model = %record.client_model,
            flow.upstream_model = %record.upstream_model,
            flow.account_id = record.account_id.as_deref().unwrap_or("-"),
            flow.status = ?record.status,
            flow.tokens_in = record.tokens_in,
            flow.tokens_out = record.tokens_out,
            flow.error_kind = record.error_kind.as_deref().unwrap_or("-"),
            "flow record"
        );
    }
}

pub type SharedFlowSink = Arc<dyn FlowSink>;
