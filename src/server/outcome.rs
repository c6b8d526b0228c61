//! Makes sure [`Orchestrator::record_outcome`] fires exactly once per request, even when the
//! client disconnects mid-stream and no handler code ever runs to say so.

use chrono::{DateTime, Utc};

use crate::flow::{FlowStatus, Protocol};
use crate::orchestrator::Orchestrator;

pub struct CancelGuard {
    orchestrator: Orchestrator,
    protocol: Protocol,
    client_model: String,
    upstream_model: String,
    account_id: String,
    started_at: DateTime<Utc>,
    tokens_in: u32,
    completed: bool,
}

impl CancelGuard {
    pub fn new(
        orchestrator: Orchestrator,
        protocol: Protocol,
        client_model: String,
        upstream_model: String,
        account_id: String,
        started_at: DateTime<Utc>,
        tokens_in: u32,
    ) -> Self {
        Self {
            orchestrator,
            protocol,
            client_model,
            upstream_model,
            account_id,
            started_at,
            tokens_in,
            completed: false,
        }
    }

    /// Records the final outcome, with however many output tokens the caller observed. Consumes
    /// the guard so `Drop` won't also report it.
    pub fn complete(mut self, status: FlowStatus, tokens_out: u32) {
        self.completed = true;
        self.report(status, tokens_out);
    }

    fn report(&self, status: FlowStatus, tokens_out: u32) {
        self.orchestrator.record_outcome(
            self.protocol,
            &self.client_model,
            &self.upstream_model,
            Some(self.account_id.clone()),
            self.started_at,
            status,
            self.tokens_in,
            tokens_out,
        );
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.completed {
            self.completed = true;
            // Whatever was already streamed to the client before the disconnect isn't tracked
            // here; the translator that observed it is already gone by the time `Drop` runs.
            self.report(FlowStatus::Cancelled, 0);
        }
    }
}
