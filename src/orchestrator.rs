//! Request Orchestrator (spec §4.8): the only place that ties the Account Pool, Credential
//! Lifecycle and Upstream Client together into one request. Protocol translation happens on
//! either side of this module, not inside it — this only ever sees a [`ConversationRequest`] in
//! and a raw upstream response out.

use std::sync::Arc;

use chrono::Utc;
use futures::Stream;
use tracing::{info, warn};

use kiro_schema::kiro::{ConversationRequest, KiroEvent};

use crate::affinity::SessionKey;
use crate::credential::{Account, Credential};
use crate::error::KiroError;
use crate::fingerprint::machine_fingerprint;
use crate::flow::{FlowRecord, FlowStatus, Protocol, SharedFlowSink};
use crate::pool::AccountPoolHandle;
use crate::refresher::{RefresherHandle, RefreshErrorKind};
use crate::upstream::{self, UpstreamClient};

/// An account is retried at most twice after its first failure — three attempts total — before
/// the request gives up (spec §4.6).
const MAX_ATTEMPTS: u32 = 3;

#[derive(Clone)]
pub struct Orchestrator {
    pool: AccountPoolHandle,
    refresher: RefresherHandle,
    upstream: Arc<UpstreamClient>,
    flow_sink: SharedFlowSink,
}

/// A request that reached the upstream successfully: the account it was sent on (to report
/// success/failure as its events get consumed downstream) plus the raw response to decode.
pub struct ExecutedRequest {
    pub account_id: String,
    response: reqwest::Response,
}

impl ExecutedRequest {
    /// Lazily decodes the response body into Kiro events, for a streaming caller to translate
    /// fragment by fragment.
    pub fn into_event_stream(self) -> impl Stream<Item = Result<KiroEvent, KiroError>> {
        upstream::decode_events(Box::pin(self.response.bytes_stream()))
    }

    /// Drains the full event stream for a non-streaming caller.
    pub async fn collect_events(self) -> Result<Vec<KiroEvent>, KiroError> {
        use futures::StreamExt;
        let mut stream = std::pin::pin!(self.into_event_stream());
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event?);
        }
        Ok(events)
    }
}

impl Orchestrator {
    pub fn new(pool: AccountPoolHandle, refresher: RefresherHandle, upstream: Arc<UpstreamClient>, flow_sink: SharedFlowSink) -> Self {
        Self { pool, refresher, upstream, flow_sink }
    }

    /// Runs the account-selection/failover loop and returns the first successful upstream
    /// response. Failure handling per account: quota → cooldown, auth failure → one refresh
    /// attempt then unhealthy if that also fails, anything else → move on without touching the
    /// account's health (the internal client retry already absorbed transient network/5xx noise).
    pub async fn execute(
        &self,
        protocol: Protocol,
        session_key: Option<SessionKey>,
        client_model: String,
        request: ConversationRequest,
    ) -> Result<ExecutedRequest, KiroError> {
        let started_at = Utc::now();
        let mut last_err = KiroError::NoAccountAvailable;

        for attempt in 0..MAX_ATTEMPTS {
            // Only the first attempt honours session affinity; a failover deliberately widens
            // the search instead of re-selecting the account that just failed.
            let key = if attempt == 0 { session_key } else { None };
            let Some(account) = self.pool.select(key).await? else {
                break;
            };
            let account_id = account.credential.id.clone();
            let fingerprint = machine_fingerprint(&account_id, started_at);

            match self.try_account(&account, &fingerprint, &request).await {
                Ok(response) => {
                    self.pool.report_success(&account_id);
                    return Ok(ExecutedRequest { account_id, response });
                }
                Err(err @ KiroError::ContentTooLong { .. }) => {
                    self.emit_flow(protocol, &client_model, &request.model, Some(account_id), started_at, FlowStatus::Failure, &err);
                    return Err(err);
                }
                Err(err) => {
                    self.handle_account_failure(&account_id, &err);
                    warn!(account_id = %account_id, attempt, error = %err, "request failed on this account, trying another");
                    last_err = err;
                }
            }
        }

        self.emit_flow(protocol, &client_model, &request.model, None, started_at, FlowStatus::Failure, &last_err);
        Err(last_err)
    }

    /// Sends one account's attempt, transparently refreshing and retrying once on `AuthExpired`.
    async fn try_account(&self, account: &Account, fingerprint: &str, request: &ConversationRequest) -> Result<reqwest::Response, KiroError> {
        let response = self.send(&account.credential, fingerprint, request).await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let err = self.upstream.classify_error_response(response).await;
        if !matches!(err, KiroError::AuthExpired) {
            return Err(err);
        }

        let refreshed = self.refresh_credential(&account.credential).await?;
        let response = self.send(&refreshed, fingerprint, request).await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(self.upstream.classify_error_response(response).await)
        }
    }

    async fn send(&self, credential: &Credential, fingerprint: &str, request: &ConversationRequest) -> Result<reqwest::Response, KiroError> {
        self.upstream.send_conversation(credential, fingerprint, request).await
    }

    async fn refresh_credential(&self, credential: &Credential) -> Result<Credential, KiroError> {
        match self.refresher.refresh(credential.id.clone(), credential.clone()).await {
            Ok(Ok(success)) => {
                self.pool.apply_refresh(credential.id.clone(), success.access_token.clone(), success.expires_at);
                Ok(Credential { access_token: success.access_token, expires_at: success.expires_at, ..credential.clone() })
            }
            Ok(Err(RefreshErrorKind::InvalidRefreshToken)) => {
                self.pool.report_unhealthy(credential.id.clone(), "invalid_grant while recovering from an expired access token");
                Err(KiroError::InvalidRefreshToken)
            }
            Ok(Err(_)) => Err(KiroError::AuthExpired),
            Err(err) => Err(err),
        }
    }

    fn handle_account_failure(&self, account_id: &str, err: &KiroError) {
        match err {
            KiroError::QuotaExceeded { .. } => self.pool.report_quota_exceeded(account_id),
            KiroError::InvalidRefreshToken => {
                self.pool.report_unhealthy(account_id, "refresh token rejected by upstream")
            }
            // Network/5xx noise already absorbed the client's own retry budget; don't penalize
            // the account for what may just be a transient upstream blip.
            _ => {}
        }
    }

    /// Reports how the request concluded, once its outcome is known to the caller (success,
    /// failure up front, or cancellation mid-stream).
    pub fn record_outcome(
        &self,
        protocol: Protocol,
        client_model: &str,
        upstream_model: &str,
        account_id: Option<String>,
        started_at: chrono::DateTime<Utc>,
        status: FlowStatus,
        tokens_in: u32,
        tokens_out: u32,
    ) {
        self.flow_sink.record(FlowRecord {
            id: uuid::Uuid::new_v4(),
            protocol,
            client_model: client_model.to_string(),
            upstream_model: upstream_model.to_string(),
            account_id,
            started_at,
            finished_at: Utc::now(),
            status,
            tokens_in,
            tokens_out,
            error_kind: None,
        });
    }

    fn emit_flow(
        &self,
        protocol: Protocol,
        client_model: &str,
        upstream_model: &str,
        account_id: Option<String>,
        started_at: chrono::DateTime<Utc>,
        status: FlowStatus,
        err: &KiroError,
    ) {
        self.flow_sink.record(FlowRecord {
            id: uuid::Uuid::new_v4(),
            protocol,
            client_model: client_model.to_string(),
            upstream_model: upstream_model.to_string(),
            account_id,
            started_at,
            finished_at: Utc::now(),
            status,
            tokens_in: 0,
            tokens_out: 0,
            error_kind: Some(err.to_string()),
        });
        info!(protocol = ?protocol, client_model, "request failed after exhausting account failover");
    }
}
