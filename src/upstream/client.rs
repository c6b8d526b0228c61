//! Builds and sends the `POST {base}/conversation` request (spec §4.6), with whole-request retry
//! on `Network`/5xx before any byte has reached the client.

use backon::{ExponentialBuilder, Retryable};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use std::time::Duration;

use crate::credential::Credential;
use crate::error::{IsRetryable, KiroError};
use crate::quota::{self, QuotaOutcome};
use kiro_schema::kiro::ConversationRequest;

const DEFAULT_AGENT_VERSION: &str = "0.1.0";
const KIRO_USER_AGENT: &str = "KiroIDE";
const KIRO_AGENT_VERSION_HEADER: &str = "x-amzn-kiro-agent-version";
const KIRO_USER_AGENT_HEADER: &str = "x-amz-user-agent";

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    retry_policy: ExponentialBuilder,
}

impl UpstreamClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .http2_adaptive_window(true)
            .build()
            .expect("failed to build upstream reqwest client");

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(500))
            .with_max_delay(Duration::from_secs(2))
            .with_max_times(3)
            .with_jitter();

        Self {
            http,
            base_url,
            retry_policy,
        }
    }

    /// Sends the conversation request and returns the raw HTTP response with headers already
    /// received. Retries internally on `Network`/5xx — always before a single byte of the body
    /// has been read, so this never violates the no-mid-stream-retry rule.
    pub async fn send_conversation(
        &self,
        credential: &Credential,
        fingerprint: &str,
        request: &ConversationRequest,
    ) -> Result<reqwest::Response, KiroError> {
        let url = format!("{}/conversation", self.base_url.trim_end_matches('/'));
        let headers = build_headers(credential, fingerprint)?;

        (|| {
            let http = self.http.clone();
            let url = url.clone();
            let headers = headers.clone();
            async move {
                let response = http
                    .post(&url)
                    .headers(headers)
                    .json(request)
                    .send()
                    .await
                    .map_err(|err| KiroError::Network(err.to_string()))?;

                if response.status().is_server_error() {
                    return Err(KiroError::UpstreamServerError(response.status()));
                }
                Ok(response)
            }
        })
        .retry(self.retry_policy)
        .when(IsRetryable::is_retryable)
        .await
    }

    /// Classifies a non-success response body into a quota/content-length/auth/server error.
    pub async fn classify_error_response(&self, response: reqwest::Response) -> KiroError {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return KiroError::AuthExpired;
        }

        let body = response.text().await.unwrap_or_default();
        match quota::classify(status, &body) {
            QuotaOutcome::QuotaExceeded { marker } => KiroError::QuotaExceeded { marker },
            QuotaOutcome::ContentTooLong { marker } => KiroError::ContentTooLong { marker },
            QuotaOutcome::None if status.is_server_error() => {
                KiroError::UpstreamServerError(status)
            }
            QuotaOutcome::None => KiroError::Internal(format!("unexpected upstream status {status}")),
        }
    }
}

fn build_headers(credential: &Credential, fingerprint: &str) -> Result<HeaderMap, KiroError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", credential.access_token))
            .map_err(|err| KiroError::Internal(format!("invalid access token header: {err}")))?,
    );
    headers.insert(
        KIRO_AGENT_VERSION_HEADER,
        HeaderValue::from_static(DEFAULT_AGENT_VERSION),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(KIRO_USER_AGENT));
    headers.insert(
        KIRO_USER_AGENT_HEADER,
        HeaderValue::from_str(fingerprint)
            .map_err(|err| KiroError::Internal(format!("invalid fingerprint header: {err}")))?,
    );
    Ok(headers)
}
