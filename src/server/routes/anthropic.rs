use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response, Sse, sse::KeepAlive},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kiro_schema::anthropic::{AnthropicMessage, ContentBlock, MessagesRequest, StreamEvent, SystemPrompt};

use crate::affinity::session_key;
use crate::error::KiroError;
use crate::flow::{FlowStatus, Protocol};
use crate::model_catalog;
use crate::server::outcome::CancelGuard;
use crate::server::router::AppState;
use crate::translate::{self, estimate_tokens};

use super::sse::build_sse_stream;

fn stream_error_event(err: &KiroError) -> Vec<StreamEvent> {
    let api_error = err.as_api_error();
    let error = serde_json::to_value(api_error).unwrap_or(serde_json::Value::Null);
    vec![StreamEvent::Error { error }]
}

pub async fn messages(State(state): State<AppState>, Json(request): Json<MessagesRequest>) -> Result<Response, KiroError> {
    let started_at = chrono::Utc::now();
    let client_model = request.model.clone();
    let upstream_model = model_catalog::map_to_upstream(&client_model).to_string();
    let stream = request.stream;

    let texts: Vec<(String, String)> = request
        .messages
        .iter()
        .map(|m| (m.role.clone(), m.content.iter().filter_map(block_text).collect::<Vec<_>>().join("\n")))
        .collect();
    let key = session_key(texts.iter().map(|(role, text)| (role.as_str(), text.as_str())));
    let tokens_in: u32 = request.system.as_ref().map(SystemPrompt::as_text).map(|text| estimate_tokens(&text)).unwrap_or(0)
        + texts.iter().map(|(_, text)| estimate_tokens(text)).sum::<u32>();

    let mut kiro_request = translate::anthropic_to_kiro(&request, Uuid::new_v4().to_string())?;
    kiro_request.model = upstream_model.clone();

    let executed = state.orchestrator.execute(Protocol::Anthropic, Some(key), client_model.clone(), kiro_request).await?;
    let guard = CancelGuard::new(state.orchestrator.clone(), Protocol::Anthropic, client_model.clone(), upstream_model, executed.account_id.clone(), started_at, tokens_in);

    if stream {
        let mut translator = translate::anthropic_stream(client_model);
        let initial = vec![translator.message_start()];
        let event_stream = build_sse_stream(initial, executed.into_event_stream(), move |event| translator.on_event(event), stream_error_event, Some(guard));
        Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()).into_response())
    } else {
        match executed.collect_events().await {
            Ok(events) => {
                let response = translate::anthropic_complete(&client_model, events)?;
                let tokens_out = response.content.iter().filter_map(block_text).map(|text| estimate_tokens(&text)).sum();
                guard.complete(FlowStatus::Success, tokens_out);
                Ok(Json(response).into_response())
            }
            Err(err) => {
                guard.complete(FlowStatus::Failure, 0);
                Err(err)
            }
        }
    }
}

fn block_text(block: &ContentBlock) -> Option<String> {
    match block {
        ContentBlock::Text { text } => Some(text.clone()),
        _ => None,
    }
}

/// Mirrors `MessagesRequest`'s shape but drops `max_tokens`, which this endpoint has no use for.
#[derive(Debug, Deserialize)]
pub struct CountTokensRequest {
    #[serde(default)]
    pub system: Option<SystemPrompt>,
    pub messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
pub struct CountTokensResponse {
    pub input_tokens: u32,
}

/// No upstream call: the upstream has no tokenizer endpoint (only `/conversation`), so this
/// answers from a character-count estimate instead of spending a real generation call.
pub async fn count_tokens(Json(request): Json<CountTokensRequest>) -> Json<CountTokensResponse> {
    let mut total = request.system.as_ref().map(SystemPrompt::as_text).map(|text| estimate_tokens(&text)).unwrap_or(0);
    for message in &request.messages {
        for block in &message.content {
            if let Some(text) = block_text(block) {
                total += estimate_tokens(&text);
            }
        }
    }
    Json(CountTokensResponse { input_tokens: total })
}
