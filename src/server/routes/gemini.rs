use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response, Sse, sse::KeepAlive},
};
use uuid::Uuid;

use kiro_schema::gemini::{Candidate, Content, FinishReason, GenerateContentRequest, GenerateContentResponse, Part};

use crate::affinity::session_key;
use crate::error::KiroError;
use crate::flow::{FlowStatus, Protocol};
use crate::model_catalog;
use crate::server::outcome::CancelGuard;
use crate::server::router::AppState;
use crate::translate::{self, estimate_tokens};

use super::sse::build_sse_stream;

/// The real Gemini API has no dedicated "ERROR" finish reason (its taxonomy is `STOP`,
/// `MAX_TOKENS`, `SAFETY`, `RECITATION`, `OTHER`, ...), so an upstream failure reuses `OTHER` on a
/// final candidate carrying the error text, rather than inventing a non-standard enum value.
fn stream_error_response(err: &KiroError) -> Vec<GenerateContentResponse> {
    let api_error = err.as_api_error();
    vec![GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content { role: Some("model".to_string()), parts: vec![Part::text(api_error.message)] },
            index: 0,
            finish_reason: Some(FinishReason::Other),
        }],
        usage_metadata: None,
    }]
}

/// The real path segment is `{model}:generateContent` or `{model}:streamGenerateContent` —
/// matchit can't split a literal out of the middle of one path segment, so the route is a
/// catch-all and this splits the `:` itself.
fn split_model_and_action(rest: &str) -> Option<(&str, &str)> {
    rest.rsplit_once(':')
}

pub async fn generate_content(State(state): State<AppState>, Path(rest): Path<String>, Json(request): Json<GenerateContentRequest>) -> Result<Response, KiroError> {
    let (client_model, action) = split_model_and_action(&rest)
        .ok_or_else(|| KiroError::ProtocolTranslationError(format!("malformed Gemini path segment: {rest}")))?;
    let client_model = client_model.to_string();
    let stream = action == "streamGenerateContent";

    let started_at = chrono::Utc::now();
    let upstream_model = model_catalog::map_to_upstream(&client_model).to_string();

    let texts: Vec<(String, String)> = request
        .contents
        .iter()
        .map(|content| {
            (
                content.role.clone().unwrap_or_else(|| "user".to_string()),
                content.parts.iter().filter_map(|part| part.text.clone()).collect::<Vec<_>>().join("\n"),
            )
        })
        .collect();
    let key = session_key(texts.iter().map(|(role, text)| (role.as_str(), text.as_str())));
    let system_tokens = request
        .system_instruction
        .as_ref()
        .map(|content| content.parts.iter().filter_map(|part| part.text.as_deref()).collect::<Vec<_>>().join("\n"))
        .map(|text| estimate_tokens(&text))
        .unwrap_or(0);
    let tokens_in = system_tokens + texts.iter().map(|(_, text)| estimate_tokens(text)).sum::<u32>();

    let kiro_request = translate::gemini_to_kiro(&request, Uuid::new_v4().to_string(), upstream_model.clone())?;

    let executed = state.orchestrator.execute(Protocol::Gemini, Some(key), client_model.clone(), kiro_request).await?;
    let guard = CancelGuard::new(state.orchestrator.clone(), Protocol::Gemini, client_model, upstream_model, executed.account_id.clone(), started_at, tokens_in);

    if stream {
        let mut translator = translate::gemini_stream();
        let event_stream = build_sse_stream(Vec::new(), executed.into_event_stream(), move |event| translator.on_event(event), stream_error_response, Some(guard));
        Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()).into_response())
    } else {
        match executed.collect_events().await {
            Ok(events) => {
                let response = translate::gemini_complete(events)?;
                let tokens_out = response
                    .candidates
                    .first()
                    .map(|candidate| candidate.content.parts.iter().filter_map(|part| part.text.as_deref()).map(estimate_tokens).sum())
                    .unwrap_or(0);
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
