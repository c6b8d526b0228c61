use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response, Sse, sse::KeepAlive},
};
use uuid::Uuid;

use kiro_schema::openai::{
    ChatCompletionRequest, ChatCompletionStreamError, ChatCompletionStreamItem, MessageContent,
    OpenaiModel, OpenaiModelList, StreamErrorDetail,
};

use crate::affinity::session_key;
use crate::error::KiroError;
use crate::flow::{FlowStatus, Protocol};
use crate::model_catalog::{self, UPSTREAM_MODELS};
use crate::server::outcome::CancelGuard;
use crate::server::router::AppState;
use crate::translate::{self, estimate_tokens};

use super::sse::build_sse_stream;

fn stream_error_item(err: &KiroError) -> Vec<ChatCompletionStreamItem> {
    let api_error = err.as_api_error();
    vec![ChatCompletionStreamItem::Error(ChatCompletionStreamError {
        error: StreamErrorDetail { message: api_error.message, kind: "upstream_error".to_string(), code: api_error.code },
    })]
}

pub async fn chat_completions(State(state): State<AppState>, Json(request): Json<ChatCompletionRequest>) -> Result<Response, KiroError> {
    let started_at = chrono::Utc::now();
    let client_model = request.model.clone();
    let upstream_model = model_catalog::map_to_upstream(&client_model).to_string();
    let stream = request.stream;

    let texts: Vec<(String, String)> = request
        .messages
        .iter()
        .map(|m| (m.role.clone(), m.content.as_ref().map(MessageContent::as_text).unwrap_or_default()))
        .collect();
    let key = session_key(texts.iter().map(|(role, text)| (role.as_str(), text.as_str())));
    let tokens_in: u32 = texts.iter().map(|(_, text)| estimate_tokens(text)).sum();

    let mut kiro_request = translate::openai_to_kiro(&request, Uuid::new_v4().to_string())?;
    kiro_request.model = upstream_model.clone();

    let executed = state.orchestrator.execute(Protocol::OpenAi, Some(key), client_model.clone(), kiro_request).await?;
    let guard = CancelGuard::new(state.orchestrator.clone(), Protocol::OpenAi, client_model.clone(), upstream_model, executed.account_id.clone(), started_at, tokens_in);

    if stream {
        let mut translator = translate::openai_stream(client_model);
        let event_stream = build_sse_stream(
            Vec::new(),
            executed.into_event_stream(),
            move |event| translator.on_event(event).into_iter().map(ChatCompletionStreamItem::Chunk).collect(),
            stream_error_item,
            Some(guard),
        );
        Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()).into_response())
    } else {
        match executed.collect_events().await {
            Ok(events) => {
                let response = translate::openai_complete(&client_model, events)?;
                let tokens_out = response.choices.first().map(|choice| estimate_tokens(&choice.message.content.as_ref().map(MessageContent::as_text).unwrap_or_default())).unwrap_or(0);
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

pub async fn list_models() -> Json<OpenaiModelList> {
    let created = chrono::Utc::now().timestamp();
    Json(OpenaiModelList {
        object: "list".to_string(),
        data: UPSTREAM_MODELS
            .iter()
            .map(|&id| OpenaiModel { id: id.to_string(), object: "model".to_string(), created, owned_by: "kiro".to_string() })
            .collect(),
    })
}
