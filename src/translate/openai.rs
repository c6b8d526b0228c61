//! OpenAI Chat Completions adapter: request messages fold into a [`ConversationRequest`], the
//! upstream event stream folds back into [`ChatCompletionChunk`]s or one [`ChatCompletionResponse`].

use kiro_schema::kiro::{ConversationRequest, HistoryEntry, KiroEvent, ToolSpec, ToolUseRef};
use kiro_schema::openai::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, ChunkDelta, MessageContent, ToolCall, ToolCallDelta, ToolCallFunction,
    ToolCallFunctionDelta, ToolDef,
};

use super::buffer::{ToolCallBuffer, ToolCallStep};
use super::common::{collapse_consecutive, generate_stream_id, inline_system_prefix, openai_finish_reason};
use crate::error::KiroError;

/// Inlines every `system`/`developer` message as a `"{system}\n\n{first user text}"` prefix on the
/// first `user` turn (OpenAI has no dedicated system slot once the request reaches the upstream,
/// which only exposes `ConversationRequest.system` for the Anthropic path), then folds the
/// remaining turns into history, collapsing consecutive same-role turns and merging tool results.
pub fn to_kiro_request(request: &ChatCompletionRequest, conversation_id: String) -> Result<ConversationRequest, KiroError> {
    let mut system_parts = Vec::new();
    let mut entries = Vec::new();

    for message in &request.messages {
        let text = message.content.as_ref().map(MessageContent::as_text).unwrap_or_default();
        match message.role.as_str() {
            "system" | "developer" => {
                if !text.is_empty() {
                    system_parts.push(text);
                }
            }
            "user" => entries.push(HistoryEntry::User { content: text }),
            "assistant" => {
                let tool_uses = message
                    .tool_calls
                    .iter()
                    .flatten()
                    .map(|call| -> Result<ToolUseRef, KiroError> {
                        Ok(ToolUseRef {
                            tool_use_id: call.id.clone(),
                            name: call.function.name.clone(),
                            input: serde_json::from_str(&call.function.arguments)
                                .map_err(|err| KiroError::ProtocolTranslationError(format!("tool_call arguments: {err}")))?,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                entries.push(HistoryEntry::Assistant { content: text, tool_uses });
            }
            "tool" => {
                let tool_use_id = message
                    .tool_call_id
                    .clone()
                    .ok_or_else(|| KiroError::ProtocolTranslationError("tool message missing tool_call_id".to_string()))?;
                entries.push(HistoryEntry::ToolResult { tool_use_id, content: text });
            }
            other => {
                return Err(KiroError::ProtocolTranslationError(format!("unsupported message role: {other}")));
            }
        }
    }

    if !system_parts.is_empty() {
        inline_system_prefix(&mut entries, system_parts.join("\n"));
    }

    let tools = request.tools.as_ref().map(|tools| tools.iter().map(to_kiro_tool).collect());

    Ok(ConversationRequest {
        conversation_id,
        model: request.model.clone(),
        history: collapse_consecutive(entries),
        system: None,
        tools,
    })
}

fn to_kiro_tool(tool: &ToolDef) -> ToolSpec {
    ToolSpec {
        name: tool.function.name.clone(),
        description: tool.function.description.clone(),
        input_schema: tool.function.parameters.clone().unwrap_or(serde_json::Value::Null),
    }
}

/// Folds upstream events into zero or more `ChatCompletionChunk`s, in arrival order.
pub struct StreamTranslator {
    id: String,
    model: String,
    created: i64,
    sent_role: bool,
    tool_buffer: ToolCallBuffer,
}

impl StreamTranslator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: generate_stream_id("chatcmpl"),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            sent_role: false,
            tool_buffer: ToolCallBuffer::new(),
        }
    }

    fn base_chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice { index: 0, delta, finish_reason }],
        }
    }

    pub fn on_event(&mut self, event: KiroEvent) -> Vec<ChatCompletionChunk> {
        match event {
            KiroEvent::AssistantResponse(e) => {
                let role = if !self.sent_role { self.sent_role = true; Some("assistant".to_string()) } else { None };
                vec![self.base_chunk(ChunkDelta { role, content: Some(e.content), tool_calls: None }, None)]
            }
            KiroEvent::ToolUse(e) => {
                let step = self.tool_buffer.push(&e.tool_use_id, &e.name, &e.input, e.stop);
                let (index, id, kind, name) = match step {
                    ToolCallStep::InProgress { index, is_first } => {
                        (index, is_first.then(|| e.tool_use_id.clone()), is_first.then(|| "function".to_string()), is_first.then(|| e.name.clone()))
                    }
                    ToolCallStep::Finished { index, .. } => (index, None, None, None),
                };
                let delta = ChunkDelta {
                    role: None,
                    content: None,
                    tool_calls: Some(vec![ToolCallDelta {
                        index,
                        id,
                        kind,
                        function: Some(ToolCallFunctionDelta { name, arguments: Some(e.input) }),
                    }]),
                };
                vec![self.base_chunk(delta, None)]
            }
            KiroEvent::FollowupPrompt(_) => vec![],
            KiroEvent::MessageStop(e) => {
                vec![self.base_chunk(ChunkDelta::default(), openai_finish_reason(e.stop_reason.as_deref()))]
            }
        }
    }
}

/// Non-streaming form: folds the whole event list into one `ChatCompletionResponse`.
pub fn translate_complete(model: &str, events: Vec<KiroEvent>) -> Result<ChatCompletionResponse, KiroError> {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut finish_reason = None;
    let mut buffer = ToolCallBuffer::new();

    for event in events {
        match event {
            KiroEvent::AssistantResponse(e) => content.push_str(&e.content),
            KiroEvent::ToolUse(e) => {
                if let ToolCallStep::Finished { index, name, input } = buffer.push(&e.tool_use_id, &e.name, &e.input, e.stop) {
                    let arguments = serde_json::to_string(&input)
                        .map_err(|err| KiroError::ProtocolTranslationError(format!("tool call arguments: {err}")))?;
                    tool_calls.push((index, ToolCall {
                        id: e.tool_use_id,
                        kind: "function".to_string(),
                        function: ToolCallFunction { name, arguments },
                    }));
                }
            }
            KiroEvent::FollowupPrompt(_) => {}
            KiroEvent::MessageStop(e) => finish_reason = openai_finish_reason(e.stop_reason.as_deref()),
        }
    }
    tool_calls.sort_by_key(|(index, _)| *index);
    let tool_calls: Vec<ToolCall> = tool_calls.into_iter().map(|(_, call)| call).collect();

    Ok(ChatCompletionResponse {
        id: generate_stream_id("chatcmpl"),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: if content.is_empty() { None } else { Some(MessageContent::Text(content)) },
                name: None,
                tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                tool_call_id: None,
                extra: Default::default(),
            },
            finish_reason,
        }],
        usage: None,
    })
}

pub fn translate_stream(model: impl Into<String>) -> StreamTranslator {
    StreamTranslator::new(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_schema::kiro::{AssistantResponseEvent, MessageStopEvent, ToolUseEvent};
    use kiro_schema::openai::ChatMessage;
    use serde_json::json;

    fn user(text: &str) -> ChatMessage {
        ChatMessage {
            role: "user".to_string(),
            content: Some(MessageContent::Text(text.to_string())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn system_messages_are_inlined_into_the_first_user_turn() {
        let request = ChatCompletionRequest {
            model: "claude-sonnet-4.5".to_string(),
            messages: vec![
                ChatMessage { role: "system".to_string(), ..user("be terse") },
                user("hi"),
            ],
            stream: false,
            tools: None,
            tool_choice: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            extra: Default::default(),
        };
        let converted = to_kiro_request(&request, "conv1".to_string()).unwrap();
        assert!(converted.system.is_none());
        assert_eq!(converted.history.len(), 1);
        assert!(matches!(&converted.history[0], HistoryEntry::User { content } if content == "be terse\n\nhi"));
    }

    #[test]
    fn consecutive_user_turns_collapse() {
        let request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![user("a"), user("b")],
            stream: false,
            tools: None,
            tool_choice: None,
            temperature: None,
            top_p: None,
            max_tokens: None,
            extra: Default::default(),
        };
        let converted = to_kiro_request(&request, "conv1".to_string()).unwrap();
        assert_eq!(converted.history.len(), 1);
    }

    #[test]
    fn streaming_tool_call_emits_id_and_name_once() {
        let mut translator = StreamTranslator::new("m");
        let chunks = translator.on_event(KiroEvent::ToolUse(ToolUseEvent {
            tool_use_id: "t1".to_string(),
            name: "get_weather".to_string(),
            input: "{}".to_string(),
            stop: true,
        }));
        let delta = &chunks[0].choices[0].delta;
        let tool_call = &delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(tool_call.id.as_deref(), Some("t1"));
        assert_eq!(tool_call.function.as_ref().unwrap().name.as_deref(), Some("get_weather"));
    }

    #[test]
    fn non_streaming_response_collects_text_and_tool_calls() {
        let events = vec![
            KiroEvent::AssistantResponse(AssistantResponseEvent { content: "hi".to_string() }),
            KiroEvent::ToolUse(ToolUseEvent {
                tool_use_id: "t1".to_string(),
                name: "get_weather".to_string(),
                input: json!({"city": "sf"}).to_string(),
                stop: true,
            }),
            KiroEvent::MessageStop(MessageStopEvent { stop_reason: Some("tool_use".to_string()) }),
        ];
        let response = translate_complete("m", events).unwrap();
        let message = &response.choices[0].message;
        assert_eq!(message.content.as_ref().unwrap().as_text(), "hi");
        assert_eq!(message.tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("tool_calls"));
    }
}
