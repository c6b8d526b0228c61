//! Gemini `generateContent` adapter.
//!
//! Gemini's wire format has no id for a function call — only a name — so a `functionCall`/
//! `functionResponse` pair correlates by name, unlike OpenAI/Anthropic's `tool_call_id`. Inbound
//! translation uses the function name itself as the Kiro `tool_use_id`; this is safe as long as
//! a conversation never issues two concurrent calls to the same function, which matches how the
//! Gemini API itself expects callers to behave.

use kiro_schema::gemini::{Candidate, Content, FunctionCall, FunctionResponse, GenerateContentRequest, GenerateContentResponse, Part};
use kiro_schema::kiro::{ConversationRequest, HistoryEntry, KiroEvent, ToolSpec, ToolUseRef};

use super::buffer::{ToolCallBuffer, ToolCallStep};
use super::common::{collapse_consecutive, gemini_finish_reason, inline_system_prefix};
use crate::error::KiroError;

pub fn to_kiro_request(request: &GenerateContentRequest, conversation_id: String, model: String) -> Result<ConversationRequest, KiroError> {
    let mut entries = Vec::new();

    for content in &request.contents {
        let role = content.role.as_deref().unwrap_or("user");
        let mut text = String::new();
        let mut tool_uses = Vec::new();
        let mut tool_results = Vec::new();

        for part in &content.parts {
            if let Some(t) = &part.text {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(t);
            }
            if let Some(call) = &part.function_call {
                tool_uses.push(to_tool_use_ref(call));
            }
            if let Some(response) = &part.function_response {
                tool_results.push(to_tool_result(response));
            }
        }

        entries.extend(tool_results);
        match role {
            "model" if !text.is_empty() || !tool_uses.is_empty() => {
                entries.push(HistoryEntry::Assistant { content: text, tool_uses })
            }
            _ if !text.is_empty() => entries.push(HistoryEntry::User { content: text }),
            _ => {}
        }
    }

    let system = request
        .system_instruction
        .as_ref()
        .map(|content| content.parts.iter().filter_map(|part| part.text.as_deref()).collect::<Vec<_>>().join("\n"))
        .filter(|text| !text.is_empty());

    if let Some(system) = system {
        inline_system_prefix(&mut entries, system);
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .flat_map(|tool| &tool.function_declarations)
            .map(|declaration| ToolSpec {
                name: declaration.name.clone(),
                description: declaration.description.clone(),
                input_schema: declaration.parameters.clone().unwrap_or(serde_json::Value::Null),
            })
            .collect()
    });

    Ok(ConversationRequest {
        conversation_id,
        model,
        history: collapse_consecutive(entries),
        system: None,
        tools,
    })
}

fn to_tool_use_ref(call: &FunctionCall) -> ToolUseRef {
    ToolUseRef {
        tool_use_id: call.name.clone(),
        name: call.name.clone(),
        input: call.args.clone(),
    }
}

fn to_tool_result(response: &FunctionResponse) -> HistoryEntry {
    HistoryEntry::ToolResult {
        tool_use_id: response.name.clone(),
        content: response.response.to_string(),
    }
}

/// Folds upstream events into `GenerateContentResponse` fragments. A `functionCall` part is
/// atomic in Gemini's wire format, so tool-use fragments produce nothing until the buffer reports
/// the call complete.
pub struct StreamTranslator {
    tool_buffer: ToolCallBuffer,
}

impl StreamTranslator {
    pub fn new() -> Self {
        Self { tool_buffer: ToolCallBuffer::new() }
    }

    fn wrap(part: Part, finish_reason: Option<kiro_schema::gemini::FinishReason>) -> GenerateContentResponse {
        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content { role: Some("model".to_string()), parts: vec![part] },
                index: 0,
                finish_reason,
            }],
            usage_metadata: None,
        }
    }

    pub fn on_event(&mut self, event: KiroEvent) -> Vec<GenerateContentResponse> {
        match event {
            KiroEvent::AssistantResponse(e) => vec![Self::wrap(Part::text(e.content), None)],
            KiroEvent::ToolUse(e) => match self.tool_buffer.push(&e.tool_use_id, &e.name, &e.input, e.stop) {
                ToolCallStep::Finished { name, input, .. } => {
                    vec![Self::wrap(Part { function_call: Some(FunctionCall { name, args: input }), ..Default::default() }, None)]
                }
                ToolCallStep::InProgress { .. } => vec![],
            },
            KiroEvent::FollowupPrompt(_) => vec![],
            KiroEvent::MessageStop(e) => {
                vec![GenerateContentResponse {
                    candidates: vec![Candidate {
                        content: Content { role: Some("model".to_string()), parts: vec![] },
                        index: 0,
                        finish_reason: Some(gemini_finish_reason(e.stop_reason.as_deref()).unwrap_or(kiro_schema::gemini::FinishReason::Stop)),
                    }],
                    usage_metadata: None,
                }]
            }
        }
    }
}

impl Default for StreamTranslator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn translate_stream() -> StreamTranslator {
    StreamTranslator::new()
}

/// Non-streaming form: folds the whole event list into one `GenerateContentResponse`.
pub fn translate_complete(events: Vec<KiroEvent>) -> Result<GenerateContentResponse, KiroError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut finish_reason = None;
    let mut buffer = ToolCallBuffer::new();

    for event in events {
        match event {
            KiroEvent::AssistantResponse(e) => text.push_str(&e.content),
            KiroEvent::ToolUse(e) => {
                if let ToolCallStep::Finished { name, input, .. } = buffer.push(&e.tool_use_id, &e.name, &e.input, e.stop) {
                    if !text.is_empty() {
                        parts.push(Part::text(std::mem::take(&mut text)));
                    }
                    parts.push(Part { function_call: Some(FunctionCall { name, args: input }), ..Default::default() });
                }
            }
            KiroEvent::FollowupPrompt(_) => {}
            KiroEvent::MessageStop(e) => finish_reason = gemini_finish_reason(e.stop_reason.as_deref()),
        }
    }
    if !text.is_empty() {
        parts.push(Part::text(text));
    }

    Ok(GenerateContentResponse {
        candidates: vec![Candidate {
            content: Content { role: Some("model".to_string()), parts },
            index: 0,
            finish_reason,
        }],
        usage_metadata: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_schema::kiro::{AssistantResponseEvent, MessageStopEvent, ToolUseEvent};

    fn request(contents: Vec<Content>) -> GenerateContentRequest {
        GenerateContentRequest {
            contents,
            system_instruction: None,
            tools: None,
            generation_config: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn system_instruction_is_inlined_into_the_first_user_turn() {
        let mut request = request(vec![Content { role: Some("user".to_string()), parts: vec![Part::text("hi".to_string())] }]);
        request.system_instruction = Some(Content { role: None, parts: vec![Part::text("be terse".to_string())] });

        let converted = to_kiro_request(&request, "conv1".to_string(), "gemini-model".to_string()).unwrap();

        assert!(converted.system.is_none());
        assert_eq!(converted.history.len(), 1);
        assert!(matches!(&converted.history[0], HistoryEntry::User { content } if content == "be terse\n\nhi"));
    }

    #[test]
    fn function_call_and_response_correlate_by_name() {
        let converted = to_kiro_request(
            &request(vec![
                Content {
                    role: Some("model".to_string()),
                    parts: vec![Part { function_call: Some(FunctionCall { name: "get_weather".to_string(), args: serde_json::json!({}) }), ..Default::default() }],
                },
                Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        function_response: Some(FunctionResponse { name: "get_weather".to_string(), response: serde_json::json!("72F") }),
                        ..Default::default()
                    }],
                },
            ]),
            "conv1".to_string(),
            "gemini-model".to_string(),
        )
        .unwrap();

        assert!(matches!(&converted.history[0], HistoryEntry::Assistant { tool_uses, .. } if tool_uses[0].tool_use_id == "get_weather"));
        assert!(matches!(&converted.history[1], HistoryEntry::ToolResult { tool_use_id, .. } if tool_use_id == "get_weather"));
    }

    #[test]
    fn tool_use_fragments_stay_silent_until_complete() {
        let mut translator = StreamTranslator::new();
        let fragments = translator.on_event(KiroEvent::ToolUse(ToolUseEvent {
            tool_use_id: "t1".to_string(),
            name: "get_weather".to_string(),
            input: "{\"city\":".to_string(),
            stop: false,
        }));
        assert!(fragments.is_empty());

        let fragments = translator.on_event(KiroEvent::ToolUse(ToolUseEvent {
            tool_use_id: "t1".to_string(),
            name: "get_weather".to_string(),
            input: "\"sf\"}".to_string(),
            stop: true,
        }));
        assert_eq!(fragments.len(), 1);
    }

    #[test]
    fn non_streaming_response_collects_text_and_function_calls() {
        let events = vec![
            KiroEvent::AssistantResponse(AssistantResponseEvent { content: "hi".to_string() }),
            KiroEvent::MessageStop(MessageStopEvent { stop_reason: Some("end_turn".to_string()) }),
        ];
        let response = translate_complete(events).unwrap();
        assert_eq!(response.candidates[0].content.parts[0].text.as_deref(), Some("hi"));
        assert_eq!(response.candidates[0].finish_reason, Some(kiro_schema::gemini::FinishReason::Stop));
    }
}
