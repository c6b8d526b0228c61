//! Anthropic Messages adapter: the only protocol with a dedicated `system` slot, so inbound
//! translation needs no system-inlining at all — it just carries `system` straight through.

use kiro_schema::anthropic::{
    ContentBlock, ContentDelta, MessageDeltaPayload, MessageResponse, MessagesRequest,
    MessageStartPayload, StreamEvent, Usage,
};
use kiro_schema::kiro::{ConversationRequest, HistoryEntry, KiroEvent, ToolSpec, ToolUseRef};

use super::buffer::{ToolCallBuffer, ToolCallStep};
use super::common::{anthropic_stop_reason, collapse_consecutive, generate_stream_id};
use crate::error::KiroError;

pub fn to_kiro_request(request: &MessagesRequest, conversation_id: String) -> Result<ConversationRequest, KiroError> {
    let mut entries = Vec::new();

    for message in &request.messages {
        let mut text = String::new();
        let mut tool_uses = Vec::new();
        let mut tool_results = Vec::new();

        for block in &message.content {
            match block {
                ContentBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(t);
                }
                ContentBlock::ToolUse { id, name, input } => tool_uses.push(ToolUseRef {
                    tool_use_id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                ContentBlock::ToolResult { tool_use_id, content, .. } => tool_results.push(HistoryEntry::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.as_ref().map(render_tool_result).unwrap_or_default(),
                }),
            }
        }

        entries.extend(tool_results);
        match message.role.as_str() {
            "user" if !text.is_empty() => entries.push(HistoryEntry::User { content: text }),
            "assistant" if !text.is_empty() || !tool_uses.is_empty() => {
                entries.push(HistoryEntry::Assistant { content: text, tool_uses })
            }
            _ => {}
        }
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect()
    });

    Ok(ConversationRequest {
        conversation_id,
        model: request.model.clone(),
        history: collapse_consecutive(entries),
        system: request.system.as_ref().map(|system| system.as_text()),
        tools,
    })
}

fn render_tool_result(content: &serde_json::Value) -> String {
    match content.as_str() {
        Some(text) => text.to_string(),
        None => content.to_string(),
    }
}

enum OpenBlock {
    Text,
    Tool,
}

/// Folds upstream events into the Anthropic SSE event vocabulary, tracking content-block
/// indices and opening/closing blocks as the kind of event being emitted changes.
pub struct StreamTranslator {
    model: String,
    next_index: u32,
    open: Option<OpenBlock>,
    tool_buffer: ToolCallBuffer,
}

impl StreamTranslator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            next_index: 0,
            open: None,
            tool_buffer: ToolCallBuffer::new(),
        }
    }

    /// The first event of the stream: an empty assistant message shell.
    pub fn message_start(&self) -> StreamEvent {
        StreamEvent::MessageStart {
            message: MessageStartPayload {
                id: generate_stream_id("msg"),
                kind: "message".to_string(),
                role: "assistant".to_string(),
                model: self.model.clone(),
                content: vec![],
                stop_reason: None,
                usage: Usage { input_tokens: 0, output_tokens: 0 },
            },
        }
    }

    fn close_open_block(&mut self, events: &mut Vec<StreamEvent>) {
        if self.open.take().is_some() {
            events.push(StreamEvent::ContentBlockStop { index: self.next_index - 1 });
        }
    }

    pub fn on_event(&mut self, event: KiroEvent) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        match event {
            KiroEvent::AssistantResponse(e) => {
                if !matches!(self.open, Some(OpenBlock::Text)) {
                    self.close_open_block(&mut events);
                    let index = self.next_index;
                    self.next_index += 1;
                    self.open = Some(OpenBlock::Text);
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlock::Text { text: String::new() },
                    });
                }
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.next_index - 1,
                    delta: ContentDelta::TextDelta { text: e.content },
                });
            }
            KiroEvent::ToolUse(e) => {
                let step = self.tool_buffer.push(&e.tool_use_id, &e.name, &e.input, e.stop);
                let is_first = matches!(step, ToolCallStep::InProgress { is_first: true, .. } | ToolCallStep::Finished { is_first: true, .. });
                if is_first {
                    self.close_open_block(&mut events);
                    let index = self.next_index;
                    self.next_index += 1;
                    self.open = Some(OpenBlock::Tool);
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        content_block: ContentBlock::ToolUse {
                            id: e.tool_use_id.clone(),
                            name: e.name.clone(),
                            input: serde_json::Value::Object(Default::default()),
                        },
                    });
                }
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.next_index - 1,
                    delta: ContentDelta::InputJsonDelta { partial_json: e.input },
                });
                if e.stop {
                    self.close_open_block(&mut events);
                }
            }
            KiroEvent::FollowupPrompt(_) => {}
            KiroEvent::MessageStop(e) => {
                self.close_open_block(&mut events);
                events.push(StreamEvent::MessageDelta {
                    delta: MessageDeltaPayload {
                        stop_reason: anthropic_stop_reason(e.stop_reason.as_deref()),
                    },
                    usage: Usage { input_tokens: 0, output_tokens: 0 },
                });
                events.push(StreamEvent::MessageStop);
            }
        }
        events
    }
}

pub fn translate_stream(model: impl Into<String>) -> StreamTranslator {
    StreamTranslator::new(model)
}

/// Non-streaming form: folds the whole event list into one `MessageResponse`.
pub fn translate_complete(model: &str, events: Vec<KiroEvent>) -> Result<MessageResponse, KiroError> {
    let mut content = Vec::new();
    let mut text = String::new();
    let mut stop_reason = None;
    let mut buffer = ToolCallBuffer::new();

    for event in events {
        match event {
            KiroEvent::AssistantResponse(e) => text.push_str(&e.content),
            KiroEvent::ToolUse(e) => {
                if let ToolCallStep::Finished { name, input, .. } = buffer.push(&e.tool_use_id, &e.name, &e.input, e.stop) {
                    if !text.is_empty() {
                        content.push(ContentBlock::Text { text: std::mem::take(&mut text) });
                    }
                    content.push(ContentBlock::ToolUse { id: e.tool_use_id, name, input });
                }
            }
            KiroEvent::FollowupPrompt(_) => {}
            KiroEvent::MessageStop(e) => stop_reason = anthropic_stop_reason(e.stop_reason.as_deref()),
        }
    }
    if !text.is_empty() {
        content.push(ContentBlock::Text { text });
    }

    Ok(MessageResponse {
        id: generate_stream_id("msg"),
        kind: "message".to_string(),
        role: "assistant".to_string(),
        model: model.to_string(),
        content,
        stop_reason,
        usage: Usage { input_tokens: 0, output_tokens: 0 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiro_schema::anthropic::{AnthropicMessage, SystemPrompt};
    use kiro_schema::kiro::{AssistantResponseEvent, MessageStopEvent, ToolUseEvent};

    #[test]
    fn system_prompt_carries_through_without_inlining() {
        let request = MessagesRequest {
            model: "claude-sonnet-4.5".to_string(),
            messages: vec![AnthropicMessage { role: "user".to_string(), content: vec![ContentBlock::Text { text: "hi".to_string() }] }],
            max_tokens: 100,
            system: Some(SystemPrompt::Text("be terse".to_string())),
            stream: true,
            tools: None,
            temperature: None,
            extra: Default::default(),
        };
        let converted = to_kiro_request(&request, "conv1".to_string()).unwrap();
        assert_eq!(converted.system.as_deref(), Some("be terse"));
        assert_eq!(converted.history.len(), 1);
    }

    #[test]
    fn tool_result_block_becomes_its_own_history_entry() {
        let request = MessagesRequest {
            model: "m".to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: "t1".to_string(),
                    content: Some(serde_json::json!("72F")),
                    is_error: false,
                }],
            }],
            max_tokens: 10,
            system: None,
            stream: false,
            tools: None,
            temperature: None,
            extra: Default::default(),
        };
        let converted = to_kiro_request(&request, "conv1".to_string()).unwrap();
        assert!(matches!(&converted.history[0], HistoryEntry::ToolResult { content, .. } if content == "72F"));
    }

    #[test]
    fn text_then_tool_use_closes_and_reopens_blocks() {
        let mut translator = StreamTranslator::new("m");
        let mut events = translator.on_event(KiroEvent::AssistantResponse(AssistantResponseEvent { content: "thinking".to_string() }));
        events.extend(translator.on_event(KiroEvent::ToolUse(ToolUseEvent {
            tool_use_id: "t1".to_string(),
            name: "get_weather".to_string(),
            input: "{}".to_string(),
            stop: true,
        })));
        assert!(matches!(events[0], StreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ContentBlockStop { index: 0 })));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ContentBlockStart { index: 1, .. })));
    }

    #[test]
    fn message_stop_emits_delta_then_stop() {
        let mut translator = StreamTranslator::new("m");
        let events = translator.on_event(KiroEvent::MessageStop(MessageStopEvent { stop_reason: Some("end_turn".to_string()) }));
        assert!(matches!(events[0], StreamEvent::MessageDelta { .. }));
        assert!(matches!(events[1], StreamEvent::MessageStop));
    }
}
