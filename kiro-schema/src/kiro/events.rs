use serde::{Deserialize, Serialize};

/// A decoded upstream event, already matched against its framing header's `event-type`.
///
/// The framing layer picks the variant by header, then deserializes the JSON payload into the
/// matching struct below; this enum itself carries no `#[serde(tag)]` because the tag lives in
/// the binary frame header, not the JSON body.
#[derive(Debug, Clone)]
pub enum KiroEvent {
    AssistantResponse(AssistantResponseEvent),
    ToolUse(ToolUseEvent),
    FollowupPrompt(FollowupPromptEvent),
    MessageStop(MessageStopEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponseEvent {
    pub content: String,
}

/// One fragment of a tool call. `input` carries an incremental slice of the JSON arguments
/// string, not a complete value — fragments for the same `tool_use_id` must be concatenated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUseEvent {
    pub tool_use_id: String,
    pub name: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub stop: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowupPromptEvent {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStopEvent {
    #[serde(default)]
    pub stop_reason: Option<String>,
}
