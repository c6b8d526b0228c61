//! Wire types for the upstream Kiro CodeWhisperer-style `conversation` endpoint.
//!
//! The upstream speaks a single flat "conversation history" request and replies with a
//! length-prefixed event stream (see `kiro::events`); this module only carries the JSON
//! shapes, not the binary framing (that lives in the proxy's upstream client, since framing
//! is a transport concern rather than a schema one).

mod events;
mod request;

pub use events::{AssistantResponseEvent, FollowupPromptEvent, KiroEvent, MessageStopEvent, ToolUseEvent};
pub use request::{ConversationRequest, HistoryEntry, ToolSpec, ToolUseRef};
