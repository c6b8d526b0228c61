mod events;
mod request;
mod response;

pub use events::{ContentDelta, MessageDeltaPayload, MessageStartPayload, StreamEvent};
pub use request::{AnthropicMessage, ContentBlock, MessagesRequest, SystemPrompt, ToolDef};
pub use response::{MessageResponse, StopReason, Usage};
