mod chat_request;
mod chat_response;
mod model_list;

pub use chat_request::{ChatCompletionRequest, ChatMessage, MessageContent, ToolCall, ToolCallFunction, ToolDef};
pub use chat_response::{
    ChatCompletionChunk, ChatCompletionResponse, ChatCompletionStreamError, ChatCompletionStreamItem,
    Choice, ChunkChoice, ChunkDelta, StreamErrorDetail, ToolCallDelta, ToolCallFunctionDelta, Usage,
};
pub use model_list::{OpenaiModel, OpenaiModelList};
