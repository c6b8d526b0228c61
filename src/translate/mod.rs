//! Protocol-Translation Pipeline: inbound per-protocol requests fold down to one
//! [`kiro_schema::kiro::ConversationRequest`]; the upstream's decoded event stream folds back out
//! into each protocol's own streaming or non-streaming response shape.
//!
//! Each protocol gets its own inbound/outbound pair rather than a shared trait, since the three
//! wire shapes (content blocks vs. parts vs. plain strings) don't share enough structure to make
//! an abstraction pay for itself.

mod anthropic;
mod buffer;
mod common;
mod gemini;
mod openai;

pub use anthropic::{to_kiro_request as anthropic_to_kiro, translate_stream as anthropic_stream, translate_complete as anthropic_complete};
pub use buffer::ToolCallBuffer;
pub use common::estimate_tokens;
pub use gemini::{to_kiro_request as gemini_to_kiro, translate_stream as gemini_stream, translate_complete as gemini_complete};
pub use openai::{to_kiro_request as openai_to_kiro, translate_stream as openai_stream, translate_complete as openai_complete};
