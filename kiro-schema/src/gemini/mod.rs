mod request;
mod response;

pub use request::{
    Content, FunctionCall, FunctionDeclaration, FunctionResponse, GenerateContentRequest,
    GenerationConfig, Part, Tool,
};
pub use response::{Candidate, FinishReason, GenerateContentResponse, UsageMetadata};
