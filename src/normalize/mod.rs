pub mod errors;
pub mod media;
pub mod request;
pub mod response;
pub mod types;

pub use errors::{FieldError, ValidationError};
pub use request::{parse_chat, parse_embedding};
pub use response::{canonicalize_chat, canonicalize_embeddings, to_wire_json};
pub use types::{
    ChatChoice, ChatCompletion, ChatMessage, ContentPart, Embedding, EmbeddingResult,
    FinishReason, NormalizedChatRequest, NormalizedEmbeddingRequest, NormalizedResponse, Role,
    ToolCall, Usage,
};
