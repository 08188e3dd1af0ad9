//! Vendor-agnostic request and response model.
//!
//! Every adapter translates to and from these types and nothing else; none of
//! them know about the OpenAI wire format or about each other.

use std::fmt;

use serde_json::Value;

/// Conversation role of a normalized message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Image encodings accepted in data URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// One piece of message content. Media is already decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    Image { format: ImageFormat, data: Vec<u8> },
    File { mime_type: String, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    /// Concatenated text parts, newline separated.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Sampling parameters, already range-checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub n: Option<u32>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
}

impl SamplingParams {
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.max_tokens.is_none()
            && self.stop.is_empty()
    }
}

/// A function the model may call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub sampling: SamplingParams,
    pub tools: Vec<ToolDescriptor>,
    pub user: Option<String>,
}

impl NormalizedChatRequest {
    /// Text of the most recent user message, if any.
    pub fn last_user_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(ChatMessage::text)
    }
}

/// Embedding optimisation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingInputType {
    SearchDocument,
    SearchQuery,
    Classification,
    Clustering,
    SemanticSimilarity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEmbeddingRequest {
    pub model: String,
    pub inputs: Vec<String>,
    pub dimensions: Option<u32>,
    pub input_type: Option<EmbeddingInputType>,
}

/// Canonical finish-reason vocabulary shared by every adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCalls => "tool_calls",
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments as a JSON document.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatChoice {
    pub index: u32,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub index: u32,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingResult {
    pub model: String,
    pub embeddings: Vec<Embedding>,
    pub usage: Usage,
}

/// Output of one pipeline run, discriminated by request kind.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResponse {
    Chat(ChatCompletion),
    Embedding(EmbeddingResult),
}

impl From<ChatCompletion> for NormalizedResponse {
    fn from(c: ChatCompletion) -> Self {
        NormalizedResponse::Chat(c)
    }
}

impl From<EmbeddingResult> for NormalizedResponse {
    fn from(e: EmbeddingResult) -> Self {
        NormalizedResponse::Embedding(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text_skips_media() {
        let msg = ChatMessage {
            role: Role::User,
            parts: vec![
                ContentPart::Text("look".into()),
                ContentPart::Image {
                    format: ImageFormat::Png,
                    data: vec![1, 2],
                },
                ContentPart::Text("here".into()),
            ],
        };
        assert_eq!(msg.text(), "look\nhere");
    }

    #[test]
    fn test_image_format_parse() {
        assert_eq!(ImageFormat::parse("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::parse("webp"), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::parse("bmp"), None);
    }
}
