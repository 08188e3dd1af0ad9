//! OpenAI-compatible wire types.
//!
//! Request types are deliberately loose (strings and options); range and
//! shape checks happen in the normalizer so failures can name the field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::normalize::types::EmbeddingInputType;

// ---------------------------------------------------------------------------
// Chat completions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionMessage>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub n: Option<i64>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub stop: Option<StopSequences>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub presence_penalty: Option<f64>,
    #[serde(default)]
    pub frequency_penalty: Option<f64>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged, expecting = "a string or an array of strings")]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionMessage {
    pub role: MessageRole,
    pub content: MessageContent,
    #[serde(default)]
    #[allow(dead_code)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(
    untagged,
    expecting = "a string or an array of content parts of type text, image_url or file"
)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    File { file: FileContent },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageUrl {
    /// Base64 data URI. Remote URLs are not fetched.
    pub url: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileContent {
    /// Base64 encoded file bytes.
    pub file_data: String,
    #[serde(default)]
    #[allow(dead_code)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    pub usage: UsageBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage {
    pub role: &'static str,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallBody>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolCallBody {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionCallBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionCallBody {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageBody {
    pub prompt_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingRequest {
    pub input: EmbeddingInput,
    pub model: String,
    #[serde(default, alias = "encodingFormat")]
    pub encoding_format: Option<String>,
    #[serde(default)]
    pub dimensions: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    pub user: Option<String>,
    #[serde(default)]
    pub input_type: Option<EmbeddingInputType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged, expecting = "a string or an array of strings")]
pub enum EmbeddingInput {
    One(String),
    Many(Vec<String>),
}

impl EmbeddingInput {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            EmbeddingInput::One(s) => vec![s],
            EmbeddingInput::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingResponse {
    pub object: &'static str,
    pub data: Vec<EmbeddingData>,
    pub model: String,
    pub usage: UsageBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingData {
    pub object: &'static str,
    pub embedding: Vec<f32>,
    pub index: u32,
}

// ---------------------------------------------------------------------------
// Gateway bodies
// ---------------------------------------------------------------------------

/// Error response returned by the API.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldDetail>,
}

#[derive(Debug, Serialize)]
pub struct FieldDetail {
    pub field: String,
    pub constraint: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct ModelList {
    pub object: &'static str,
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: &'static str,
    pub name: String,
    pub owned_by: String,
    pub capabilities: Vec<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_role_discriminates() {
        let msg: ChatCompletionMessage =
            serde_json::from_str(r#"{"role":"system","content":"be brief"}"#).unwrap();
        assert!(matches!(
            msg,
            ChatCompletionMessage::System {
                content: MessageContent::Text(_),
                ..
            }
        ));
    }

    #[test]
    fn test_content_parts() {
        let msg: ChatCompletionMessage = serde_json::from_str(
            r#"{"role":"user","content":[
                {"type":"text","text":"hi"},
                {"type":"image_url","image_url":{"url":"data:image/png;base64,AAAA"}},
                {"type":"file","file":{"file_data":"JVBERg=="}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(msg.role, MessageRole::User);
        let MessageContent::Parts(parts) = msg.content else {
            panic!("expected user parts");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(parts[1], ContentPart::ImageUrl { .. }));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result: Result<ChatCompletionMessage, _> =
            serde_json::from_str(r#"{"role":"tool","content":"x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_embedding_camel_case_alias() {
        let req: EmbeddingRequest = serde_json::from_str(
            r#"{"input":"hello","model":"m","encodingFormat":"float","input_type":"search_query"}"#,
        )
        .unwrap();
        assert_eq!(req.encoding_format.as_deref(), Some("float"));
        assert_eq!(req.input_type, Some(EmbeddingInputType::SearchQuery));
        assert_eq!(req.input.into_vec(), vec!["hello"]);
    }

    #[test]
    fn test_stop_string_or_list() {
        let one: StopSequences = serde_json::from_str(r#""END""#).unwrap();
        let many: StopSequences = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(one.into_vec(), vec!["END"]);
        assert_eq!(many.into_vec(), vec!["a", "b"]);
    }
}
