//! Amazon Bedrock adapter.
//!
//! Chat goes through the Converse API; embeddings through `InvokeModel` with
//! the Cohere embed request body. Requests authenticate with a Bedrock API
//! key sent as a bearer token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::http::{build_vendor_url, decode_json, execute, status_kind, vendor_failure, VendorResponse};
use super::{vendor_model, Capabilities, ModelSpec, ProviderAdapter, ProviderError, ProviderErrorKind};
use crate::normalize::media::encode_base64;
use crate::normalize::types::EmbeddingInputType;
use crate::normalize::{
    ChatChoice, ChatCompletion, ContentPart, Embedding, EmbeddingResult, FinishReason,
    NormalizedChatRequest, NormalizedEmbeddingRequest, Role, ToolCall, Usage,
};

const VENDOR: &str = "bedrock";

/// Converse limits per message.
const MAX_IMAGES_PER_MESSAGE: usize = 20;
const MAX_DOCUMENTS_PER_MESSAGE: usize = 5;
/// Bedrock sampling temperature upper bound.
const MAX_TEMPERATURE: f32 = 1.0;
/// Cohere embed limits.
const MAX_EMBED_TEXTS: usize = 96;
const MAX_EMBED_TEXT_CHARS: usize = 2048;

const INPUT_TOKEN_HEADER: &str = "x-amzn-bedrock-input-token-count";
const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// Bedrock models in the public catalogue. Vendor ids (ARNs) come from config.
pub fn catalogue() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("claude_3_5_sonnet", "Claude 3.5 Sonnet", Capabilities::CHAT, ""),
        ModelSpec::new("llama3211b", "Llama 3.2 11B", Capabilities::CHAT, ""),
        ModelSpec::new(
            "cohere_english_v3",
            "Cohere English Embeddings",
            Capabilities::EMBEDDING,
            "",
        ),
    ]
}

/// Bedrock adapter configuration.
pub struct BedrockConfig {
    pub region: String,
    pub api_key: String,
    /// Overrides `https://bedrock-runtime.<region>.amazonaws.com`.
    pub endpoint: Option<String>,
    /// Catalogue entries with `vendor_model` set to the model or profile ARN.
    pub models: Vec<ModelSpec>,
}

pub struct BedrockAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    models: Vec<ModelSpec>,
}

impl BedrockAdapter {
    pub fn new(config: BedrockConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: config.endpoint.unwrap_or_else(|| {
                format!("https://bedrock-runtime.{}.amazonaws.com", config.region)
            }),
            api_key: config.api_key,
            models: config.models,
        }
    }

    async fn post<B: Serialize>(
        &self,
        model_arn: &str,
        action: &str,
        body: &B,
    ) -> Result<VendorResponse, ProviderError> {
        let url = build_vendor_url(&self.endpoint, &["model", model_arn, action])
            .map_err(|e| ProviderError::invalid_request(format!("bedrock url: {e}")))?;

        let resp = execute(
            VENDOR,
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .header(http::header::ACCEPT, "application/json")
                .json(body),
        )
        .await?;

        if !resp.status.is_success() {
            let error_type = error_type(&resp);
            let kind = classify_error(&error_type, resp.status);
            return Err(vendor_failure(VENDOR, &resp, kind, &error_type));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ProviderAdapter for BedrockAdapter {
    fn name(&self) -> &str {
        VENDOR
    }

    fn models(&self) -> Vec<ModelSpec> {
        self.models.clone()
    }

    async fn chat(&self, request: &NormalizedChatRequest) -> Result<ChatCompletion, ProviderError> {
        let spec = vendor_model(&self.models, &request.model)?;
        let body = to_converse(request)?;
        let resp = self.post(&spec.vendor_model, "converse", &body).await?;
        let converse: ConverseResponse = decode_json(VENDOR, &resp)?;
        if let Some(metrics) = &converse.metrics {
            info!(model = %request.model, latency_ms = metrics.latency_ms, "bedrock converse");
        }
        Ok(from_converse(converse, &request.model))
    }

    async fn embed(
        &self,
        request: &NormalizedEmbeddingRequest,
    ) -> Result<EmbeddingResult, ProviderError> {
        let spec = vendor_model(&self.models, &request.model)?;
        let body = to_cohere(request)?;
        let resp = self.post(&spec.vendor_model, "invoke", &body).await?;
        let token_count = resp
            .headers
            .get(INPUT_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        let cohere: CohereResponse = decode_json(VENDOR, &resp)?;
        Ok(from_cohere(cohere, &request.model, token_count))
    }
}

// ---------------------------------------------------------------------------
// Converse wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest {
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<SystemBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inference_config: Option<InferenceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum ContentBlock {
    Text(String),
    Image(ImageBlock),
    Document(DocumentBlock),
}

#[derive(Debug, Serialize)]
struct ImageBlock {
    format: &'static str,
    source: BytesSource,
}

#[derive(Debug, Serialize)]
struct DocumentBlock {
    format: &'static str,
    name: String,
    source: BytesSource,
}

#[derive(Debug, Serialize)]
struct BytesSource {
    bytes: String,
}

#[derive(Debug, Serialize)]
struct SystemBlock {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ToolConfig {
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    tool_spec: ToolSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSpec {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: InputSchema,
}

#[derive(Debug, Serialize)]
struct InputSchema {
    json: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: ConverseOutput,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ConverseUsage>,
    #[serde(default)]
    metrics: Option<ConverseMetrics>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    #[serde(default)]
    message: Option<OutputMessage>,
}

#[derive(Debug, Deserialize)]
struct OutputMessage {
    #[serde(default)]
    content: Vec<OutputBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputBlock {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_use: Option<ToolUse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseMetrics {
    latency_ms: u64,
}

// ---------------------------------------------------------------------------
// Cohere embed wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct CohereRequest {
    texts: Vec<String>,
    input_type: &'static str,
    embedding_types: [&'static str; 1],
    truncate: &'static str,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    embeddings: CohereEmbeddings,
}

#[derive(Debug, Deserialize)]
struct CohereEmbeddings {
    float: Vec<Vec<f32>>,
}

// ---------------------------------------------------------------------------
// Translation
// ---------------------------------------------------------------------------

fn to_converse(req: &NormalizedChatRequest) -> Result<ConverseRequest, ProviderError> {
    let mut system = Vec::new();
    let mut messages: Vec<Message> = Vec::new();
    let mut document_count = 0usize;

    for msg in &req.messages {
        if msg.role == Role::System {
            system.extend(
                msg.parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text(t) if !t.trim().is_empty() => Some(t.clone()),
                        _ => None,
                    })
                    .map(|text| SystemBlock { text }),
            );
            continue;
        }

        let role = if msg.role == Role::User { "user" } else { "assistant" };
        let mut blocks = Vec::with_capacity(msg.parts.len());
        for part in &msg.parts {
            match part {
                ContentPart::Text(t) if t.trim().is_empty() => {}
                ContentPart::Text(t) => blocks.push(ContentBlock::Text(t.clone())),
                ContentPart::Image { format, data } => blocks.push(ContentBlock::Image(ImageBlock {
                    format: format.as_str(),
                    source: BytesSource {
                        bytes: encode_base64(data),
                    },
                })),
                ContentPart::File { data, .. } => {
                    document_count += 1;
                    blocks.push(ContentBlock::Document(DocumentBlock {
                        format: "pdf",
                        name: format!("document-{document_count}"),
                        source: BytesSource {
                            bytes: encode_base64(data),
                        },
                    }));
                }
            }
        }
        if blocks.is_empty() {
            debug!(role, "skipping empty message for bedrock");
            continue;
        }

        // Converse requires strictly alternating roles.
        match messages.last_mut() {
            Some(prev) if prev.role == role => prev.content.extend(blocks),
            _ => messages.push(Message {
                role,
                content: blocks,
            }),
        }
    }

    if messages.is_empty() {
        return Err(ProviderError::invalid_request(
            "no user or assistant content after conversion",
        ));
    }
    if messages[0].role != "user" {
        return Err(ProviderError::invalid_request(
            "bedrock conversations must start with a user message",
        ));
    }
    for (idx, m) in messages.iter().enumerate() {
        let images = m
            .content
            .iter()
            .filter(|b| matches!(b, ContentBlock::Image(_)))
            .count();
        let documents = m
            .content
            .iter()
            .filter(|b| matches!(b, ContentBlock::Document(_)))
            .count();
        if images > MAX_IMAGES_PER_MESSAGE {
            return Err(ProviderError::invalid_request(format!(
                "message {idx} has {images} images, bedrock allows {MAX_IMAGES_PER_MESSAGE}"
            )));
        }
        if documents > MAX_DOCUMENTS_PER_MESSAGE {
            return Err(ProviderError::invalid_request(format!(
                "message {idx} has {documents} documents, bedrock allows {MAX_DOCUMENTS_PER_MESSAGE}"
            )));
        }
    }

    let sampling = &req.sampling;
    if sampling.n.is_some_and(|n| n > 1) {
        debug!(model = %req.model, "bedrock converse returns a single choice; ignoring n");
    }
    let inference_config = (!sampling.is_empty()).then(|| InferenceConfig {
        max_tokens: sampling.max_tokens,
        temperature: sampling.temperature.map(|t| t.min(MAX_TEMPERATURE)),
        top_p: sampling.top_p,
        stop_sequences: sampling.stop.clone(),
    });

    let tool_config = (!req.tools.is_empty()).then(|| ToolConfig {
        tools: req
            .tools
            .iter()
            .map(|t| Tool {
                tool_spec: ToolSpec {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: InputSchema {
                        json: t.parameters.clone(),
                    },
                },
            })
            .collect(),
    });

    Ok(ConverseRequest {
        messages,
        system,
        inference_config,
        tool_config,
    })
}

fn finish_reason(stop_reason: Option<&str>) -> FinishReason {
    match stop_reason {
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("guardrail_intervened") | Some("content_filtered") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

fn from_converse(resp: ConverseResponse, model: &str) -> ChatCompletion {
    let blocks = resp.output.message.map(|m| m.content).unwrap_or_default();

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        if let Some(t) = block.text {
            text.push_str(&t);
        }
        if let Some(tool) = block.tool_use {
            tool_calls.push(ToolCall {
                id: tool.tool_use_id,
                name: tool.name,
                arguments: tool.input.to_string(),
            });
        }
    }

    let usage = resp
        .usage
        .map(|u| Usage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
        })
        .unwrap_or_default();

    ChatCompletion {
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
            tool_calls,
            finish_reason: finish_reason(resp.stop_reason.as_deref()),
        }],
        usage,
    }
}

fn cohere_input_type(input_type: Option<EmbeddingInputType>) -> Result<&'static str, ProviderError> {
    match input_type {
        None | Some(EmbeddingInputType::SearchDocument) => Ok("search_document"),
        Some(EmbeddingInputType::SearchQuery) => Ok("search_query"),
        Some(EmbeddingInputType::Classification) => Ok("classification"),
        Some(EmbeddingInputType::Clustering) => Ok("clustering"),
        Some(EmbeddingInputType::SemanticSimilarity) => Err(ProviderError::invalid_request(
            "cohere embeddings do not support input_type 'semantic_similarity'",
        )),
    }
}

fn to_cohere(req: &NormalizedEmbeddingRequest) -> Result<CohereRequest, ProviderError> {
    if req.inputs.len() > MAX_EMBED_TEXTS {
        return Err(ProviderError::invalid_request(format!(
            "cohere accepts at most {MAX_EMBED_TEXTS} inputs per request"
        )));
    }
    if let Some(idx) = req
        .inputs
        .iter()
        .position(|t| t.chars().count() > MAX_EMBED_TEXT_CHARS)
    {
        return Err(ProviderError::invalid_request(format!(
            "input {idx} exceeds {MAX_EMBED_TEXT_CHARS} characters"
        )));
    }
    if req.dimensions.is_some() {
        return Err(ProviderError::invalid_request(
            "cohere english v3 does not support custom dimensions",
        ));
    }
    Ok(CohereRequest {
        texts: req.inputs.clone(),
        input_type: cohere_input_type(req.input_type)?,
        embedding_types: ["float"],
        truncate: "END",
    })
}

fn from_cohere(resp: CohereResponse, model: &str, token_count: u32) -> EmbeddingResult {
    EmbeddingResult {
        model: model.to_string(),
        embeddings: resp
            .embeddings
            .float
            .into_iter()
            .enumerate()
            .map(|(idx, vector)| Embedding {
                index: idx as u32,
                vector,
            })
            .collect(),
        usage: Usage {
            prompt_tokens: token_count,
            completion_tokens: 0,
            total_tokens: token_count,
        },
    }
}

/// Bedrock error type, from the error header or the body's `__type`.
fn error_type(resp: &VendorResponse) -> String {
    let raw = resp
        .headers
        .get(ERROR_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            serde_json::from_slice::<Value>(&resp.body)
                .ok()
                .and_then(|v| v.get("__type").and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or_default();
    // Header values look like "ThrottlingException:http://internal.amazon.com/...".
    let name = raw.split(':').next().unwrap_or_default();
    name.rsplit('#').next().unwrap_or_default().to_string()
}

fn classify_error(error_type: &str, status: http::StatusCode) -> ProviderErrorKind {
    match error_type {
        "ThrottlingException" | "ServiceQuotaExceededException" => ProviderErrorKind::Quota,
        "ModelTimeoutException" => ProviderErrorKind::Timeout,
        "ServiceUnavailableException" | "InternalServerException" | "ModelNotReadyException" => {
            ProviderErrorKind::Unavailable
        }
        "AccessDeniedException" | "UnrecognizedClientException" => ProviderErrorKind::VendorAuth,
        "ValidationException" | "ResourceNotFoundException" | "ModelErrorException" => {
            ProviderErrorKind::InvalidRequest
        }
        _ => status_kind(status),
    }
}
