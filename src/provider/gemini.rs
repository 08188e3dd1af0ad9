//! Gemini `generateContent` wire format, shared by the Vertex AI and Google AI
//! adapters.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::{status_kind, vendor_failure, VendorResponse};
use super::{ProviderError, ProviderErrorKind};
use crate::normalize::media::encode_base64;
use crate::normalize::types::EmbeddingInputType;
use crate::normalize::{
    ChatChoice, ChatCompletion, ContentPart, FinishReason, NormalizedChatRequest, Role, ToolCall,
    Usage,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Blob {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    index: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    status: String,
}

fn to_part(part: &ContentPart) -> Option<Part> {
    match part {
        ContentPart::Text(t) if t.trim().is_empty() => None,
        ContentPart::Text(t) => Some(Part {
            text: Some(t.clone()),
            ..Part::default()
        }),
        ContentPart::Image { format, data } => Some(Part {
            inline_data: Some(Blob {
                mime_type: format.mime_type().to_string(),
                data: encode_base64(data),
            }),
            ..Part::default()
        }),
        ContentPart::File { mime_type, data } => Some(Part {
            inline_data: Some(Blob {
                mime_type: mime_type.clone(),
                data: encode_base64(data),
            }),
            ..Part::default()
        }),
    }
}

/// Translate a normalized chat request. System messages become the system
/// instruction, `assistant` becomes `model`, and consecutive same-role turns
/// are merged.
pub(super) fn to_generate_content(
    req: &NormalizedChatRequest,
) -> Result<GenerateContentRequest, ProviderError> {
    let mut system_parts = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for msg in &req.messages {
        let parts: Vec<Part> = msg.parts.iter().filter_map(to_part).collect();
        if parts.is_empty() {
            continue;
        }
        let role = match msg.role {
            Role::System => {
                system_parts.extend(parts);
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };
        match contents.last_mut() {
            Some(prev) if prev.role.as_deref() == Some(role) => prev.parts.extend(parts),
            _ => contents.push(Content {
                role: Some(role.to_string()),
                parts,
            }),
        }
    }

    if contents.is_empty() {
        return Err(ProviderError::invalid_request(
            "no user or assistant content after conversion",
        ));
    }

    let s = &req.sampling;
    let generation_config = GenerationConfig {
        temperature: s.temperature,
        top_p: s.top_p,
        max_output_tokens: s.max_tokens,
        stop_sequences: s.stop.clone(),
        candidate_count: s.n,
        presence_penalty: s.presence_penalty,
        frequency_penalty: s.frequency_penalty,
    };
    let has_config = !s.is_empty()
        || s.n.is_some()
        || s.presence_penalty.is_some()
        || s.frequency_penalty.is_some();

    let tools = if req.tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolSet {
            function_declarations: req
                .tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    };

    Ok(GenerateContentRequest {
        contents,
        system_instruction: (!system_parts.is_empty()).then(|| Content {
            role: None,
            parts: system_parts,
        }),
        generation_config: has_config.then_some(generation_config),
        tools,
    })
}

fn finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") | Some("PROHIBITED_CONTENT")
        | Some("SPII") | Some("IMAGE_SAFETY") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Translate a `generateContent` response. Candidates are ordered by their
/// `index` when the vendor supplies one, otherwise by position.
pub(super) fn from_generate_content(
    resp: GenerateContentResponse,
    model: &str,
) -> Result<ChatCompletion, ProviderError> {
    if resp.candidates.is_empty() {
        if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::new(
                ProviderErrorKind::ContentPolicy,
                format!("prompt blocked: {reason}"),
            ));
        }
        return Err(ProviderError::malformed("response has no candidates"));
    }

    let mut candidates: Vec<(usize, Candidate)> = resp.candidates.into_iter().enumerate().collect();
    candidates.sort_by_key(|(pos, c)| c.index.map(|i| i as usize).unwrap_or(*pos));

    let mut call_seq = 0usize;
    let choices = candidates
        .into_iter()
        .enumerate()
        .map(|(idx, (_, candidate))| {
            let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
            let mut text = String::new();
            let mut tool_calls = Vec::new();
            for part in parts {
                if let Some(t) = part.text {
                    text.push_str(&t);
                }
                if let Some(call) = part.function_call {
                    tool_calls.push(ToolCall {
                        id: format!("call_{call_seq}"),
                        name: call.name,
                        arguments: call.args.to_string(),
                    });
                    call_seq += 1;
                }
            }
            let finish_reason = if tool_calls.is_empty() {
                finish_reason(candidate.finish_reason.as_deref())
            } else {
                FinishReason::ToolCalls
            };
            ChatChoice {
                index: idx as u32,
                content: (!text.is_empty() || tool_calls.is_empty()).then_some(text),
                tool_calls,
                finish_reason,
            }
        })
        .collect();

    let usage = resp.usage_metadata.unwrap_or_default();
    Ok(ChatCompletion {
        model: model.to_string(),
        choices,
        usage: Usage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        },
    })
}

/// Google embedding task type for an input-type hint.
pub(super) fn task_type(input_type: Option<EmbeddingInputType>) -> Option<&'static str> {
    input_type.map(|t| match t {
        EmbeddingInputType::SearchDocument => "RETRIEVAL_DOCUMENT",
        EmbeddingInputType::SearchQuery => "RETRIEVAL_QUERY",
        EmbeddingInputType::Classification => "CLASSIFICATION",
        EmbeddingInputType::Clustering => "CLUSTERING",
        EmbeddingInputType::SemanticSimilarity => "SEMANTIC_SIMILARITY",
    })
}

fn classify_status(status: &str, http_status: http::StatusCode) -> ProviderErrorKind {
    match status {
        "RESOURCE_EXHAUSTED" => ProviderErrorKind::Quota,
        "UNAVAILABLE" | "INTERNAL" => ProviderErrorKind::Unavailable,
        "DEADLINE_EXCEEDED" => ProviderErrorKind::Timeout,
        "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "NOT_FOUND" | "OUT_OF_RANGE" => {
            ProviderErrorKind::InvalidRequest
        }
        "PERMISSION_DENIED" | "UNAUTHENTICATED" => ProviderErrorKind::VendorAuth,
        _ => status_kind(http_status),
    }
}

/// Classify a non-2xx Google API response and log it.
pub(super) fn failure(vendor: &str, resp: &VendorResponse) -> ProviderError {
    let status = serde_json::from_slice::<ErrorEnvelope>(&resp.body)
        .map(|e| e.error.status)
        .unwrap_or_default();
    let kind = classify_status(&status, resp.status);
    vendor_failure(vendor, resp, kind, &status)
}
