use chrono::Utc;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::protocol::{
    ChatCompletionChoice, ChatCompletionResponse, EmbeddingData, EmbeddingResponse,
    FunctionCallBody, ResponseMessage, ToolCallBody, UsageBody,
};
use crate::provider::{ProviderError, ProviderErrorKind};

use super::types::{ChatCompletion, EmbeddingResult, NormalizedResponse, Usage};

/// Bring adapter chat output into canonical form: at least one choice,
/// contiguous indices in the adapter's order, and a consistent usage total.
pub fn canonicalize_chat(mut completion: ChatCompletion) -> Result<ChatCompletion, ProviderError> {
    if completion.choices.is_empty() {
        return Err(ProviderError::new(
            ProviderErrorKind::MalformedResponse,
            "vendor returned no completion choices",
        ));
    }
    for (idx, choice) in completion.choices.iter_mut().enumerate() {
        choice.index = idx as u32;
        if choice.content.is_none() && choice.tool_calls.is_empty() {
            choice.content = Some(String::new());
        }
    }
    completion.usage = reconcile_usage(completion.usage);
    Ok(completion)
}

/// Check one vector per input and return them in input order.
pub fn canonicalize_embeddings(
    mut result: EmbeddingResult,
    expected: usize,
) -> Result<EmbeddingResult, ProviderError> {
    if result.embeddings.len() != expected {
        return Err(ProviderError::new(
            ProviderErrorKind::MalformedResponse,
            format!(
                "vendor returned {} embeddings for {expected} inputs",
                result.embeddings.len()
            ),
        ));
    }
    result.embeddings.sort_by_key(|e| e.index);
    let contiguous = result
        .embeddings
        .iter()
        .enumerate()
        .all(|(i, e)| e.index as usize == i);
    if !contiguous {
        return Err(ProviderError::new(
            ProviderErrorKind::MalformedResponse,
            "vendor embedding indices do not cover the inputs",
        ));
    }
    result.usage = reconcile_usage(result.usage);
    Ok(result)
}

fn reconcile_usage(usage: Usage) -> Usage {
    let sum = usage.prompt_tokens.saturating_add(usage.completion_tokens);
    Usage {
        total_tokens: usage.total_tokens.max(sum),
        ..usage
    }
}

pub fn chat_to_wire(completion: ChatCompletion) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion",
        created: Utc::now().timestamp(),
        model: completion.model,
        choices: completion
            .choices
            .into_iter()
            .map(|c| ChatCompletionChoice {
                index: c.index,
                message: ResponseMessage {
                    role: "assistant",
                    content: c.content,
                    tool_calls: c
                        .tool_calls
                        .into_iter()
                        .map(|t| ToolCallBody {
                            id: t.id,
                            kind: "function",
                            function: FunctionCallBody {
                                name: t.name,
                                arguments: t.arguments,
                            },
                        })
                        .collect(),
                },
                finish_reason: c.finish_reason.as_str(),
            })
            .collect(),
        usage: UsageBody {
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: Some(completion.usage.completion_tokens),
            total_tokens: completion.usage.total_tokens,
        },
    }
}

pub fn embeddings_to_wire(result: EmbeddingResult) -> EmbeddingResponse {
    EmbeddingResponse {
        object: "list",
        data: result
            .embeddings
            .into_iter()
            .map(|e| EmbeddingData {
                object: "embedding",
                embedding: e.vector,
                index: e.index,
            })
            .collect(),
        model: result.model,
        usage: UsageBody {
            prompt_tokens: result.usage.prompt_tokens,
            completion_tokens: None,
            total_tokens: result.usage.total_tokens,
        },
    }
}

/// Serialize either response kind to its wire JSON.
pub fn to_wire_json(response: NormalizedResponse) -> Result<serde_json::Value, GatewayError> {
    match response {
        NormalizedResponse::Chat(c) => serde_json::to_value(chat_to_wire(c)),
        NormalizedResponse::Embedding(e) => serde_json::to_value(embeddings_to_wire(e)),
    }
    .map_err(serialization_failure)
}

fn serialization_failure(err: serde_json::Error) -> GatewayError {
    GatewayError::Internal(format!("response serialization failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::types::{ChatChoice, Embedding, FinishReason};

    fn choice(index: u32, text: &str) -> ChatChoice {
        ChatChoice {
            index,
            content: Some(text.into()),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
        }
    }

    #[test]
    fn test_chat_reindexes_in_vendor_order() {
        let completion = ChatCompletion {
            model: "m".into(),
            choices: vec![choice(7, "a"), choice(3, "b")],
            usage: Usage {
                prompt_tokens: 3,
                completion_tokens: 4,
                total_tokens: 0,
            },
        };
        let out = canonicalize_chat(completion).unwrap();
        assert_eq!(out.choices[0].index, 0);
        assert_eq!(out.choices[0].content.as_deref(), Some("a"));
        assert_eq!(out.choices[1].index, 1);
        assert_eq!(out.usage.total_tokens, 7);
    }

    #[test]
    fn test_chat_without_choices_is_malformed() {
        let completion = ChatCompletion {
            model: "m".into(),
            choices: vec![],
            usage: Usage::default(),
        };
        let err = canonicalize_chat(completion).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedResponse);
        assert!(!err.retriable);
    }

    #[test]
    fn test_embeddings_sorted_by_index() {
        let result = EmbeddingResult {
            model: "m".into(),
            embeddings: vec![
                Embedding {
                    index: 1,
                    vector: vec![1.0],
                },
                Embedding {
                    index: 0,
                    vector: vec![0.0],
                },
            ],
            usage: Usage::default(),
        };
        let out = canonicalize_embeddings(result, 2).unwrap();
        assert_eq!(out.embeddings[0].vector, vec![0.0]);
        assert_eq!(out.embeddings[1].vector, vec![1.0]);
    }

    #[test]
    fn test_embedding_count_mismatch() {
        let result = EmbeddingResult {
            model: "m".into(),
            embeddings: vec![Embedding {
                index: 0,
                vector: vec![0.0],
            }],
            usage: Usage::default(),
        };
        assert!(canonicalize_embeddings(result, 2).is_err());
    }

    #[test]
    fn test_chat_wire_shape() {
        let json = to_wire_json(NormalizedResponse::Chat(ChatCompletion {
            model: "claude_3_5_sonnet".into(),
            choices: vec![choice(0, "hi")],
            usage: Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            },
        }))
        .unwrap();
        assert_eq!(json["object"], "chat.completion");
        assert_eq!(json["choices"][0]["message"]["role"], "assistant");
        assert_eq!(json["choices"][0]["finish_reason"], "stop");
        assert!(json["choices"][0]["message"].get("tool_calls").is_none());
        assert!(json["id"].as_str().unwrap().starts_with("chatcmpl-"));
    }

    #[test]
    fn test_embedding_wire_shape() {
        let json = to_wire_json(NormalizedResponse::Embedding(EmbeddingResult {
            model: "m".into(),
            embeddings: vec![Embedding {
                index: 0,
                vector: vec![0.5],
            }],
            usage: Usage {
                prompt_tokens: 2,
                completion_tokens: 0,
                total_tokens: 2,
            },
        }))
        .unwrap();
        assert_eq!(json["object"], "list");
        assert_eq!(json["data"][0]["object"], "embedding");
        assert!(json["usage"].get("completion_tokens").is_none());
    }

    #[test]
    fn test_serialization_failure_is_internal() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = serialization_failure(err);
        assert!(matches!(err, GatewayError::Internal(_)));
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
