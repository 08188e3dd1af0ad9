//! Deterministic in-process adapter for local development and tests.
//!
//! Behaviour can be steered per request with directives embedded in the last
//! user message (chat) or the first input (embeddings):
//!
//! - `mock:error:<kind>` fails with the given [`ProviderErrorKind`]
//! - `mock:choices:<n>` returns `n` choices
//! - `mock:length`, `mock:content_filter` set the finish reason
//! - `mock:tool_call` answers with a call to the first declared tool

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{vendor_model, ModelSpec, ProviderAdapter, ProviderError, ProviderErrorKind};
use crate::normalize::{
    ChatChoice, ChatCompletion, Embedding, EmbeddingResult, FinishReason, NormalizedChatRequest,
    NormalizedEmbeddingRequest, ToolCall, Usage,
};

const DEFAULT_DIMENSIONS: usize = 8;
const MAX_CHOICES: usize = 8;

pub struct MockAdapter {
    models: Vec<ModelSpec>,
    fail_with: Option<ProviderErrorKind>,
    calls: AtomicUsize,
}

#[derive(Debug, Default, PartialEq)]
struct Directives {
    error: Option<ProviderErrorKind>,
    choices: Option<usize>,
    finish: Option<FinishReason>,
    tool_call: bool,
}

fn parse_directives(text: &str) -> Directives {
    let mut d = Directives::default();
    for word in text.split_whitespace() {
        let Some(rest) = word.strip_prefix("mock:") else {
            continue;
        };
        match rest.split_once(':') {
            Some(("error", kind)) => d.error = ProviderErrorKind::parse(kind),
            Some(("choices", n)) => d.choices = n.parse().ok(),
            _ => match rest {
                "length" => d.finish = Some(FinishReason::Length),
                "content_filter" => d.finish = Some(FinishReason::ContentFilter),
                "tool_call" => d.tool_call = true,
                _ => {}
            },
        }
    }
    d
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Deterministic vector derived from the SHA-256 of the input.
fn vector_for(input: &str, dimensions: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(dimensions);
    let mut block = 0u32;
    while out.len() < dimensions {
        let mut hasher = Sha256::new();
        hasher.update(block.to_be_bytes());
        hasher.update(input.as_bytes());
        let digest = hasher.finalize();
        out.extend(
            digest
                .iter()
                .take(dimensions - out.len())
                .map(|b| *b as f32 / 127.5 - 1.0),
        );
        block += 1;
    }
    out
}

impl MockAdapter {
    pub fn new(models: Vec<ModelSpec>) -> Self {
        Self {
            models,
            fail_with: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// An adapter whose every call fails with `kind`.
    #[cfg(test)]
    pub fn failing(models: Vec<ModelSpec>, kind: ProviderErrorKind) -> Self {
        Self {
            fail_with: Some(kind),
            ..Self::new(models)
        }
    }

    /// Vendor calls made so far, retries included.
    #[cfg(test)]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin(&self, directive_error: Option<ProviderErrorKind>) -> Result<(), ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fail_with.or(directive_error) {
            Some(kind) => {
                debug!(call, kind = %kind, "mock adapter failing on request");
                Err(ProviderError::new(kind, format!("mock {kind}")))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn models(&self) -> Vec<ModelSpec> {
        self.models.clone()
    }

    async fn chat(&self, request: &NormalizedChatRequest) -> Result<ChatCompletion, ProviderError> {
        vendor_model(&self.models, &request.model)?;
        let last = request.last_user_text().unwrap_or_default();
        let directives = parse_directives(&last);
        self.begin(directives.error)?;

        let count = directives
            .choices
            .or(request.sampling.n.map(|n| n as usize))
            .unwrap_or(1)
            .clamp(1, MAX_CHOICES);
        let reply = format!("Echo: {last}");
        let finish = directives.finish.unwrap_or(FinishReason::Stop);

        let choices: Vec<ChatChoice> = (0..count)
            .map(|i| {
                if directives.tool_call {
                    if let Some(tool) = request.tools.first() {
                        return ChatChoice {
                            index: i as u32,
                            content: None,
                            tool_calls: vec![ToolCall {
                                id: format!("call_mock_{i}"),
                                name: tool.name.clone(),
                                arguments: "{}".into(),
                            }],
                            finish_reason: FinishReason::ToolCalls,
                        };
                    }
                }
                ChatChoice {
                    index: i as u32,
                    content: Some(if count > 1 {
                        format!("{reply} [{i}]")
                    } else {
                        reply.clone()
                    }),
                    tool_calls: vec![],
                    finish_reason: finish,
                }
            })
            .collect();

        let prompt_tokens: u32 = request.messages.iter().map(|m| word_count(&m.text())).sum();
        let completion_tokens = word_count(&reply) * count as u32;
        Ok(ChatCompletion {
            model: request.model.clone(),
            choices,
            usage: Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    async fn embed(
        &self,
        request: &NormalizedEmbeddingRequest,
    ) -> Result<EmbeddingResult, ProviderError> {
        vendor_model(&self.models, &request.model)?;
        let directives = request
            .inputs
            .first()
            .map(|s| parse_directives(s))
            .unwrap_or_default();
        self.begin(directives.error)?;

        let dimensions = request
            .dimensions
            .map(|d| d as usize)
            .unwrap_or(DEFAULT_DIMENSIONS);
        let prompt_tokens: u32 = request.inputs.iter().map(|s| word_count(s)).sum();
        Ok(EmbeddingResult {
            model: request.model.clone(),
            embeddings: request
                .inputs
                .iter()
                .enumerate()
                .map(|(idx, input)| Embedding {
                    index: idx as u32,
                    vector: vector_for(input, dimensions),
                })
                .collect(),
            usage: Usage {
                prompt_tokens,
                completion_tokens: 0,
                total_tokens: prompt_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::types::{ChatMessage, ContentPart, Role, SamplingParams, ToolDescriptor};
    use crate::provider::{bedrock, Capabilities};

    fn adapter() -> MockAdapter {
        MockAdapter::new(bedrock::catalogue())
    }

    fn chat(text: &str) -> NormalizedChatRequest {
        NormalizedChatRequest {
            model: "claude_3_5_sonnet".into(),
            messages: vec![ChatMessage {
                role: Role::User,
                parts: vec![ContentPart::Text(text.into())],
            }],
            sampling: SamplingParams::default(),
            tools: vec![],
            user: None,
        }
    }

    #[test]
    fn test_parse_directives() {
        let d = parse_directives("hello mock:choices:3 mock:length");
        assert_eq!(d.choices, Some(3));
        assert_eq!(d.finish, Some(FinishReason::Length));
        assert_eq!(
            parse_directives("mock:error:unavailable").error,
            Some(ProviderErrorKind::Unavailable)
        );
        assert_eq!(parse_directives("no directives here"), Directives::default());
    }

    #[tokio::test]
    async fn test_echo_chat() {
        let out = adapter().chat(&chat("Hello there")).await.unwrap();
        assert_eq!(out.choices.len(), 1);
        assert_eq!(out.choices[0].content.as_deref(), Some("Echo: Hello there"));
        assert_eq!(out.usage.prompt_tokens, 2);
        assert_eq!(out.usage.completion_tokens, 3);
    }

    #[tokio::test]
    async fn test_choice_count_from_n() {
        let mut req = chat("hi");
        req.sampling.n = Some(3);
        let out = adapter().chat(&req).await.unwrap();
        assert_eq!(out.choices.len(), 3);
        assert_eq!(out.choices[2].index, 2);
    }

    #[tokio::test]
    async fn test_tool_call_directive() {
        let mut req = chat("mock:tool_call");
        req.tools = vec![ToolDescriptor {
            name: "lookup".into(),
            description: None,
            parameters: serde_json::json!({"type": "object"}),
        }];
        let out = adapter().chat(&req).await.unwrap();
        assert_eq!(out.choices[0].finish_reason, FinishReason::ToolCalls);
        assert_eq!(out.choices[0].tool_calls[0].name, "lookup");
    }

    #[tokio::test]
    async fn test_failing_counts_calls() {
        let mock = MockAdapter::failing(bedrock::catalogue(), ProviderErrorKind::Timeout);
        let err = mock.chat(&chat("hi")).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Timeout);
        assert!(err.retriable);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let mock = MockAdapter::new(vec![ModelSpec::new(
            "emb",
            "Embeddings",
            Capabilities::EMBEDDING,
            "emb",
        )]);
        let req = NormalizedEmbeddingRequest {
            model: "emb".into(),
            inputs: vec!["alpha".into(), "beta".into(), "alpha".into()],
            dimensions: Some(40),
            input_type: None,
        };
        let out = mock.embed(&req).await.unwrap();
        assert_eq!(out.embeddings.len(), 3);
        assert_eq!(out.embeddings[0].vector.len(), 40);
        assert_eq!(out.embeddings[0].vector, out.embeddings[2].vector);
        assert_ne!(out.embeddings[0].vector, out.embeddings[1].vector);
        assert!(out.embeddings[1].vector.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[tokio::test]
    async fn test_unserved_model_rejected() {
        let mut req = chat("hi");
        req.model = "gemini-1.5-pro".into();
        let err = adapter().chat(&req).await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidRequest);
    }
}
