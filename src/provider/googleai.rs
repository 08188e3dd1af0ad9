use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::gemini::{self, GenerateContentResponse};
use super::http::{build_vendor_url, decode_json, execute, VendorResponse};
use super::{vendor_model, Capabilities, ModelSpec, ProviderAdapter, ProviderError};
use crate::normalize::{
    ChatCompletion, Embedding, EmbeddingResult, NormalizedChatRequest, NormalizedEmbeddingRequest,
    Usage,
};

const VENDOR: &str = "googleai";
const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Requests per `batchEmbedContents` call.
const MAX_BATCH_EMBED: usize = 100;

pub fn catalogue() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new(
            "gemini-1.5-pro",
            "Gemini 1.5 Pro",
            Capabilities::CHAT,
            "gemini-1.5-pro",
        ),
        ModelSpec::new(
            "text-embedding-004",
            "Text Embedding 004",
            Capabilities::EMBEDDING,
            "text-embedding-004",
        ),
    ]
}

/// Google AI (Gemini API) adapter configuration.
pub struct GoogleAiConfig {
    pub api_key: String,
    pub endpoint: Option<String>,
    pub models: Vec<ModelSpec>,
}

pub struct GoogleAiAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    models: Vec<ModelSpec>,
}

impl GoogleAiAdapter {
    pub fn new(config: GoogleAiConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: config
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key: config.api_key,
            models: config.models,
        }
    }

    async fn post<B: Serialize>(
        &self,
        vendor_model: &str,
        method: &str,
        body: &B,
    ) -> Result<VendorResponse, ProviderError> {
        let model_method = format!("{vendor_model}:{method}");
        let url = build_vendor_url(&self.endpoint, &["v1beta", "models", &model_method])
            .map_err(|e| ProviderError::invalid_request(format!("googleai url: {e}")))?;

        let resp = execute(
            VENDOR,
            self.client
                .post(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .json(body),
        )
        .await?;

        if !resp.status.is_success() {
            return Err(gemini::failure(VENDOR, &resp));
        }
        Ok(resp)
    }
}

#[async_trait]
impl ProviderAdapter for GoogleAiAdapter {
    fn name(&self) -> &str {
        VENDOR
    }

    fn models(&self) -> Vec<ModelSpec> {
        self.models.clone()
    }

    async fn chat(&self, request: &NormalizedChatRequest) -> Result<ChatCompletion, ProviderError> {
        let spec = vendor_model(&self.models, &request.model)?;
        let body = gemini::to_generate_content(request)?;
        let resp = self.post(&spec.vendor_model, "generateContent", &body).await?;
        let generated: GenerateContentResponse = decode_json(VENDOR, &resp)?;
        gemini::from_generate_content(generated, &request.model)
    }

    async fn embed(
        &self,
        request: &NormalizedEmbeddingRequest,
    ) -> Result<EmbeddingResult, ProviderError> {
        let spec = vendor_model(&self.models, &request.model)?;
        if request.inputs.len() > MAX_BATCH_EMBED {
            return Err(ProviderError::invalid_request(format!(
                "google ai accepts at most {MAX_BATCH_EMBED} inputs per request"
            )));
        }

        let model_path = format!("models/{}", spec.vendor_model);
        let task_type = gemini::task_type(request.input_type);
        let body = BatchEmbedRequest {
            requests: request
                .inputs
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &model_path,
                    content: EmbedContent {
                        parts: vec![TextPart { text }],
                    },
                    task_type,
                    output_dimensionality: request.dimensions,
                })
                .collect(),
        };
        let resp = self
            .post(&spec.vendor_model, "batchEmbedContents", &body)
            .await?;
        let batch: BatchEmbedResponse = decode_json(VENDOR, &resp)?;

        // The batch endpoint reports no token usage.
        Ok(EmbeddingResult {
            model: request.model.clone(),
            embeddings: batch
                .embeddings
                .into_iter()
                .enumerate()
                .map(|(idx, e)| Embedding {
                    index: idx as u32,
                    vector: e.values,
                })
                .collect(),
            usage: Usage::default(),
        })
    }
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}
