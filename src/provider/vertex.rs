use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::gemini::{self, GenerateContentResponse};
use super::http::{build_vendor_url, decode_json, execute, VendorResponse};
use super::{vendor_model, Capabilities, ModelSpec, ProviderAdapter, ProviderError};
use crate::normalize::{
    ChatCompletion, Embedding, EmbeddingResult, NormalizedChatRequest, NormalizedEmbeddingRequest,
    Usage,
};

const VENDOR: &str = "vertex";

/// Instances per `:predict` call for text embeddings.
const MAX_EMBED_INSTANCES: usize = 250;

pub fn catalogue() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new(
            "gemini-2.0-flash",
            "Gemini 2.0 Flash",
            Capabilities::CHAT,
            "gemini-2.0-flash",
        ),
        ModelSpec::new(
            "text-embedding-005",
            "Text Embedding 005",
            Capabilities::EMBEDDING,
            "text-embedding-005",
        ),
    ]
}

/// Vertex AI adapter configuration.
pub struct VertexConfig {
    pub project_id: String,
    pub location: String,
    /// OAuth2 access token sent as a bearer token.
    pub access_token: String,
    /// Overrides `https://<location>-aiplatform.googleapis.com`.
    pub endpoint: Option<String>,
    pub models: Vec<ModelSpec>,
}

pub struct VertexAdapter {
    client: reqwest::Client,
    endpoint: String,
    project_id: String,
    location: String,
    access_token: String,
    models: Vec<ModelSpec>,
}

impl VertexAdapter {
    pub fn new(config: VertexConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: config
                .endpoint
                .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", config.location)),
            project_id: config.project_id,
            location: config.location,
            access_token: config.access_token,
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
        let url = build_vendor_url(
            &self.endpoint,
            &[
                "v1",
                "projects",
                &self.project_id,
                "locations",
                &self.location,
                "publishers",
                "google",
                "models",
                &model_method,
            ],
        )
        .map_err(|e| ProviderError::invalid_request(format!("vertex url: {e}")))?;

        let resp = execute(
            VENDOR,
            self.client
                .post(&url)
                .bearer_auth(&self.access_token)
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
impl ProviderAdapter for VertexAdapter {
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
        if request.inputs.len() > MAX_EMBED_INSTANCES {
            return Err(ProviderError::invalid_request(format!(
                "vertex accepts at most {MAX_EMBED_INSTANCES} inputs per request"
            )));
        }

        let task_type = gemini::task_type(request.input_type);
        let body = PredictRequest {
            instances: request
                .inputs
                .iter()
                .map(|content| Instance {
                    content,
                    task_type,
                })
                .collect(),
            parameters: PredictParameters {
                auto_truncate: true,
                output_dimensionality: request.dimensions,
            },
        };
        let resp = self.post(&spec.vendor_model, "predict", &body).await?;
        let predicted: PredictResponse = decode_json(VENDOR, &resp)?;

        let mut tokens = 0u32;
        let embeddings = predicted
            .predictions
            .into_iter()
            .enumerate()
            .map(|(idx, p)| {
                tokens += p.embeddings.statistics.map(|s| s.token_count).unwrap_or(0);
                Embedding {
                    index: idx as u32,
                    vector: p.embeddings.values,
                }
            })
            .collect();

        Ok(EmbeddingResult {
            model: request.model.clone(),
            embeddings,
            usage: Usage {
                prompt_tokens: tokens,
                completion_tokens: 0,
                total_tokens: tokens,
            },
        })
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    task_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    auto_truncate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    embeddings: PredictionEmbeddings,
}

#[derive(Debug, Deserialize)]
struct PredictionEmbeddings {
    values: Vec<f32>,
    #[serde(default)]
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
struct Statistics {
    // Vertex reports token counts as floats.
    #[serde(default, deserialize_with = "float_count")]
    token_count: u32,
}

fn float_count<'de, D: serde::Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = f64::deserialize(d)?;
    Ok(v.max(0.0) as u32)
}
