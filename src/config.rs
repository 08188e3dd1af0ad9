use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::{info, warn};

use crate::provider::{
    bedrock, googleai, vertex, BedrockAdapter, BedrockConfig, CallPolicy, GoogleAiAdapter,
    GoogleAiConfig, MockAdapter, ModelSpec, ProviderAdapter, VertexAdapter, VertexConfig,
};
use crate::registry::RegistryError;

/// Which adapters serve the model catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderMode {
    /// Deterministic in-process adapters, no vendor calls.
    Mock,
    /// Real vendor APIs.
    Live,
}

impl ProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderMode::Mock => "mock",
            ProviderMode::Live => "live",
        }
    }
}

/// Inference Gateway: OpenAI-compatible API over Bedrock, Vertex AI and Google AI.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Listen address (e.g. ":8080" or "0.0.0.0:8080")
    #[arg(long, default_value = ":8080", env = "ADDR")]
    pub addr: String,

    /// Log format: "text" or "json"
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    pub log_format: String,

    /// Serve models from mock or live adapters
    #[arg(long, value_enum, default_value_t = ProviderMode::Mock, env = "PROVIDER_MODE")]
    pub provider_mode: ProviderMode,

    /// Enable dev mode with an ephemeral all-scope API key
    #[arg(long, default_value_t = false, env = "DEV_MODE")]
    pub dev_mode: bool,

    /// JSON file of API keys to load into the credential store
    #[arg(long, env = "API_KEYS_FILE")]
    pub api_keys_file: Option<PathBuf>,

    /// Credential lookup timeout in milliseconds
    #[arg(long, default_value_t = 2_000, env = "STORE_TIMEOUT_MS")]
    pub store_timeout_ms: u64,

    /// Per-attempt vendor call timeout in milliseconds
    #[arg(long, default_value_t = 60_000, env = "PROVIDER_TIMEOUT_MS")]
    pub provider_timeout_ms: u64,

    /// Attempts per vendor call, including the first
    #[arg(long, default_value_t = 3, env = "PROVIDER_MAX_ATTEMPTS")]
    pub provider_max_attempts: u32,

    /// Initial retry backoff in milliseconds, doubled per attempt
    #[arg(long, default_value_t = 200, env = "PROVIDER_BACKOFF_MS")]
    pub provider_backoff_ms: u64,

    /// AWS region for Bedrock
    #[arg(long, default_value = "us-east-1", env = "AWS_DEFAULT_REGION")]
    pub aws_region: String,

    /// Bedrock API key (enables Bedrock in live mode)
    #[arg(long, env = "BEDROCK_API_KEY", hide_env_values = true)]
    pub bedrock_api_key: Option<String>,

    /// Bedrock runtime endpoint override
    #[arg(long, env = "BEDROCK_ENDPOINT")]
    pub bedrock_endpoint: Option<String>,

    /// Model or inference profile ARN for claude_3_5_sonnet
    #[arg(long, env = "BEDROCK_CLAUDE_3_5_SONNET_ARN")]
    pub bedrock_claude_3_5_sonnet_arn: Option<String>,

    /// Model or inference profile ARN for llama3211b
    #[arg(long, env = "BEDROCK_LLAMA3211B_ARN")]
    pub bedrock_llama3211b_arn: Option<String>,

    /// Model ARN for cohere_english_v3
    #[arg(long, env = "BEDROCK_COHERE_ENGLISH_V3_ARN")]
    pub bedrock_cohere_english_v3_arn: Option<String>,

    /// Google Cloud project for Vertex AI
    #[arg(long, env = "VERTEX_PROJECT_ID")]
    pub vertex_project_id: Option<String>,

    /// Vertex AI location
    #[arg(long, default_value = "us-central1", env = "VERTEX_LOCATION")]
    pub vertex_location: String,

    /// OAuth2 access token for Vertex AI (enables Vertex in live mode)
    #[arg(long, env = "VERTEX_ACCESS_TOKEN", hide_env_values = true)]
    pub vertex_access_token: Option<String>,

    /// Vertex AI endpoint override
    #[arg(long, env = "VERTEX_ENDPOINT")]
    pub vertex_endpoint: Option<String>,

    /// Google AI API key (enables Google AI in live mode)
    #[arg(long, env = "GOOGLE_AI_API_KEY", hide_env_values = true)]
    pub google_ai_api_key: Option<String>,

    /// Google AI endpoint
    #[arg(
        long,
        default_value = "https://generativelanguage.googleapis.com",
        env = "GOOGLE_AI_ENDPOINT"
    )]
    pub google_ai_endpoint: String,
}

/// Start-up failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{setting} is required when {vendor} is enabled")]
    MissingSetting {
        vendor: &'static str,
        setting: &'static str,
    },

    #[error("{0} is enabled but has no models configured")]
    NoModels(&'static str),

    #[error("live mode needs at least one of BEDROCK_API_KEY, VERTEX_ACCESS_TOKEN, GOOGLE_AI_API_KEY")]
    NoVendors,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl Config {
    pub fn call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(self.provider_timeout_ms),
            max_attempts: self.provider_max_attempts.max(1),
            base_backoff: Duration::from_millis(self.provider_backoff_ms),
            ..CallPolicy::default()
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Adapters for the configured mode.
    pub fn adapters(
        &self,
        client: &reqwest::Client,
    ) -> Result<Vec<Arc<dyn ProviderAdapter>>, StartupError> {
        match self.provider_mode {
            ProviderMode::Mock => Ok(vec![
                Arc::new(MockAdapter::new(bedrock::catalogue())),
                Arc::new(MockAdapter::new(vertex::catalogue())),
                Arc::new(MockAdapter::new(googleai::catalogue())),
            ]),
            ProviderMode::Live => self.live_adapters(client),
        }
    }

    fn live_adapters(
        &self,
        client: &reqwest::Client,
    ) -> Result<Vec<Arc<dyn ProviderAdapter>>, StartupError> {
        let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

        if let Some(api_key) = &self.bedrock_api_key {
            let models = self.bedrock_models();
            if models.is_empty() {
                return Err(StartupError::NoModels("bedrock"));
            }
            info!(region = %self.aws_region, models = models.len(), "bedrock enabled");
            adapters.push(Arc::new(BedrockAdapter::new(
                BedrockConfig {
                    region: self.aws_region.clone(),
                    api_key: api_key.clone(),
                    endpoint: self.bedrock_endpoint.clone(),
                    models,
                },
                client.clone(),
            )));
        }

        if let Some(access_token) = &self.vertex_access_token {
            let project_id = self
                .vertex_project_id
                .clone()
                .ok_or(StartupError::MissingSetting {
                    vendor: "vertex",
                    setting: "VERTEX_PROJECT_ID",
                })?;
            info!(project = %project_id, location = %self.vertex_location, "vertex enabled");
            adapters.push(Arc::new(VertexAdapter::new(
                VertexConfig {
                    project_id,
                    location: self.vertex_location.clone(),
                    access_token: access_token.clone(),
                    endpoint: self.vertex_endpoint.clone(),
                    models: vertex::catalogue(),
                },
                client.clone(),
            )));
        }

        if let Some(api_key) = &self.google_ai_api_key {
            info!(endpoint = %self.google_ai_endpoint, "google ai enabled");
            adapters.push(Arc::new(GoogleAiAdapter::new(
                GoogleAiConfig {
                    api_key: api_key.clone(),
                    endpoint: Some(self.google_ai_endpoint.clone()),
                    models: googleai::catalogue(),
                },
                client.clone(),
            )));
        }

        if adapters.is_empty() {
            return Err(StartupError::NoVendors);
        }
        Ok(adapters)
    }

    /// Bedrock catalogue entries that have an ARN configured.
    fn bedrock_models(&self) -> Vec<ModelSpec> {
        bedrock::catalogue()
            .into_iter()
            .filter_map(|mut spec| {
                let arn = match spec.id.as_str() {
                    "claude_3_5_sonnet" => self.bedrock_claude_3_5_sonnet_arn.as_ref(),
                    "llama3211b" => self.bedrock_llama3211b_arn.as_ref(),
                    "cohere_english_v3" => self.bedrock_cohere_english_v3_arn.as_ref(),
                    _ => None,
                };
                match arn {
                    Some(arn) => {
                        spec.vendor_model = arn.clone();
                        Some(spec)
                    }
                    None => {
                        warn!(model = %spec.id, "no bedrock ARN configured, model disabled");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Convert Go-style ":8080" to "0.0.0.0:8080".
pub fn normalize_addr(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}
