pub mod bedrock;
pub mod errors;
mod gemini;
pub mod googleai;
pub mod http;
pub mod mock;
pub mod retry;
#[cfg(test)]
pub(crate) mod testing;
pub mod vertex;

use async_trait::async_trait;

pub use bedrock::{BedrockAdapter, BedrockConfig};
pub use errors::{ProviderError, ProviderErrorKind};
pub use googleai::{GoogleAiAdapter, GoogleAiConfig};
pub use mock::MockAdapter;
pub use retry::CallPolicy;
pub use vertex::{VertexAdapter, VertexConfig};

use crate::normalize::{
    ChatCompletion, EmbeddingResult, NormalizedChatRequest, NormalizedEmbeddingRequest,
};

/// Capability interface every vendor adapter implements.
///
/// Adapters are shared across requests and must hold no request state.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Human-readable name for this adapter.
    fn name(&self) -> &str;

    /// Models this adapter serves, used to build the registry at start-up.
    fn models(&self) -> Vec<ModelSpec>;

    /// Run a chat completion.
    async fn chat(&self, request: &NormalizedChatRequest) -> Result<ChatCompletion, ProviderError>;

    /// Embed every input, one vector per input in input order.
    async fn embed(
        &self,
        request: &NormalizedEmbeddingRequest,
    ) -> Result<EmbeddingResult, ProviderError>;
}

/// What an endpoint needs from a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Chat,
    Embedding,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Embedding => "embedding",
        }
    }
}

/// Capabilities describes what a model supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub chat: bool,
    pub embedding: bool,
}

impl Capabilities {
    pub const CHAT: Capabilities = Capabilities {
        chat: true,
        embedding: false,
    };
    pub const EMBEDDING: Capabilities = Capabilities {
        chat: false,
        embedding: true,
    };

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Chat => self.chat,
            Capability::Embedding => self.embedding,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.chat && !self.embedding
    }

    pub fn names(&self) -> Vec<&'static str> {
        [Capability::Chat, Capability::Embedding]
            .into_iter()
            .filter(|c| self.supports(*c))
            .map(Capability::as_str)
            .collect()
    }
}

/// A model an adapter can serve, keyed by its public identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub id: String,
    pub name: String,
    pub capabilities: Capabilities,
    /// Identifier the vendor expects (ARN, publisher model name, ...).
    pub vendor_model: String,
}

impl ModelSpec {
    pub fn new(id: &str, name: &str, capabilities: Capabilities, vendor_model: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            capabilities,
            vendor_model: vendor_model.into(),
        }
    }
}

/// Look up the vendor model identifier for a public model id.
pub(crate) fn vendor_model<'a>(
    models: &'a [ModelSpec],
    id: &str,
) -> Result<&'a ModelSpec, ProviderError> {
    models
        .iter()
        .find(|m| m.id == id)
        .ok_or_else(|| ProviderError::invalid_request(format!("model '{id}' is not served here")))
}
