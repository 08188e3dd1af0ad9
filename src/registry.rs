use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::provider::{Capabilities, Capability, ProviderAdapter};

/// Registry lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("model '{0}' does not exist")]
    UnknownModel(String),

    #[error("model '{model}' does not support {}", .required.as_str())]
    CapabilityMismatch { model: String, required: Capability },
}

/// Registry construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("model '{model}' is served by both {first} and {second}")]
    DuplicateModel {
        model: String,
        first: String,
        second: String,
    },

    #[error("model '{0}' declares no capabilities")]
    NoCapabilities(String),
}

/// A servable model and the adapter behind it.
#[derive(Clone)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub capabilities: Capabilities,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl std::fmt::Debug for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDescriptor")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

/// Immutable model table, built once at start-up.
#[derive(Debug)]
pub struct ProviderRegistry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl ProviderRegistry {
    /// Build the table from every adapter's declared models. A model id may
    /// belong to exactly one adapter and must declare a capability.
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Result<Self, RegistryError> {
        let mut models: BTreeMap<String, ModelDescriptor> = BTreeMap::new();
        for adapter in adapters {
            for spec in adapter.models() {
                if spec.capabilities.is_empty() {
                    return Err(RegistryError::NoCapabilities(spec.id));
                }
                if let Some(existing) = models.get(&spec.id) {
                    return Err(RegistryError::DuplicateModel {
                        model: spec.id,
                        first: existing.adapter.name().to_string(),
                        second: adapter.name().to_string(),
                    });
                }
                models.insert(
                    spec.id.clone(),
                    ModelDescriptor {
                        id: spec.id,
                        name: spec.name,
                        capabilities: spec.capabilities,
                        adapter: adapter.clone(),
                    },
                );
            }
        }
        Ok(Self { models })
    }

    /// Find the model and check it supports `required`.
    pub fn resolve(
        &self,
        model_id: &str,
        required: Capability,
    ) -> Result<&ModelDescriptor, ModelError> {
        let model = self
            .models
            .get(model_id)
            .ok_or_else(|| ModelError::UnknownModel(model_id.to_string()))?;
        if !model.capabilities.supports(required) {
            return Err(ModelError::CapabilityMismatch {
                model: model_id.to_string(),
                required,
            });
        }
        Ok(model)
    }

    /// All models, ordered by id.
    pub fn models(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{bedrock, googleai, MockAdapter, ModelSpec};

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(vec![
            Arc::new(MockAdapter::new(bedrock::catalogue())),
            Arc::new(MockAdapter::new(googleai::catalogue())),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve() {
        let reg = registry();
        assert_eq!(reg.models().count(), 5);
        let m = reg.resolve("claude_3_5_sonnet", Capability::Chat).unwrap();
        assert_eq!(m.id, "claude_3_5_sonnet");
        assert!(reg
            .resolve("text-embedding-004", Capability::Embedding)
            .is_ok());
    }

    #[test]
    fn test_unknown_model() {
        assert_eq!(
            registry().resolve("gpt-9", Capability::Chat).unwrap_err(),
            ModelError::UnknownModel("gpt-9".into())
        );
    }

    #[test]
    fn test_capability_mismatch() {
        let err = registry()
            .resolve("cohere_english_v3", Capability::Chat)
            .unwrap_err();
        assert!(matches!(err, ModelError::CapabilityMismatch { .. }));
        assert_eq!(err.to_string(), "model 'cohere_english_v3' does not support chat");
    }

    #[test]
    fn test_duplicate_model_rejected() {
        let err = ProviderRegistry::new(vec![
            Arc::new(MockAdapter::new(bedrock::catalogue())),
            Arc::new(MockAdapter::new(bedrock::catalogue())),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateModel { .. }));
    }

    #[test]
    fn test_empty_capabilities_rejected() {
        let err = ProviderRegistry::new(vec![Arc::new(MockAdapter::new(vec![ModelSpec::new(
            "nothing",
            "Nothing",
            Capabilities::default(),
            "",
        )]))])
        .unwrap_err();
        assert_eq!(err, RegistryError::NoCapabilities("nothing".into()));
    }
}
