use std::collections::BTreeSet;

use chrono::{Duration, Utc};

use super::{ApiKeyRecord, InMemoryStore, Scope};

const DEV_OWNER: &str = "dev-user";

/// Dev mode helper: mints an ephemeral all-scope key into the store.
pub struct DevMode {
    key: String,
    key_id: String,
}

impl DevMode {
    /// Mint a fresh random key.
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            key: format!("dev_{id}"),
            key_id: format!("dev-{}", &id[..8]),
        }
    }

    /// The raw key to hand to clients.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Register the key, valid for 24 hours with every scope.
    pub async fn install(&self, store: &InMemoryStore) {
        store
            .insert(
                &self.key,
                ApiKeyRecord {
                    key_id: self.key_id.clone(),
                    owner: DEV_OWNER.into(),
                    active: true,
                    expires_at: Some(Utc::now() + Duration::hours(24)),
                    scopes: Scope::ALL.into_iter().collect::<BTreeSet<_>>(),
                },
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthDecision, Gatekeeper};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_devmode_roundtrip() {
        let store = Arc::new(InMemoryStore::new());
        let dev = DevMode::generate();
        dev.install(&store).await;
        assert!(dev.key().starts_with("dev_"));

        let gate = Gatekeeper::new(store, std::time::Duration::from_secs(1));
        for scope in Scope::ALL {
            let decision = gate.authorize(Some(dev.key()), scope).await.unwrap();
            match decision {
                AuthDecision::Authorized(p) => assert_eq!(p.owner, DEV_OWNER),
                other => panic!("expected authorized, got {other:?}"),
            }
        }
    }
}
