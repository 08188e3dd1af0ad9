use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::warn;

use super::{Scope, StoreError};

/// Stored metadata for one API key. The raw key is never kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub key_id: String,
    pub owner: String,
    pub active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: BTreeSet<Scope>,
}

/// Read-only credential lookup.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the record for a presented key, or `None` if no such key exists.
    async fn find_by_key(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>, StoreError>;
}

/// Hex SHA-256 of a raw key, the form keys are indexed by.
pub fn hash_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

/// In-process credential store keyed by key hash.
#[derive(Default)]
pub struct InMemoryStore {
    keys: RwLock<HashMap<String, ApiKeyRecord>>,
}

#[derive(Deserialize)]
struct KeyFile {
    keys: Vec<KeyFileEntry>,
}

#[derive(Deserialize)]
struct KeyFileEntry {
    key_id: String,
    owner: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    key_sha256: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    scopes: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under the hash of `raw_key`.
    pub async fn insert(&self, raw_key: &str, record: ApiKeyRecord) {
        self.keys.write().await.insert(hash_key(raw_key), record);
    }

    pub async fn key_count(&self) -> usize {
        self.keys.read().await.len()
    }

    /// Parse a key file:
    ///
    /// ```json
    /// {"keys": [{"key_id": "k1", "owner": "acct_1", "key_sha256": "<hex>",
    ///            "active": true, "expires_at": null,
    ///            "scopes": ["models:inference"]}]}
    /// ```
    ///
    /// Each entry carries either `key` (raw) or `key_sha256`. Unknown scopes
    /// are logged and skipped.
    pub fn from_json(data: &str) -> Result<Self, StoreError> {
        let file: KeyFile =
            serde_json::from_str(data).map_err(|e| StoreError::InvalidKeyFile(e.to_string()))?;

        let mut keys = HashMap::with_capacity(file.keys.len());
        for entry in file.keys {
            let key_hash = match (entry.key_sha256, entry.key) {
                (Some(hash), _) => {
                    let hash = hash.trim().to_ascii_lowercase();
                    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(StoreError::InvalidKeyFile(format!(
                            "key {}: key_sha256 must be 64 hex characters",
                            entry.key_id
                        )));
                    }
                    hash
                }
                (None, Some(raw)) => hash_key(&raw),
                (None, None) => {
                    return Err(StoreError::InvalidKeyFile(format!(
                        "key {}: one of key or key_sha256 is required",
                        entry.key_id
                    )))
                }
            };

            let mut scopes = BTreeSet::new();
            for name in &entry.scopes {
                match name.parse::<Scope>() {
                    Ok(scope) => {
                        scopes.insert(scope);
                    }
                    Err(e) => warn!(key_id = %entry.key_id, error = %e, "ignoring scope"),
                }
            }

            keys.insert(
                key_hash,
                ApiKeyRecord {
                    key_id: entry.key_id,
                    owner: entry.owner,
                    active: entry.active,
                    expires_at: entry.expires_at,
                    scopes,
                },
            );
        }

        Ok(Self {
            keys: RwLock::new(keys),
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, StoreError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| StoreError::InvalidKeyFile(format!("{}: {e}", path.display())))?;
        Self::from_json(&data)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_by_key(&self, raw_key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        let hash = hash_key(raw_key);
        Ok(self.keys.read().await.get(&hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_key() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_key_file() {
        let data = format!(
            r#"{{"keys": [
                {{"key_id": "k1", "owner": "acct_1", "key": "sk-one", "scopes": ["models:inference", "models:admin"]}},
                {{"key_id": "k2", "owner": "acct_2", "key_sha256": "{}", "active": false,
                  "expires_at": "2030-01-01T00:00:00Z", "scopes": ["embedding"]}}
            ]}}"#,
            hash_key("sk-two").to_uppercase()
        );
        let store = InMemoryStore::from_json(&data).unwrap();
        assert_eq!(store.key_count().await, 2);

        let one = store.find_by_key("sk-one").await.unwrap().unwrap();
        assert!(one.active);
        assert_eq!(one.scopes, BTreeSet::from([Scope::Inference]));

        let two = store.find_by_key("sk-two").await.unwrap().unwrap();
        assert!(!two.active);
        assert!(two.expires_at.is_some());
        assert_eq!(two.scopes, BTreeSet::from([Scope::Embedding]));

        assert!(store.find_by_key("sk-three").await.unwrap().is_none());
    }

    #[test]
    fn test_key_file_requires_key() {
        let err = InMemoryStore::from_json(r#"{"keys": [{"key_id": "k1", "owner": "a"}]}"#)
            .err()
            .unwrap();
        assert!(err.to_string().contains("k1"));
    }
}
