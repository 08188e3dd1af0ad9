use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{ApiKeyRecord, AuthError, CredentialStore, DenialReason, Scope, StoreError};

/// Identity of an authorized caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub owner: String,
    pub key_id: String,
}

/// Outcome of checking a presented key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized(Principal),
    Denied(DenialReason),
}

/// Apply the key checks in order: found, active, unexpired, then scope
/// (when one is required). The first failing check decides.
pub fn decide(
    record: Option<&ApiKeyRecord>,
    required: Option<Scope>,
    now: DateTime<Utc>,
) -> AuthDecision {
    let Some(record) = record else {
        return AuthDecision::Denied(DenialReason::NotFound);
    };
    if !record.active {
        return AuthDecision::Denied(DenialReason::Inactive);
    }
    if record.expires_at.is_some_and(|exp| exp <= now) {
        return AuthDecision::Denied(DenialReason::Expired);
    }
    if let Some(scope) = required {
        if !record.scopes.contains(&scope) {
            return AuthDecision::Denied(DenialReason::InsufficientScope);
        }
    }
    AuthDecision::Authorized(Principal {
        owner: record.owner.clone(),
        key_id: record.key_id.clone(),
    })
}

/// Validates presented API keys against the credential store.
pub struct Gatekeeper {
    store: Arc<dyn CredentialStore>,
    lookup_timeout: Duration,
}

impl Gatekeeper {
    pub fn new(store: Arc<dyn CredentialStore>, lookup_timeout: Duration) -> Self {
        Self {
            store,
            lookup_timeout,
        }
    }

    /// Check a key and the scope required by the endpoint.
    pub async fn authorize(
        &self,
        presented_key: Option<&str>,
        required: Scope,
    ) -> Result<AuthDecision, StoreError> {
        self.check(presented_key, Some(required)).await
    }

    /// Check a key without requiring any scope.
    pub async fn authenticate(
        &self,
        presented_key: Option<&str>,
    ) -> Result<AuthDecision, StoreError> {
        self.check(presented_key, None).await
    }

    /// Like [`Gatekeeper::authorize`] / [`Gatekeeper::authenticate`], with
    /// denials turned into errors.
    pub async fn require(
        &self,
        presented_key: Option<&str>,
        required: Option<Scope>,
    ) -> Result<Principal, AuthError> {
        let decision = match required {
            Some(scope) => self.authorize(presented_key, scope).await?,
            None => self.authenticate(presented_key).await?,
        };
        match decision {
            AuthDecision::Authorized(principal) => Ok(principal),
            AuthDecision::Denied(reason) => Err(AuthError::Denied(reason)),
        }
    }

    async fn check(
        &self,
        presented_key: Option<&str>,
        required: Option<Scope>,
    ) -> Result<AuthDecision, StoreError> {
        let record = match presented_key.filter(|k| !k.is_empty()) {
            Some(key) => self.lookup(key).await?,
            None => None,
        };

        let decision = decide(record.as_ref(), required, Utc::now());
        if let AuthDecision::Denied(reason) = &decision {
            info!(
                reason = %reason,
                owner = record.as_ref().map(|r| r.owner.as_str()).unwrap_or(""),
                required_scope = required.map(Scope::as_str).unwrap_or(""),
                "request denied"
            );
        }
        Ok(decision)
    }

    async fn lookup(&self, key: &str) -> Result<Option<ApiKeyRecord>, StoreError> {
        match tokio::time::timeout(self.lookup_timeout, self.store.find_by_key(key)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "credential lookup timed out"
                );
                Err(StoreError::Timeout)
            }
        }
    }
}
