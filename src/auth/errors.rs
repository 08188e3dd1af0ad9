use std::fmt;

use thiserror::Error;

/// Why a presented key was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    NotFound,
    Inactive,
    Expired,
    InsufficientScope,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialReason::NotFound => "not_found",
            DenialReason::Inactive => "inactive",
            DenialReason::Expired => "expired",
            DenialReason::InsufficientScope => "insufficient_scope",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credential store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential lookup timed out")]
    Timeout,

    #[error("invalid key file: {0}")]
    InvalidKeyFile(String),
}

/// Authentication and authorization errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("access denied: {0}")]
    Denied(DenialReason),

    #[error(transparent)]
    Store(#[from] StoreError),
}
