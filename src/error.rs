//! Maps every pipeline failure onto the public error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::{AuthError, DenialReason};
use crate::normalize::ValidationError;
use crate::protocol::{ErrorBody, ErrorResponse, FieldDetail};
use crate::provider::{ProviderError, ProviderErrorKind};
use crate::registry::ModelError;

/// Public error taxonomy. The code is what callers see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    ForbiddenInactive,
    ForbiddenExpired,
    ForbiddenScope,
    ValidationError,
    UnknownModel,
    CapabilityMismatch,
    ProviderErrorRetriable,
    ProviderErrorFatal,
    InternalError,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::ForbiddenInactive => "forbidden_inactive",
            ErrorKind::ForbiddenExpired => "forbidden_expired",
            ErrorKind::ForbiddenScope => "forbidden_scope",
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::UnknownModel => "unknown_model",
            ErrorKind::CapabilityMismatch => "capability_mismatch",
            ErrorKind::ProviderErrorRetriable => "provider_error_retriable",
            ErrorKind::ProviderErrorFatal => "provider_error_fatal",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Auth(AuthError::Denied(reason)) => match reason {
                DenialReason::NotFound => ErrorKind::Unauthenticated,
                DenialReason::Inactive => ErrorKind::ForbiddenInactive,
                DenialReason::Expired => ErrorKind::ForbiddenExpired,
                DenialReason::InsufficientScope => ErrorKind::ForbiddenScope,
            },
            GatewayError::Auth(AuthError::Store(_)) => ErrorKind::InternalError,
            GatewayError::Validation(_) => ErrorKind::ValidationError,
            GatewayError::Model(ModelError::UnknownModel(_)) => ErrorKind::UnknownModel,
            GatewayError::Model(ModelError::CapabilityMismatch { .. }) => {
                ErrorKind::CapabilityMismatch
            }
            GatewayError::Provider(e) if e.retriable => ErrorKind::ProviderErrorRetriable,
            GatewayError::Provider(_) => ErrorKind::ProviderErrorFatal,
            GatewayError::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Provider(e) => provider_status(e.kind),
            _ => match self.kind() {
                ErrorKind::Unauthenticated
                | ErrorKind::ForbiddenInactive
                | ErrorKind::ForbiddenExpired => StatusCode::UNAUTHORIZED,
                ErrorKind::ForbiddenScope => StatusCode::FORBIDDEN,
                ErrorKind::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::UnknownModel => StatusCode::NOT_FOUND,
                ErrorKind::CapabilityMismatch => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Caller-facing message. Vendor and store detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            GatewayError::Auth(AuthError::Denied(reason)) => match reason {
                DenialReason::NotFound => "missing or unknown API key",
                DenialReason::Inactive => "API key is inactive",
                DenialReason::Expired => "API key has expired",
                DenialReason::InsufficientScope => "API key lacks the scope this endpoint requires",
            }
            .to_string(),
            GatewayError::Validation(_) => "request validation failed".to_string(),
            GatewayError::Model(e) => e.to_string(),
            GatewayError::Provider(e) => provider_message(e.kind).to_string(),
            GatewayError::Auth(AuthError::Store(_)) | GatewayError::Internal(_) => {
                "internal error".to_string()
            }
        }
    }
}

fn provider_status(kind: ProviderErrorKind) -> StatusCode {
    match kind {
        ProviderErrorKind::Timeout | ProviderErrorKind::Unavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ProviderErrorKind::Network => StatusCode::BAD_GATEWAY,
        ProviderErrorKind::InvalidRequest | ProviderErrorKind::ContentPolicy => {
            StatusCode::BAD_REQUEST
        }
        ProviderErrorKind::Quota
        | ProviderErrorKind::VendorAuth
        | ProviderErrorKind::MalformedResponse => StatusCode::BAD_GATEWAY,
    }
}

fn provider_message(kind: ProviderErrorKind) -> &'static str {
    match kind {
        ProviderErrorKind::Timeout => "the model provider did not respond in time",
        ProviderErrorKind::Network => "the model provider could not be reached",
        ProviderErrorKind::Unavailable => "the model provider is temporarily unavailable",
        ProviderErrorKind::VendorAuth => "the gateway could not authenticate with the model provider",
        ProviderErrorKind::Quota => "the model provider's capacity is exhausted",
        ProviderErrorKind::ContentPolicy => "the request was blocked by the provider's content policy",
        ProviderErrorKind::InvalidRequest => "the model provider rejected the request",
        ProviderErrorKind::MalformedResponse => "the model provider returned an unreadable response",
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            GatewayError::Provider(e) => warn!(
                code = self.code(),
                provider_kind = %e.kind,
                detail = %e.detail,
                "provider call failed"
            ),
            GatewayError::Auth(AuthError::Store(e)) => error!(error = %e, "credential store failure"),
            GatewayError::Internal(msg) => error!(error = %msg, "internal error"),
            _ => {}
        }

        let details = match &self {
            GatewayError::Validation(v) => v
                .errors
                .iter()
                .map(|e| FieldDetail {
                    field: e.field.clone(),
                    constraint: e.constraint.clone(),
                })
                .collect(),
            _ => Vec::new(),
        };

        (
            status,
            Json(ErrorResponse {
                error: ErrorBody {
                    code: self.code(),
                    message: self.public_message(),
                    details,
                },
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StoreError;
    use crate::provider::Capability;

    #[test]
    fn test_denials() {
        let cases = [
            (DenialReason::NotFound, StatusCode::UNAUTHORIZED, "unauthenticated"),
            (DenialReason::Inactive, StatusCode::UNAUTHORIZED, "forbidden_inactive"),
            (DenialReason::Expired, StatusCode::UNAUTHORIZED, "forbidden_expired"),
            (DenialReason::InsufficientScope, StatusCode::FORBIDDEN, "forbidden_scope"),
        ];
        for (reason, status, code) in cases {
            let err = GatewayError::from(AuthError::Denied(reason));
            assert_eq!(err.status(), status);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_provider_split() {
        let retriable = GatewayError::from(ProviderError::new(ProviderErrorKind::Unavailable, "x"));
        assert_eq!(retriable.code(), "provider_error_retriable");
        assert_eq!(retriable.status(), StatusCode::SERVICE_UNAVAILABLE);

        let rejected = GatewayError::from(ProviderError::invalid_request("x"));
        assert_eq!(rejected.code(), "provider_error_fatal");
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

        let quota = GatewayError::from(ProviderError::new(ProviderErrorKind::Quota, "x"));
        assert_eq!(quota.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_model_errors() {
        let unknown = GatewayError::from(ModelError::UnknownModel("m".into()));
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        let mismatch = GatewayError::from(ModelError::CapabilityMismatch {
            model: "m".into(),
            required: Capability::Chat,
        });
        assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(mismatch.code(), "capability_mismatch");
    }

    #[test]
    fn test_store_failure_is_internal() {
        let err = GatewayError::from(AuthError::Store(StoreError::Timeout));
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.public_message(), "internal error");
    }

    #[tokio::test]
    async fn test_body_hides_vendor_detail() {
        let err = GatewayError::from(ProviderError::new(
            ProviderErrorKind::ContentPolicy,
            "vendor says: secret internal trace",
        ));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains("provider_error_fatal"));
    }

    #[tokio::test]
    async fn test_validation_details() {
        let err = GatewayError::from(ValidationError::single("messages", "must not be empty"));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "validation_error");
        assert_eq!(body["error"]["details"][0]["field"], "messages");
        assert_eq!(body["error"]["details"][0]["constraint"], "must not be empty");
    }
}
