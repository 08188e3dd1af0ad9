use std::fmt;

use thiserror::Error;

/// Vendor-neutral failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The vendor call did not complete in time.
    Timeout,
    /// Connection-level failure before a response arrived.
    Network,
    /// Vendor-side 5xx or overload.
    Unavailable,
    /// Our credentials were rejected by the vendor.
    VendorAuth,
    /// Vendor quota or rate limit exhausted.
    Quota,
    /// Request or output blocked by vendor safety policy.
    ContentPolicy,
    /// Vendor rejected the request as invalid.
    InvalidRequest,
    /// Vendor response could not be understood.
    MalformedResponse,
}

impl ProviderErrorKind {
    /// Timeouts and vendor-side transient failures are worth another attempt.
    pub fn is_retriable(self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Timeout | ProviderErrorKind::Network | ProviderErrorKind::Unavailable
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Network => "network",
            ProviderErrorKind::Unavailable => "unavailable",
            ProviderErrorKind::VendorAuth => "vendor_auth",
            ProviderErrorKind::Quota => "quota",
            ProviderErrorKind::ContentPolicy => "content_policy",
            ProviderErrorKind::InvalidRequest => "invalid_request",
            ProviderErrorKind::MalformedResponse => "malformed_response",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "timeout" => ProviderErrorKind::Timeout,
            "network" => ProviderErrorKind::Network,
            "unavailable" => ProviderErrorKind::Unavailable,
            "vendor_auth" => ProviderErrorKind::VendorAuth,
            "quota" => ProviderErrorKind::Quota,
            "content_policy" => ProviderErrorKind::ContentPolicy,
            "invalid_request" => ProviderErrorKind::InvalidRequest,
            "malformed_response" => ProviderErrorKind::MalformedResponse,
            _ => return None,
        })
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vendor failure normalized by an adapter. `detail` is for logs only.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub detail: String,
    pub retriable: bool,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            retriable: kind.is_retriable(),
        }
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::MalformedResponse, detail)
    }
}
