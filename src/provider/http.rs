use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use tracing::warn;
use url::Url;

use super::{ProviderError, ProviderErrorKind};

/// Longest vendor body excerpt written to logs.
const LOG_BODY_LIMIT: usize = 2048;

/// Buffered vendor response.
#[derive(Debug)]
pub struct VendorResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Build a vendor URL from a base URL and path segments.
///
/// Any path on the base URL is kept; each segment is percent-encoded, so
/// identifiers containing `/` (Bedrock ARNs) stay a single segment.
pub fn build_vendor_url(base_url: &str, segments: &[&str]) -> Result<String, String> {
    let mut parsed = Url::parse(base_url).map_err(|e| e.to_string())?;

    {
        let mut path = parsed
            .path_segments_mut()
            .map_err(|_| format!("base URL cannot have a path: {base_url}"))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    parsed.set_query(None);

    Ok(parsed.to_string())
}

/// Send a request and buffer the response. Transport failures become
/// `Timeout` or `Network`; HTTP status is left to the caller.
pub async fn execute(
    vendor: &str,
    request: reqwest::RequestBuilder,
) -> Result<VendorResponse, ProviderError> {
    let resp = request
        .send()
        .await
        .map_err(|e| transport_error(vendor, &e))?;

    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp
        .bytes()
        .await
        .map_err(|e| transport_error(vendor, &e))?
        .to_vec();

    Ok(VendorResponse {
        status,
        headers,
        body,
    })
}

fn transport_error(vendor: &str, e: &reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else {
        ProviderErrorKind::Network
    };
    warn!(vendor, error = %e, "vendor transport failure");
    ProviderError::new(kind, format!("{vendor} transport: {e}"))
}

/// Fallback classification from HTTP status alone.
pub fn status_kind(status: StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        408 | 504 => ProviderErrorKind::Timeout,
        429 => ProviderErrorKind::Quota,
        401 | 403 => ProviderErrorKind::VendorAuth,
        500..=599 => ProviderErrorKind::Unavailable,
        400..=499 => ProviderErrorKind::InvalidRequest,
        _ => ProviderErrorKind::MalformedResponse,
    }
}

/// Decode a successful vendor body.
pub fn decode_json<T: DeserializeOwned>(
    vendor: &str,
    resp: &VendorResponse,
) -> Result<T, ProviderError> {
    serde_json::from_slice(&resp.body).map_err(|e| {
        warn!(
            vendor,
            error = %e,
            body = %body_excerpt(&resp.body),
            "vendor response did not match expected shape"
        );
        ProviderError::malformed(format!("{vendor} response: {e}"))
    })
}

/// Log a failed vendor response and build the error returned to the pipeline.
pub fn vendor_failure(
    vendor: &str,
    resp: &VendorResponse,
    kind: ProviderErrorKind,
    vendor_code: &str,
) -> ProviderError {
    warn!(
        vendor,
        status = resp.status.as_u16(),
        vendor_code,
        kind = %kind,
        body = %body_excerpt(&resp.body),
        "vendor call failed"
    );
    ProviderError::new(
        kind,
        format!("{vendor} returned {} ({vendor_code})", resp.status.as_u16()),
    )
}

/// Lossy, truncated body text for logs.
pub fn body_excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= LOG_BODY_LIMIT {
        return text.into_owned();
    }
    let mut end = LOG_BODY_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_segments() {
        let got = build_vendor_url(
            "https://generativelanguage.googleapis.com",
            &["v1beta", "models", "gemini-1.5-pro:generateContent"],
        )
        .unwrap();
        assert_eq!(
            got,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_keeps_base_path() {
        let got = build_vendor_url("https://proxy.example.com/api/", &["model", "x", "converse"])
            .unwrap();
        assert_eq!(got, "https://proxy.example.com/api/model/x/converse");
    }

    #[test]
    fn test_encodes_arn_slashes() {
        let got = build_vendor_url(
            "https://bedrock-runtime.us-east-1.amazonaws.com",
            &[
                "model",
                "arn:aws:bedrock:us-east-1:123:inference-profile/us.anthropic.claude",
                "converse",
            ],
        )
        .unwrap();
        assert!(got.contains("inference-profile%2Fus.anthropic.claude/converse"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(build_vendor_url("://bad", &["x"]).is_err());
    }

    #[test]
    fn test_status_kind() {
        assert_eq!(status_kind(StatusCode::TOO_MANY_REQUESTS), ProviderErrorKind::Quota);
        assert_eq!(status_kind(StatusCode::GATEWAY_TIMEOUT), ProviderErrorKind::Timeout);
        assert_eq!(status_kind(StatusCode::BAD_GATEWAY), ProviderErrorKind::Unavailable);
        assert_eq!(status_kind(StatusCode::FORBIDDEN), ProviderErrorKind::VendorAuth);
        assert_eq!(status_kind(StatusCode::BAD_REQUEST), ProviderErrorKind::InvalidRequest);
    }

    #[test]
    fn test_body_excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(LOG_BODY_LIMIT);
        let excerpt = body_excerpt(body.as_bytes());
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.len() <= LOG_BODY_LIMIT + 3);
    }
}
