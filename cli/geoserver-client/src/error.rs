//! Error handling for GeoServer REST operations.

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Maximum number of body bytes kept on an error.
/// GeoServer likes to answer with full HTML error pages.
const MAX_ERROR_BODY: usize = 512;

/// Common error type for GeoServer REST operations.
#[derive(Debug, Error)]
pub enum GeoserverClientError {
    #[error("invalid GeoServer URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid header '{0}'")]
    InvalidHeader(String),
    #[error("could not build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("{method} {url} failed")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} {url} returned {status}{}", fmt_body(.body))]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("could not decode response of {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode request body")]
    Encode(#[source] serde_json::Error),
}

impl GeoserverClientError {
    /// The HTTP status of the response that caused this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GeoserverClientError::Status { status, .. } => Some(*status),
            GeoserverClientError::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

fn fmt_body(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return String::new();
    }
    format!(": {body}")
}

/// Extension trait for turning raw reqwest results into client errors.
pub trait MapResponseErrorExt {
    /// Maps transport errors and non-success statuses into
    /// [GeoserverClientError], keeping (a truncated copy of) the body
    /// of error responses.
    fn map_response_error(
        self,
        method: &Method,
        url: &str,
    ) -> impl std::future::Future<Output = Result<reqwest::Response, GeoserverClientError>> + Send;
}

impl MapResponseErrorExt for Result<reqwest::Response, reqwest::Error> {
    async fn map_response_error(
        self,
        method: &Method,
        url: &str,
    ) -> Result<reqwest::Response, GeoserverClientError> {
        let response = self.map_err(|source| GeoserverClientError::Transport {
            method: method.clone(),
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        // The body is informative only, failing to read it is not an error in itself.
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut end = MAX_ERROR_BODY;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            body.truncate(end);
            body.push_str("...");
        }

        Err(GeoserverClientError::Status {
            method: method.clone(),
            url: url.to_string(),
            status,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_exposes_status() {
        let err = GeoserverClientError::Status {
            method: Method::DELETE,
            url: "http://localhost/rest/workspaces/ws/styles/s".to_string(),
            status: StatusCode::NOT_FOUND,
            body: "No such style".to_string(),
        };
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "DELETE http://localhost/rest/workspaces/ws/styles/s returned 404 Not Found: No such style"
        );
    }

    #[test]
    fn encode_error_has_no_status() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = GeoserverClientError::Encode(source);
        assert_eq!(err.status(), None);
        assert!(!err.is_not_found());
    }
}
