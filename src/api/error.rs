//! Error taxonomy for remote store calls.
//!
//! Every failure is either connectivity-class (transient, absorbed into the
//! offline queue) or domain-class (surfaced to the caller untouched).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Network unavailable, DNS failure, timeout, or a gateway that could not
    /// reach the backend.
    #[error("Remote store unreachable: {0}")]
    Connectivity(String),
    #[error("Rejected by remote store: {0}")]
    Validation(String),
    #[error("Permission denied: {0}")]
    Permission(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Record already exists: {0}")]
    AlreadyExists(String),
    #[error("Unexpected remote store response: {0}")]
    Unexpected(String),
}

impl RemoteError {
    /// Whether this failure should be deferred to the queue rather than
    /// reported to the user.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RemoteError::Connectivity(_))
    }

    /// Map a non-success HTTP status onto the taxonomy.
    pub fn from_status(status: u16, body: String) -> Self {
        let detail = if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            format!("HTTP {}: {}", status, body)
        };
        match status {
            400 | 422 => RemoteError::Validation(detail),
            401 | 403 => RemoteError::Permission(detail),
            404 => RemoteError::NotFound(detail),
            409 => RemoteError::AlreadyExists(detail),
            408 | 429 | 502 | 503 | 504 => RemoteError::Connectivity(detail),
            _ => RemoteError::Unexpected(detail),
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_connect() || err.is_timeout() || is_network_error(&message) {
            RemoteError::Connectivity(message)
        } else {
            RemoteError::Unexpected(message)
        }
    }
}

/// Flatten an error and its sources into one line. reqwest keeps the useful
/// part ("dns error", "connection refused") in the source chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Heuristic check for network-level errors vs application errors.
pub fn is_network_error(error: &str) -> bool {
    let network_patterns = [
        "dns error",
        "connect error",
        "connection refused",
        "connection reset",
        "network unreachable",
        "timed out",
        "timeout",
        "no route to host",
        "network is down",
        "couldn't resolve host",
        "failed to lookup address",
    ];
    let lower = error.to_lowercase();
    network_patterns.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            RemoteError::from_status(400, "bad amount".into()),
            RemoteError::Validation(_)
        ));
        assert!(matches!(
            RemoteError::from_status(422, String::new()),
            RemoteError::Validation(_)
        ));
        assert!(matches!(
            RemoteError::from_status(401, String::new()),
            RemoteError::Permission(_)
        ));
        assert!(matches!(
            RemoteError::from_status(403, String::new()),
            RemoteError::Permission(_)
        ));
        assert!(matches!(
            RemoteError::from_status(404, String::new()),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            RemoteError::from_status(409, String::new()),
            RemoteError::AlreadyExists(_)
        ));
        assert!(matches!(
            RemoteError::from_status(500, String::new()),
            RemoteError::Unexpected(_)
        ));
    }

    #[test]
    fn test_gateway_statuses_are_connectivity() {
        for status in [408, 429, 502, 503, 504] {
            assert!(
                RemoteError::from_status(status, String::new()).is_connectivity(),
                "HTTP {} should be connectivity-class",
                status
            );
        }
    }

    #[test]
    fn test_status_detail_includes_body() {
        let err = RemoteError::from_status(400, "amount must be positive".into());
        assert_eq!(
            err.to_string(),
            "Rejected by remote store: HTTP 400: amount must be positive"
        );
    }

    #[test]
    fn test_is_network_error() {
        assert!(is_network_error("error sending request: dns error: no record"));
        assert!(is_network_error("Connection refused (os error 111)"));
        assert!(is_network_error("operation timed out"));
        assert!(!is_network_error("HTTP 403: Forbidden"));
        assert!(!is_network_error("amount must be positive"));
    }

    #[test]
    fn test_only_connectivity_is_connectivity() {
        assert!(RemoteError::Connectivity("x".into()).is_connectivity());
        assert!(!RemoteError::Validation("x".into()).is_connectivity());
        assert!(!RemoteError::Permission("x".into()).is_connectivity());
        assert!(!RemoteError::AlreadyExists("x".into()).is_connectivity());
    }
}
