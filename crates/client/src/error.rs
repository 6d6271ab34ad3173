//! Error taxonomy of the REST Gateway.
//!
//! Every gateway call reports failure through [`GatewayError`]; nothing is
//! thrown into the caller's event loop, so each call site picks its own
//! user-facing message (usually [`GatewayError::user_message`]).

use crate::session::StorageError;

/// Why an authenticated call could not be authorized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// No access token is stored; the user never signed in.
    #[error("not signed in")]
    MissingToken,

    /// The backend rejected the credentials or token.
    #[error("credentials rejected{}", detail_suffix(.0))]
    Rejected(Option<String>),

    /// The access token expired and could not be refreshed.
    #[error("session expired and could not be refreshed")]
    RefreshFailed,
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail
        .as_deref()
        .map(|d| format!(": {d}"))
        .unwrap_or_default()
}

/// Errors from the REST Gateway layer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Transient connectivity failure (connect, DNS, TLS, timeout).
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// Token missing, expired or rejected.
    #[error("Authentication error: {0}")]
    Auth(AuthFailure),

    /// The backend answered with a failure or an unreadable body.
    #[error("Server error ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Server {
        /// HTTP status code (0 when the failure happened after the status line).
        status: u16,
        /// Backend-provided explanation, when there is one.
        detail: Option<String>,
    },

    /// A local file could not be read or written.
    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    /// Session tokens could not be persisted.
    #[error("Session storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Server {
                status: err.status().map_or(0, |s| s.as_u16()),
                detail: Some(format!("Invalid response body: {err}")),
            }
        } else {
            GatewayError::Network(err)
        }
    }
}

impl GatewayError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::Auth(AuthFailure::MissingToken) => "Please sign in first.".into(),
            GatewayError::Auth(AuthFailure::Rejected(Some(detail))) => detail.clone(),
            GatewayError::Auth(_) => "Your session has expired. Please sign in again.".into(),
            GatewayError::Network(_) => {
                "Unable to reach the server. Check your connection and try again.".into()
            }
            GatewayError::Server {
                detail: Some(detail),
                ..
            } => detail.clone(),
            GatewayError::Server { detail: None, .. } => {
                "Something went wrong. Please try again.".into()
            }
            GatewayError::File(e) => format!("Could not access the file: {e}"),
            GatewayError::Storage(e) => format!("Could not save your session: {e}"),
        }
    }

    /// Whether re-triggering the same action may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network(_) => true,
            GatewayError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, GatewayError::Auth(_))
    }
}

/// Pull a human-readable explanation out of an error body.
///
/// Understands `{"detail": "..."}`, `{"message": "..."}`, `{"error": "..."}`
/// and field-error maps such as `{"email": ["already registered"]}`.
pub(crate) fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;

    for key in ["detail", "message", "error"] {
        if let Some(text) = object.get(key).and_then(|v| v.as_str()) {
            return Some(text.to_string());
        }
    }

    let mut fields: Vec<String> = object
        .iter()
        .filter_map(|(field, messages)| {
            let first = match messages {
                serde_json::Value::Array(items) => items.first()?.as_str()?,
                serde_json::Value::String(s) => s.as_str(),
                _ => return None,
            };
            Some(format!("{field}: {first}"))
        })
        .collect();
    fields.sort();

    if fields.is_empty() {
        None
    } else {
        Some(fields.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_field() {
        assert_eq!(
            extract_detail(r#"{"detail":"Invalid video format"}"#).as_deref(),
            Some("Invalid video format")
        );
    }

    #[test]
    fn field_errors_are_joined() {
        let body = r#"{"password":["too short"],"email":["already registered"]}"#;
        assert_eq!(
            extract_detail(body).as_deref(),
            Some("email: already registered; password: too short")
        );
    }

    #[test]
    fn non_json_body_has_no_detail() {
        assert!(extract_detail("<html>502 Bad Gateway</html>").is_none());
        assert!(extract_detail("{}").is_none());
    }

    #[test]
    fn server_message_falls_back_to_generic() {
        let err = GatewayError::Server {
            status: 500,
            detail: None,
        };
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
        assert!(err.is_retryable());
    }

    #[test]
    fn server_detail_is_shown() {
        let err = GatewayError::Server {
            status: 400,
            detail: Some("File too large".into()),
        };
        assert_eq!(err.user_message(), "File too large");
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_messages() {
        assert_eq!(
            GatewayError::Auth(AuthFailure::RefreshFailed).user_message(),
            "Your session has expired. Please sign in again."
        );
        assert_eq!(
            GatewayError::Auth(AuthFailure::MissingToken).to_string(),
            "Authentication error: not signed in"
        );
        assert_eq!(
            AuthFailure::Rejected(Some("bad password".into())).to_string(),
            "credentials rejected: bad password"
        );
        assert!(GatewayError::Auth(AuthFailure::MissingToken).is_auth());
        assert!(!GatewayError::Auth(AuthFailure::MissingToken).is_retryable());
    }
}
