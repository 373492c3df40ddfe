//! Integration error type.

/// Machine-readable codes that mean the access token was rejected.
const UNAUTHORIZED_CODES: [&str; 2] = ["unauthorized", "token_expired"];

/// Code attached to the error returned when credentials can't be
/// recovered and the user has to reconnect the integration.
pub const RECONNECT_REQUIRED_CODE: &str = "reconnect_required";

/// A failed call to an external integration (issue tracker, token
/// endpoint).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct IntegrationError {
    pub message: String,
    /// HTTP status, when the failure came from a response.
    pub status: Option<u16>,
    /// Machine-readable code from the response body, if any.
    pub code: Option<String>,
}

impl IntegrationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            code: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// A 401 with the given message.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message).with_status(401)
    }

    /// Returns `true` if the integration rejected the access token.
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(401)
            || self
                .code
                .as_deref()
                .is_some_and(|code| UNAUTHORIZED_CODES.contains(&code))
    }

    /// Returns `true` if this is the "reconnect your account" error.
    pub fn requires_reconnect(&self) -> bool {
        self.code.as_deref() == Some(RECONNECT_REQUIRED_CODE)
    }
}

impl From<reqwest::Error> for IntegrationError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
            code: None,
        }
    }
}
