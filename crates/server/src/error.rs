use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// OAuth-standard error body (RFC 6749 section 5.2).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Protocol-boundary failures of the authorization server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OAuthError {
    #[error("invalid_client: {0}")]
    InvalidClient(String),
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("invalid_scope: {0}")]
    InvalidScope(String),
    #[error("invalid_client_metadata: {0}")]
    InvalidClientMetadata(String),
    #[error("unsupported_response_type")]
    UnsupportedResponseType,
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    #[error("upstream_unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("server_error: {0}")]
    ServerError(String),
}

impl OAuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::InvalidClientMetadata(_) => "invalid_client_metadata",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UpstreamUnavailable(_) => "upstream_unavailable",
            OAuthError::ServerError(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient(_) => StatusCode::UNAUTHORIZED,
            OAuthError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OAuthError::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            OAuthError::InvalidClient(d)
            | OAuthError::InvalidGrant(d)
            | OAuthError::InvalidRequest(d)
            | OAuthError::InvalidScope(d)
            | OAuthError::InvalidClientMetadata(d)
            | OAuthError::UpstreamUnavailable(d)
            | OAuthError::ServerError(d) => Some(d.as_str()),
            OAuthError::UnsupportedResponseType => {
                Some("Only the 'code' response type is supported")
            }
            OAuthError::UnsupportedGrantType => {
                Some("Supported grant types: authorization_code, refresh_token")
            }
        }
    }

    pub fn to_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.description().map(String::from),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_body())).into_response()
    }
}

/// Failures talking to the third-party identity provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream OAuth client credentials are not configured")]
    NotConfigured,
    #[error("Unknown or expired upstream authorization state")]
    UnknownState,
    #[error("Upstream request timed out")]
    Timeout,
    #[error("Upstream transport error: {0}")]
    Transport(String),
    #[error("Upstream rejected the request with HTTP {status}")]
    Rejected { status: u16 },
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::InvalidResponse(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

impl From<UpstreamError> for OAuthError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::UnknownState => {
                OAuthError::InvalidGrant("Unknown or expired authorization state".into())
            }
            UpstreamError::Rejected { status } if (400..500).contains(&status) => {
                OAuthError::InvalidGrant("The identity provider rejected the grant".into())
            }
            UpstreamError::Timeout | UpstreamError::Transport(_) => {
                OAuthError::UpstreamUnavailable("The identity provider is unreachable".into())
            }
            UpstreamError::NotConfigured => {
                OAuthError::ServerError("Upstream OAuth is not configured".into())
            }
            UpstreamError::Rejected { .. } | UpstreamError::InvalidResponse(_) => {
                OAuthError::ServerError("The identity provider returned an error".into())
            }
        }
    }
}

/// Session Manager failures.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session {0} is not authenticated")]
    NotAuthenticated(String),
    #[error("Upstream credential for session {0} expired and cannot be refreshed")]
    TokenExpired(String),
    #[error("Refreshing the upstream credential failed: {0}")]
    RefreshFailed(OAuthError),
}

/// Failures returned by the external music API.
#[derive(Debug, Error)]
pub enum MusicApiError {
    #[error("Music API rejected the credential")]
    Unauthorized,
    #[error("Music API returned HTTP {status}: {context}")]
    Http { status: u16, context: String },
    #[error("Music API request timed out")]
    Timeout,
    #[error("Music API transport error: {0}")]
    Transport(String),
    #[error("Invalid music API response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for MusicApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MusicApiError::Timeout
        } else if err.is_decode() {
            MusicApiError::InvalidResponse(err.to_string())
        } else {
            MusicApiError::Transport(err.to_string())
        }
    }
}

/// Failures of a single tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    MusicApi(#[from] MusicApiError),
}

/// Failures building the process-wide resources at startup.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
