use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("Login state mismatch or expired; start the sign-in again")]
    InvalidState,

    #[error("Token endpoint returned {status}: {body}")]
    TokenExchange { status: u16, body: String },

    #[error("Invalid id_token: {0}")]
    InvalidToken(String),

    #[error("id_token carries no usable user identity")]
    MissingIdentity,

    #[error("Identity provider returned an error: {0}")]
    Provider(String),
}

impl PortalError {
    pub fn status(&self) -> StatusCode {
        match self {
            PortalError::Http(_)
            | PortalError::Discovery(_)
            | PortalError::TokenExchange { .. } => StatusCode::BAD_GATEWAY,
            PortalError::InvalidState
            | PortalError::InvalidToken(_)
            | PortalError::MissingIdentity
            | PortalError::Provider(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        tracing::warn!("portal request failed: {}", self);
        (self.status(), self.to_string()).into_response()
    }
}
