use crate::service::token::TokenError;
use rocket::http::{ContentType, Cookie, Status};
use rocket::response::Responder;
use rocket::{Request, Response};
use std::io::Cursor;
use thiserror::Error;
use tracing::{error, warn};
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No token provided")]
    MissingToken,
    /// The token could not even be decoded to find an identity.
    #[error("Invalid token")]
    MalformedToken,
    /// The token decoded but failed signature or expiry checks.
    #[error("Invalid token")]
    Token(#[from] TokenError),
    #[error("Session expired due to inactivity")]
    SessionExpired,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Internal server error")]
    MissingState,
    #[error("Internal server error")]
    TokenIssue {
        #[source]
        source: jsonwebtoken::errors::Error,
    },
}

impl AppError {
    /// Rejections after which the client's session cookie is useless.
    fn clears_session_cookie(&self) -> bool {
        matches!(self, AppError::SessionExpired | AppError::MalformedToken)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(source: jsonwebtoken::errors::Error) -> Self {
        AppError::TokenIssue { source }
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::MissingToken => Status::Unauthorized,
            AppError::MalformedToken => Status::Unauthorized,
            AppError::Token(_) => Status::Forbidden,
            AppError::SessionExpired => Status::Unauthorized,
            AppError::InvalidCredentials => Status::Unauthorized,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::MissingState => Status::InternalServerError,
            AppError::TokenIssue { .. } => Status::InternalServerError,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let username = req
            .local_cache(|| None::<crate::auth::TrackedIdentity>)
            .as_ref()
            .map(|identity| identity.0.clone())
            .unwrap_or_else(|| "anonymous".to_string());

        let status = Status::from(&self);
        if status.class().is_server_error() {
            error!(
                error = ?self,
                request_id = %request_id,
                username = %username,
                method = %method,
                uri = %uri,
                "request failed"
            );
        } else {
            warn!(
                error = ?self,
                request_id = %request_id,
                username = %username,
                method = %method,
                uri = %uri,
                "request rejected"
            );
        }

        if self.clears_session_cookie() {
            let cookie_name = req
                .rocket()
                .state::<crate::auth::CookiePolicy>()
                .map(|policy| policy.name.clone())
                .unwrap_or_else(|| crate::config::DEFAULT_COOKIE_NAME.to_string());
            req.cookies().remove(Cookie::build((cookie_name, "")).path("/"));
        }

        let body = serde_json::json!({ "message": self.to_string() }).to_string();

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
