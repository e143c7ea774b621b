use rocket::serde::{Deserialize, Serialize};
use validator::Validate;

/// Claims carried inside a session token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Deserialize, Debug, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 128))]
    pub username: String,
    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub username: String,
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProtectedResponse {
    pub message: String,
    pub user: Claims,
    /// Unix epoch milliseconds of the last tracked request, if the session is tracked.
    pub last_activity: Option<i64>,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub is_active: bool,
    /// Milliseconds left before the session idles out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<u64>,
}

impl SessionStatusResponse {
    pub fn inactive() -> Self {
        Self {
            is_active: false,
            remaining_time: None,
        }
    }
}
