use rocket::data::{ByteUnit, Data, FromData, Outcome, ToByteUnit};
use rocket::http::Status;
use rocket::request::Request;
use serde::de::DeserializeOwned;
use std::ops::Deref;
use thiserror::Error;
use tracing::warn;

/// JSON request body that logs why parsing failed.
///
/// Bodies on this gateway carry passwords, so only the error position and
/// category are logged, never the payload itself.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T> Deref for JsonBody<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum JsonBodyError {
    #[error("payload too large")]
    TooLarge,
    #[error("failed to read request body: {0}")]
    Io(#[source] std::io::Error),
    #[error("invalid JSON: {0}")]
    Parse(#[source] serde_json::Error),
}

fn body_limit(req: &Request<'_>) -> ByteUnit {
    req.limits().get("json").unwrap_or_else(|| 64.kibibytes())
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned> FromData<'r> for JsonBody<T> {
    type Error = JsonBodyError;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> Outcome<'r, Self> {
        let bytes = match data.open(body_limit(req)).into_bytes().await {
            Ok(bytes) if bytes.is_complete() => bytes.into_inner(),
            Ok(_) => {
                warn!(method = %req.method(), uri = %req.uri(), "JSON payload exceeded size limit");
                return Outcome::Error((Status::PayloadTooLarge, JsonBodyError::TooLarge));
            }
            Err(e) => {
                warn!(method = %req.method(), uri = %req.uri(), error = %e, "Failed to read request body");
                return Outcome::Error((Status::BadRequest, JsonBodyError::Io(e)));
            }
        };

        match serde_json::from_slice::<T>(&bytes) {
            Ok(value) => Outcome::Success(JsonBody(value)),
            Err(e) => {
                warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    error_line = e.line(),
                    error_column = e.column(),
                    error_category = ?e.classify(),
                    "Failed to parse JSON request body"
                );
                Outcome::Error((Status::UnprocessableEntity, JsonBodyError::Parse(e)))
            }
        }
    }
}
