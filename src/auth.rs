use crate::error::app_error::AppError;
use crate::service::activity::{ActivityMode, ActivityTracker, TrackResult};
use crate::service::token::TokenService;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// How the session cookie is written and cleared.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub name: String,
    pub secure: bool,
    pub max_age: Duration,
}

impl CookiePolicy {
    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.name.clone(), token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(rocket::time::Duration::seconds(self.max_age.as_secs() as i64))
            .build()
    }

    /// The presented session token. An empty cookie counts as no token.
    pub fn session_token<'a>(&self, cookies: &'a CookieJar<'_>) -> Option<&'a str> {
        cookies.get(&self.name).map(|cookie| cookie.value()).filter(|value| !value.is_empty())
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), "")).path("/").build()
    }
}

/// Username the activity gate saw on this request. Used for log context only.
#[derive(Debug, Clone)]
pub struct TrackedIdentity(pub String);

/// Activity gate that counts the request as activity.
///
/// Take it as `Result<SessionGate, AppError>` to decide what a rejection means
/// for the route.
#[derive(Debug, Clone)]
pub struct SessionGate {
    pub identity: Option<String>,
}

/// Activity gate that detects idle expiry without refreshing the session.
#[derive(Debug, Clone)]
pub struct PassiveSessionGate {
    pub identity: Option<String>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for SessionGate {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        run_gate(req, ActivityMode::Refresh).await.map(|identity| SessionGate { identity })
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PassiveSessionGate {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        run_gate(req, ActivityMode::Observe).await.map(|identity| PassiveSessionGate { identity })
    }
}

/// Finds who the request claims to be and checks their idle time.
///
/// The identity comes from an unverified decode, so the result never
/// authorizes anything on its own.
async fn run_gate(req: &Request<'_>, mode: ActivityMode) -> RequestOutcome<Option<String>, AppError> {
    let rocket = req.rocket();
    let (Some(policy), Some(tokens), Some(tracker)) = (
        rocket.state::<CookiePolicy>(),
        rocket.state::<TokenService>(),
        rocket.state::<Arc<ActivityTracker>>(),
    ) else {
        error!("activity gate is missing managed state");
        return Outcome::Error((Status::InternalServerError, AppError::MissingState));
    };

    let Some(token) = policy.session_token(req.cookies()) else {
        return Outcome::Success(None);
    };

    let Some(claims) = tokens.decode_unverified(token) else {
        warn!(method = %req.method(), uri = %req.uri(), "session cookie could not be decoded");
        return Outcome::Error((Status::Unauthorized, AppError::MalformedToken));
    };

    req.local_cache(|| Some(TrackedIdentity(claims.username.clone())));

    match tracker.touch(Some(&claims.username), mode).await {
        TrackResult::SessionExpired => Outcome::Error((Status::Unauthorized, AppError::SessionExpired)),
        TrackResult::Untracked | TrackResult::Started | TrackResult::Active { .. } => Outcome::Success(Some(claims.username)),
    }
}
