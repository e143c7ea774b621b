use crate::auth::{CookiePolicy, PassiveSessionGate, SessionGate};
use crate::error::app_error::AppError;
use crate::error::json::JsonBody;
use crate::models::session::{LoginRequest, LoginResponse, MessageResponse, ProtectedResponse, SessionStatusResponse};
use crate::service::activity::ActivityTracker;
use crate::service::credentials::CredentialVerifier;
use crate::service::token::TokenService;
use rocket::http::{CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{State, routes};
use std::sync::Arc;
use tracing::{debug, info, warn};
use validator::Validate;

#[rocket::post("/login", data = "<payload>")]
pub async fn login(
    gate: Result<SessionGate, AppError>,
    tokens: &State<TokenService>,
    tracker: &State<Arc<ActivityTracker>>,
    verifier: &State<Arc<dyn CredentialVerifier>>,
    policy: &State<CookiePolicy>,
    cookies: &CookieJar<'_>,
    payload: JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    gate?;
    payload.validate()?;

    if !verifier.verify(&payload.username, &payload.password).await {
        return Err(AppError::InvalidCredentials);
    }

    let token = tokens.issue(&payload.username)?;
    cookies.add(policy.session_cookie(token));
    tracker.start(&payload.username).await;

    info!(username = %payload.username, "login succeeded");
    Ok(Json(LoginResponse {
        message: "Login successful".to_string(),
        username: payload.username.clone(),
    }))
}

#[rocket::get("/protected")]
pub async fn protected(
    gate: Result<SessionGate, AppError>,
    tokens: &State<TokenService>,
    tracker: &State<Arc<ActivityTracker>>,
    policy: &State<CookiePolicy>,
    cookies: &CookieJar<'_>,
) -> Result<Json<ProtectedResponse>, AppError> {
    gate?;

    let token = policy.session_token(cookies).ok_or(AppError::MissingToken)?;
    let claims = tokens.verify(token)?;
    let last_activity = tracker.last_activity(&claims.username).await.map(|at| at.timestamp_millis());

    Ok(Json(ProtectedResponse {
        message: "Protected content".to_string(),
        user: claims,
        last_activity,
    }))
}

/// Always succeeds. Stale, forged and idle tokens still end their tracked session.
#[rocket::post("/logout")]
pub async fn logout(
    gate: Result<SessionGate, AppError>,
    tokens: &State<TokenService>,
    tracker: &State<Arc<ActivityTracker>>,
    policy: &State<CookiePolicy>,
    cookies: &CookieJar<'_>,
) -> Json<MessageResponse> {
    if let Err(err) = gate {
        debug!(reason = %err, "activity gate rejected logout request; logging out anyway");
    }

    if let Some(token) = policy.session_token(cookies)
        && let Some(claims) = tokens.decode_unverified(token)
    {
        tracker.end(&claims.username).await;
        info!(username = %claims.username, "logout");
    }

    cookies.remove(policy.removal_cookie());
    Json(MessageResponse::new("Logged out successfully"))
}

#[rocket::get("/session-status")]
pub async fn session_status(
    gate: Result<PassiveSessionGate, AppError>,
    tokens: &State<TokenService>,
    tracker: &State<Arc<ActivityTracker>>,
    policy: &State<CookiePolicy>,
    cookies: &CookieJar<'_>,
) -> Result<(Status, Json<SessionStatusResponse>), AppError> {
    gate?;

    let Some(token) = policy.session_token(cookies) else {
        return Ok((Status::Unauthorized, Json(SessionStatusResponse::inactive())));
    };

    let claims = match tokens.verify(token) {
        Ok(claims) => claims,
        Err(err) => {
            warn!(reason = %err, "session status requested with unverifiable token");
            return Ok((Status::Unauthorized, Json(SessionStatusResponse::inactive())));
        }
    };

    match tracker.status(&claims.username).await {
        Some(status) => Ok((
            Status::Ok,
            Json(SessionStatusResponse {
                is_active: status.is_active,
                remaining_time: Some(status.remaining.as_millis() as u64),
            }),
        )),
        None => Ok((Status::Unauthorized, Json(SessionStatusResponse::inactive()))),
    }
}

pub fn routes() -> Vec<rocket::Route> {
    routes![login, protected, logout, session_status]
}

#[cfg(test)]
mod tests {
    use crate::service::activity::ActivityTracker;
    use crate::service::token::TokenService;
    use crate::test_utils::{MockCredentials, TEST_SECRET, test_config, test_config_with_timeout_ms};
    use crate::{build_rocket, build_rocket_with};
    use chrono::{TimeDelta, Utc};
    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    async fn client() -> Client {
        client_with_timeout(15 * 60 * 1000).await
    }

    async fn client_with_timeout(timeout_ms: u64) -> Client {
        Client::tracked(build_rocket(test_config_with_timeout_ms(timeout_ms)).expect("valid config"))
            .await
            .expect("valid rocket instance")
    }

    fn tracker(client: &Client) -> &Arc<ActivityTracker> {
        client.rocket().state::<Arc<ActivityTracker>>().expect("tracker is managed")
    }

    async fn login<'c>(client: &'c Client, username: &str, password: &str) -> LocalResponse<'c> {
        client
            .post("/login")
            .header(ContentType::JSON)
            .body(serde_json::json!({ "username": username, "password": password }).to_string())
            .dispatch()
            .await
    }

    async fn json(response: LocalResponse<'_>) -> Value {
        response.into_json::<Value>().await.expect("json body")
    }

    #[rocket::async_test]
    async fn login_sets_session_cookie_and_starts_tracking() {
        let client = client().await;
        let response = login(&client, "user", "password").await;
        assert_eq!(response.status(), Status::Ok);

        let cookie = response.cookies().get("auth_token").expect("session cookie").clone();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(rocket::http::SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(rocket::time::Duration::hours(1)));

        let body = json(response).await;
        assert_eq!(body["message"], "Login successful");
        assert_eq!(body["username"], "user");

        assert!(tracker(&client).last_activity("user").await.is_some());
    }

    #[rocket::async_test]
    async fn wrong_password_is_rejected_without_side_effects() {
        let client = client().await;
        let response = login(&client, "user", "nope").await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert!(response.cookies().get("auth_token").is_none());
        assert_eq!(json(response).await["message"], "Invalid credentials");

        assert_eq!(tracker(&client).last_activity("user").await, None);
    }

    #[rocket::async_test]
    async fn empty_credentials_fail_validation() {
        let client = client().await;
        let response = login(&client, "", "").await;
        assert_eq!(response.status(), Status::BadRequest);
    }

    #[rocket::async_test]
    async fn protected_returns_claims_after_login() {
        let client = client().await;
        login(&client, "user", "password").await;

        let response = client.get("/protected").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body = json(response).await;
        assert_eq!(body["message"], "Protected content");
        assert_eq!(body["user"]["username"], "user");
        assert!(body["user"]["exp"].as_i64().unwrap() > body["user"]["iat"].as_i64().unwrap());

        let tracked = tracker(&client).last_activity("user").await.unwrap();
        assert_eq!(body["lastActivity"].as_i64(), Some(tracked.timestamp_millis()));
    }

    #[rocket::async_test]
    async fn protected_without_token_is_unauthorized() {
        let client = client().await;
        let response = client.get("/protected").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await["message"], "No token provided");
    }

    #[rocket::async_test]
    async fn forged_token_is_tracked_but_never_authorized() {
        let client = client().await;
        let forged = TokenService::new("attacker-secret", Duration::from_secs(3600)).issue("user").unwrap();

        let response = client.get("/protected").cookie(Cookie::new("auth_token", forged)).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(json(response).await["message"], "Invalid token");

        // Tracking keys on the unverified claim; authorization still failed above.
        assert!(tracker(&client).last_activity("user").await.is_some());
    }

    #[rocket::async_test]
    async fn expired_token_is_forbidden() {
        let client = client().await;
        let tokens = TokenService::new(TEST_SECRET, Duration::from_secs(3600));
        let expired = tokens.issue_at("user", Utc::now() - TimeDelta::hours(2)).unwrap();

        let response = client.get("/protected").cookie(Cookie::new("auth_token", expired)).dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(json(response).await["message"], "Invalid token");
    }

    #[rocket::async_test]
    async fn undecodable_cookie_is_rejected_by_gate_and_cleared() {
        let client = client().await;
        let response = client.get("/protected").cookie(Cookie::new("auth_token", "garbage")).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let cleared = response.cookies().get("auth_token").expect("removal cookie").clone();
        assert_eq!(cleared.value(), "");
        assert_eq!(json(response).await["message"], "Invalid token");
    }

    #[rocket::async_test]
    async fn empty_cookie_is_treated_as_no_token() {
        let client = client().await;

        let response = client
            .post("/login")
            .header(ContentType::JSON)
            .cookie(Cookie::new("auth_token", ""))
            .body(serde_json::json!({ "username": "user", "password": "password" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        client.post("/logout").dispatch().await;

        let response = client.get("/protected").cookie(Cookie::new("auth_token", "")).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await["message"], "No token provided");

        let response = client.get("/session-status").cookie(Cookie::new("auth_token", "")).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await, serde_json::json!({ "isActive": false }));

        let response = client.post("/logout").cookie(Cookie::new("auth_token", "")).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn idle_session_expires_and_cookie_is_cleared() {
        let client = client_with_timeout(200).await;
        assert_eq!(login(&client, "user", "password").await.status(), Status::Ok);
        assert_eq!(client.get("/protected").dispatch().await.status(), Status::Ok);

        tokio::time::sleep(Duration::from_millis(450)).await;

        let response = client.get("/protected").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let cleared = response.cookies().get("auth_token").expect("removal cookie").clone();
        assert_eq!(cleared.value(), "");
        assert_eq!(json(response).await["message"], "Session expired due to inactivity");
        assert_eq!(tracker(&client).last_activity("user").await, None);

        let response = client.get("/protected").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await["message"], "No token provided");
    }

    #[rocket::async_test]
    async fn activity_within_timeout_keeps_session_alive() {
        let client = client_with_timeout(400).await;
        login(&client, "user", "password").await;

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(client.get("/protected").dispatch().await.status(), Status::Ok);
        }
    }

    #[rocket::async_test]
    async fn logout_ends_session_and_clears_cookie() {
        let client = client().await;
        login(&client, "user", "password").await;

        let response = client.post("/logout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let cleared = response.cookies().get("auth_token").expect("removal cookie").clone();
        assert_eq!(cleared.value(), "");
        assert_eq!(json(response).await["message"], "Logged out successfully");
        assert_eq!(tracker(&client).last_activity("user").await, None);

        let response = client.get("/protected").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn logout_always_succeeds() {
        let client = client().await;
        assert_eq!(client.post("/logout").dispatch().await.status(), Status::Ok);

        let response = client.post("/logout").cookie(Cookie::new("auth_token", "garbage")).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn logout_with_expired_token_still_ends_tracking() {
        let client = client().await;
        let tokens = TokenService::new(TEST_SECRET, Duration::from_secs(3600));
        let expired = tokens.issue_at("user", Utc::now() - TimeDelta::hours(2)).unwrap();
        tracker(&client).start("user").await;

        let response = client.post("/logout").cookie(Cookie::new("auth_token", expired)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(tracker(&client).last_activity("user").await, None);
    }

    #[rocket::async_test]
    async fn session_status_without_token_is_inactive() {
        let client = client().await;
        let response = client.get("/session-status").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await, serde_json::json!({ "isActive": false }));
    }

    #[rocket::async_test]
    async fn session_status_with_unverifiable_token_is_inactive() {
        let client = client().await;
        let forged = TokenService::new("attacker-secret", Duration::from_secs(3600)).issue("user").unwrap();
        let response = client.get("/session-status").cookie(Cookie::new("auth_token", forged)).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await, serde_json::json!({ "isActive": false }));
    }

    #[rocket::async_test]
    async fn session_status_reports_remaining_time_without_refreshing() {
        let client = client().await;
        login(&client, "user", "password").await;
        let before = tracker(&client).last_activity("user").await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let response = client.get("/session-status").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let body = json(response).await;
        assert_eq!(body["isActive"], true);
        let remaining = body["remainingTime"].as_u64().unwrap();
        assert!(remaining > 0 && remaining < 15 * 60 * 1000);

        assert_eq!(tracker(&client).last_activity("user").await, Some(before));
    }

    #[rocket::async_test]
    async fn session_status_after_idle_timeout_is_expired() {
        let client = client_with_timeout(200).await;
        login(&client, "user", "password").await;
        tokio::time::sleep(Duration::from_millis(450)).await;

        let response = client.get("/session-status").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await["message"], "Session expired due to inactivity");
        assert_eq!(tracker(&client).last_activity("user").await, None);
    }

    #[rocket::async_test]
    async fn session_status_without_tracked_session_is_inactive() {
        let client = client().await;
        let token = TokenService::new(TEST_SECRET, Duration::from_secs(3600)).issue("user").unwrap();
        let response = client.get("/session-status").cookie(Cookie::new("auth_token", token)).dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        assert_eq!(json(response).await, serde_json::json!({ "isActive": false }));
    }

    #[rocket::async_test]
    async fn custom_credential_verifier_is_consulted() {
        let verifier = Arc::new(MockCredentials::accepting(&[("alice", "s3cret")]));
        let rocket = build_rocket_with(test_config(), verifier.clone()).expect("valid config");
        let client = Client::tracked(rocket).await.expect("valid rocket instance");

        assert_eq!(login(&client, "user", "password").await.status(), Status::Unauthorized);
        assert_eq!(login(&client, "alice", "s3cret").await.status(), Status::Ok);
        assert_eq!(verifier.attempts(), vec!["user".to_string(), "alice".to_string()]);

        let body = json(client.get("/protected").dispatch().await).await;
        assert_eq!(body["user"]["username"], "alice");
    }
}
