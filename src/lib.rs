mod auth;
mod config;
mod error;
mod middleware;
mod models;
mod routes;
mod service;

#[cfg(test)]
pub mod test_utils;

pub use auth::{CookiePolicy, PassiveSessionGate, SessionGate};
pub use config::{Config, ConfigError, Settings};
pub use service::activity::{ActivityMode, ActivityTracker, SessionStatus, TrackResult};
pub use service::credentials::{CredentialVerifier, StaticCredentials};
pub use service::token::{TokenError, TokenService};

use crate::middleware::RequestLogger;
use crate::routes as app_routes;
use rocket::fairing::AdHoc;
use rocket::{Build, Rocket, catchers, http::Method};
use rocket_cors::{AllowedOrigins, CorsOptions};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str, json_format: bool) {
    // RUST_LOG overrides the configured level, e.g.
    //   RUST_LOG=session_gateway::service::activity=debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_line_number(true);

    // A subscriber may already be installed (tests build many instances).
    let _ = if json_format {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

fn build_cors(cors_config: &config::CorsConfig) -> CorsOptions {
    let allowed_origins = if cors_config.allowed_origins.iter().any(|origin| origin == "*") {
        AllowedOrigins::all()
    } else {
        AllowedOrigins::some_exact(&cors_config.allowed_origins.iter().map(String::as_str).collect::<Vec<_>>())
    };

    CorsOptions {
        allowed_origins,
        allowed_methods: vec![Method::Get, Method::Post, Method::Options].into_iter().map(From::from).collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Content-Type", "Accept"]),
        allow_credentials: cors_config.allow_credentials,
        ..Default::default()
    }
}

fn stage_activity_tracker(tracker: Arc<ActivityTracker>) -> AdHoc {
    AdHoc::on_ignite("Activity Tracker", move |rocket| {
        tracker.clone().spawn_sweep_task();

        Box::pin(async move { rocket.manage(tracker) })
    })
}

/// Builds the gateway with the configured single-user credential check.
pub fn build_rocket(config: Config) -> Result<Rocket<Build>, ConfigError> {
    let verifier: Arc<dyn CredentialVerifier> = Arc::new(StaticCredentials::from(&config.auth));
    build_rocket_with(config, verifier)
}

/// Builds the gateway around any credential check. Fails if the configuration
/// is incomplete, so the service never starts without a secret or timeout.
pub fn build_rocket_with(config: Config, verifier: Arc<dyn CredentialVerifier>) -> Result<Rocket<Build>, ConfigError> {
    init_tracing(&config.logging.level, config.logging.json_format);

    let settings = config.validate()?;
    let cors = build_cors(&config.cors).to_cors()?;

    let tokens = TokenService::new(&settings.jwt_secret, settings.token_lifetime);
    let tracker = Arc::new(ActivityTracker::new(settings.inactivity_timeout, settings.sweep_interval));
    let policy = CookiePolicy {
        name: settings.cookie_name.clone(),
        secure: settings.secure_cookies,
        max_age: settings.token_lifetime,
    };

    info!(
        environment = ?config.environment,
        inactivity_timeout_ms = settings.inactivity_timeout.as_millis() as u64,
        token_lifetime_secs = settings.token_lifetime.as_secs(),
        secure_cookies = settings.secure_cookies,
        "gateway configured"
    );

    let figment = rocket::Config::figment()
        .merge(("port", config.server.port))
        .merge(("address", config.server.address.clone()));

    let rocket = rocket::custom(figment)
        .attach(stage_activity_tracker(tracker))
        .attach(cors)
        .attach(RequestLogger)
        .manage(tokens)
        .manage(policy)
        .manage(verifier)
        .mount("/", app_routes::session::routes())
        .mount("/health", app_routes::health::routes())
        .register(
            "/",
            catchers![
                app_routes::error::bad_request,
                app_routes::error::unauthorized,
                app_routes::error::not_found,
                app_routes::error::payload_too_large,
                app_routes::error::unprocessable_entity,
                app_routes::error::internal_error
            ],
        );

    Ok(rocket)
}
