use crate::config::{Config, Environment};
use crate::service::credentials::CredentialVerifier;
use std::sync::Mutex;

pub const TEST_SECRET: &str = "test-secret-do-not-use";

/// A complete, valid configuration with a 15 minute inactivity timeout.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = Some(TEST_SECRET.to_string());
    config.session.inactivity_timeout_ms = Some(15 * 60 * 1000);
    config.environment = Environment::Test;
    config.logging.level = "warn".to_string();
    config
}

pub fn test_config_with_timeout_ms(timeout_ms: u64) -> Config {
    let mut config = test_config();
    config.session.inactivity_timeout_ms = Some(timeout_ms);
    config
}

/// Accepts a fixed set of pairs and records every attempt.
pub struct MockCredentials {
    accepted: Vec<(String, String)>,
    attempts: Mutex<Vec<String>>,
}

impl MockCredentials {
    pub fn accepting(pairs: &[(&str, &str)]) -> Self {
        Self {
            accepted: pairs.iter().map(|(u, p)| (u.to_string(), p.to_string())).collect(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for MockCredentials {
    async fn verify(&self, username: &str, password: &str) -> bool {
        self.attempts.lock().unwrap().push(username.to_string());
        self.accepted.iter().any(|(u, p)| u == username && p == password)
    }
}
