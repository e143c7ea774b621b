use crate::config::AuthConfig;

/// Decides whether a username/password pair may log in.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> bool;
}

/// A single configured username/password pair.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl From<&AuthConfig> for StaticCredentials {
    fn from(config: &AuthConfig) -> Self {
        Self::new(config.username.clone(), config.password.clone())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[async_trait::async_trait]
impl CredentialVerifier for StaticCredentials {
    async fn verify(&self, username: &str, password: &str) -> bool {
        let username_ok = constant_time_eq(username.as_bytes(), self.username.as_bytes());
        let password_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
        username_ok & password_ok
    }
}
