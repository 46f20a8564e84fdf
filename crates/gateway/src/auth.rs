use std::collections::HashMap;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use bastion_core::{AuthOutcome, Caller, RequestHeaders};

/// Header carrying a raw API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Decides whether a request may perform an authenticated call.
///
/// Consulted before any cache or breaker interaction.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, headers: &RequestHeaders) -> AuthOutcome;
}

/// Static API-key authenticator.
///
/// Keys are held as `sha256_hex(raw_key) -> caller name`, so the raw keys
/// never need to live in configuration. A key is accepted from the
/// `x-api-key` header or as an `Authorization: Bearer` token.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuthenticator {
    keys: HashMap<String, String>,
}

impl ApiKeyAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-hashed key (lowercase hex SHA-256).
    #[must_use]
    pub fn with_hashed_key(mut self, key_hash: impl Into<String>, name: impl Into<String>) -> Self {
        self.keys
            .insert(key_hash.into().to_ascii_lowercase(), name.into());
        self
    }

    /// Register a raw key. Mostly useful for tests.
    #[must_use]
    pub fn with_key(self, raw_key: &str, name: impl Into<String>) -> Self {
        self.with_hashed_key(hash_api_key(raw_key), name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Hash a raw API key to the lookup format (lowercase hex SHA-256).
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, headers: &RequestHeaders) -> AuthOutcome {
        let Some(raw) = headers
            .get(API_KEY_HEADER)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .or_else(|| headers.bearer_token())
        else {
            return AuthOutcome::deny("missing credentials");
        };

        match self.keys.get(&hash_api_key(raw)) {
            Some(name) => AuthOutcome::allow(Caller::new(name.clone(), "api_key")),
            None => AuthOutcome::deny("invalid api key"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> ApiKeyAuthenticator {
        ApiKeyAuthenticator::new().with_key("sk-test", "ci-bot")
    }

    #[tokio::test]
    async fn accepts_api_key_header() {
        let headers = RequestHeaders::new().with("X-Api-Key", "sk-test");
        let outcome = auth().authenticate(&headers).await;
        assert!(outcome.authenticated);
        let user = outcome.user.unwrap();
        assert_eq!(user.id, "ci-bot");
        assert_eq!(user.auth_method, "api_key");
    }

    #[tokio::test]
    async fn accepts_bearer_token() {
        let headers = RequestHeaders::new().with("authorization", "Bearer sk-test");
        assert!(auth().authenticate(&headers).await.authenticated);
    }

    #[tokio::test]
    async fn rejects_unknown_and_missing_keys() {
        let wrong = RequestHeaders::new().with("x-api-key", "sk-nope");
        let outcome = auth().authenticate(&wrong).await;
        assert!(!outcome.authenticated);
        assert_eq!(outcome.error.as_deref(), Some("invalid api key"));

        let outcome = auth().authenticate(&RequestHeaders::new()).await;
        assert_eq!(outcome.error.as_deref(), Some("missing credentials"));
    }

    #[test]
    fn hashed_keys_are_case_insensitive() {
        let upper = hash_api_key("k").to_ascii_uppercase();
        let a = ApiKeyAuthenticator::new().with_hashed_key(upper, "x");
        assert!(a.keys.contains_key(&hash_api_key("k")));
        assert_eq!(a.len(), 1);
    }
}
