use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header carrying a caller-supplied idempotency key for writes.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Request headers forwarded to the gateway by the HTTP layer.
///
/// Names are stored lowercased so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeaders {
    entries: BTreeMap<String, String>,
}

impl RequestHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.entries.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The trimmed, non-empty idempotency key, if the caller sent one.
    pub fn idempotency_key(&self) -> Option<&str> {
        self.get(IDEMPOTENCY_KEY_HEADER)
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// The token of an `Authorization: Bearer <token>` header.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.get("authorization")?;
        let (scheme, token) = value.split_once(' ')?;
        scheme
            .eq_ignore_ascii_case("bearer")
            .then(|| token.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (k, v) in iter {
            headers.insert(k.as_ref(), v);
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_are_case_insensitive() {
        let headers = RequestHeaders::new().with("Idempotency-Key", "abc");
        assert_eq!(headers.get("IDEMPOTENCY-KEY"), Some("abc"));
        assert_eq!(headers.idempotency_key(), Some("abc"));
    }

    #[test]
    fn blank_idempotency_key_is_ignored() {
        let headers = RequestHeaders::new().with(IDEMPOTENCY_KEY_HEADER, "   ");
        assert_eq!(headers.idempotency_key(), None);
    }

    #[test]
    fn bearer_token_parsing() {
        let headers: RequestHeaders = [("Authorization", "Bearer tok-1")].into_iter().collect();
        assert_eq!(headers.bearer_token(), Some("tok-1"));

        let basic = RequestHeaders::new().with("authorization", "Basic dXNlcg==");
        assert_eq!(basic.bearer_token(), None);
    }
}
