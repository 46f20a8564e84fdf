use serde::{Deserialize, Serialize};

/// Minimal caller identity for audit threading.
///
/// Shared across crates so the gateway can record who triggered each call
/// without depending on any particular authentication scheme.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Caller identifier (user id or API key name).
    pub id: String,
    /// How the caller authenticated (`"api_key"`, `"bearer"`, `"anonymous"`).
    pub auth_method: String,
}

impl Caller {
    pub fn new(id: impl Into<String>, auth_method: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            auth_method: auth_method.into(),
        }
    }
}

/// Result of asking the authentication collaborator about a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Caller>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuthOutcome {
    /// A successful authentication for `user`.
    pub fn allow(user: Caller) -> Self {
        Self {
            authenticated: true,
            user: Some(user),
            error: None,
        }
    }

    /// A rejected authentication with a reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            user: None,
            error: Some(reason.into()),
        }
    }
}
