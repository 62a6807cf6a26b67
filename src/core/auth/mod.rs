use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_PLAYER_NAME: &str = "Player";
const UNSIGNED_TOKEN: &str = "unsigned";
const EMPTY_USER_PROPERTIES: &str = "{}";

/// Authorization material handed to the game process.
///
/// Produced by the external sign-in flow and passed through untouched, or
/// synthesized offline by [`Authorization::offline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub access_token: String,
    pub client_token: String,
    pub uuid: String,
    pub name: String,
    pub user_properties: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl Authorization {
    /// Unsigned offline identity with a fresh random UUID.
    pub fn offline(display_name: &str) -> Self {
        let name = match display_name.trim() {
            "" => DEFAULT_PLAYER_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            access_token: UNSIGNED_TOKEN.into(),
            client_token: UNSIGNED_TOKEN.into(),
            uuid: Uuid::new_v4().to_string(),
            name,
            user_properties: EMPTY_USER_PROPERTIES.into(),
            meta: None,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.access_token == UNSIGNED_TOKEN
    }
}

/// Who is launching: a display name and, when signed in, a token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LaunchIdentity {
    pub display_name: String,
    #[serde(default)]
    pub auth_token: Option<Authorization>,
}

impl LaunchIdentity {
    pub fn offline(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            auth_token: None,
        }
    }

    /// The token verbatim when present, an offline identity otherwise.
    pub fn resolve(&self) -> Authorization {
        match &self.auth_token {
            Some(token) => token.clone(),
            None => Authorization::offline(&self.display_name),
        }
    }
}
