use serde::{Deserialize, Serialize};

/// Session established by exchanging a link credential
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    /// Wallet user the session belongs to, when the backend reports it
    pub subject_id: Option<i64>,
}

/// Body sent to the bridge endpoint
#[derive(Debug, Clone, Serialize)]
pub struct BridgeRequest<'a> {
    pub token: &'a str,
}

/// Response of the bridge and refresh endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionResponse {
    #[serde(default, alias = "accessToken")]
    pub access_token: Option<String>,
    #[serde(default, alias = "subjectId", alias = "subject_id")]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub refreshed: bool,
}

impl SessionResponse {
    /// Access token, if present and non-empty
    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}
