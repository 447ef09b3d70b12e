use serde::{Deserialize, Serialize};

/// Identity of the end user as resolved by an upstream connector.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Claims {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub preferred_username: String,
    pub email: String,
    pub email_verified: bool,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// PKCE challenge bound to an authorization round-trip.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Pkce {
    pub code_challenge: String,
    pub code_challenge_method: String,
}
