//! Session and user data returned by GoTrue

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// ユーザー情報
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl User {
    /// Create a user carrying only an id and an email address
    pub fn new(id: &str, email: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            email: email.map(str::to_string),
            ..Default::default()
        }
    }
}

/// セッション情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    /// Unix timestamp (seconds) after which the access token is no longer valid
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

impl Session {
    /// Create a new session that expires `expires_in` seconds from now
    pub fn new(access_token: &str, refresh_token: &str, user: User, expires_in: i64) -> Self {
        Self {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_in,
            expires_at: Some(now_secs() + expires_in),
            token_type: default_token_type(),
            user,
        }
    }

    /// Fill in `expires_at` from `expires_in` when the server left it out
    pub(crate) fn stamped(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = Some(now_secs() + self.expires_in);
        }
        self
    }

    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => now_secs() >= expires_at,
            None => false,
        }
    }
}

/// Kind of session transition reported by [`crate::Auth::on_auth_state_change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// A session transition together with the session in effect afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct AuthChangeEvent {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expiry() {
        let session = Session::new("a", "r", User::new("u1", None), 3600);
        assert!(!session.is_expired());

        let mut expired = session.clone();
        expired.expires_at = Some(now_secs() - 1);
        assert!(expired.is_expired());

        expired.expires_at = None;
        assert!(!expired.is_expired());
    }

    #[test]
    fn test_session_deserialize_without_expires_at() {
        let session: Session = serde_json::from_value(serde_json::json!({
            "access_token": "token",
            "refresh_token": "refresh",
            "expires_in": 60,
            "user": { "id": "user-1", "email": "a@example.com" }
        }))
        .unwrap();

        assert_eq!(session.token_type, "bearer");
        assert!(session.expires_at.is_none());
        let stamped = session.stamped();
        assert!(stamped.expires_at.unwrap() > now_secs());
        assert_eq!(stamped.user.email.as_deref(), Some("a@example.com"));
    }
}
