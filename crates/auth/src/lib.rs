//! Supabase Auth client for the smart-bookmarks dashboard
//!
//! This crate covers the part of GoTrue the dashboard relies on: building the
//! OAuth authorize redirect, picking the session up from the redirect URL,
//! validating and refreshing it, signing out, and broadcasting session
//! transitions to whoever is listening.

mod session;

pub use session::{AuthChangeEvent, AuthEvent, Session, User};

use jsonwebtoken::{DecodingKey, Validation};
use log::{debug, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

const CLIENT_INFO: &str = concat!("bookmarks-auth/", env!("CARGO_PKG_VERSION"));

/// エラー型
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// クライアントオプション
#[derive(Debug, Clone)]
pub struct AuthOptions {
    /// Refresh an expired session once when it is read through [`Auth::get_session`]
    pub auto_refresh_token: bool,
    /// Keep the session in memory after sign-in
    pub persist_session: bool,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
        }
    }
}

/// OAuth プロバイダ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Github,
    Gitlab,
    Bitbucket,
    Apple,
    Azure,
    Discord,
    Slack,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Bitbucket => "bitbucket",
            Self::Apple => "apple",
            Self::Azure => "azure",
            Self::Discord => "discord",
            Self::Slack => "slack",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            "bitbucket" => Ok(Self::Bitbucket),
            "apple" => Ok(Self::Apple),
            "azure" => Ok(Self::Azure),
            "discord" => Ok(Self::Discord),
            "slack" => Ok(Self::Slack),
            other => Err(AuthError::ApiError(format!(
                "Unsupported OAuth provider: {}",
                other
            ))),
        }
    }
}

/// OAuth サインイン設定
#[derive(Debug, Clone, Serialize, Default)]
pub struct OAuthSignInOptions {
    pub redirect_to: Option<String>,
    pub scopes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessTokenClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Supabase Auth クライアント
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
    state_change: broadcast::Sender<AuthChangeEvent>,
}

impl Auth {
    /// 新しい Auth クライアントを作成
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        let (state_change, _) = broadcast::channel(16);
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
            state_change,
        }
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    /// Subscribe to session transitions (sign-in, sign-out, token refresh)
    pub fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent> {
        self.state_change.subscribe()
    }

    fn notify(&self, event: AuthEvent, session: Option<Session>) {
        debug!("Auth state change: {:?}", event);
        // No receivers is fine: nobody is watching the session yet.
        let _ = self.state_change.send(AuthChangeEvent { event, session });
    }

    fn store_session(&self, session: &Session) {
        if self.options.persist_session {
            let mut guard = self
                .current_session
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *guard = Some(session.clone());
        }
    }

    fn clear_session(&self) -> Option<Session> {
        let mut guard = self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.take()
    }

    /// The session held in memory, without validation
    pub fn current_session(&self) -> Option<Session> {
        self.current_session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 現在のセッションを取得
    ///
    /// An expired session is refreshed once when `auto_refresh_token` is on.
    /// If it cannot be refreshed it is dropped and reported as absent.
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let session = match self.current_session() {
            Some(session) => session,
            None => return Ok(None),
        };

        if !session.is_expired() {
            return Ok(Some(session));
        }

        if self.options.auto_refresh_token {
            match self.refresh_session().await {
                Ok(refreshed) => return Ok(Some(refreshed)),
                Err(e) => warn!("Failed to refresh expired session: {}", e),
            }
        }

        self.clear_session();
        self.notify(AuthEvent::SignedOut, None);
        Ok(None)
    }

    /// 現在のユーザーを取得
    pub async fn get_user(&self) -> Result<User, AuthError> {
        let session = self.current_session().ok_or(AuthError::MissingSession)?;
        self.fetch_user(&session.access_token).await
    }

    async fn fetch_user(&self, access_token: &str) -> Result<User, AuthError> {
        let response = self
            .http_client
            .get(self.auth_url("/user"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(access_token)
            .send()
            .await?;

        read_json(response).await
    }

    /// OAuth プロバイダを通じたサインインのためのURL生成
    pub fn get_oauth_sign_in_url(
        &self,
        provider: OAuthProvider,
        options: Option<OAuthSignInOptions>,
    ) -> Result<String, AuthError> {
        let options = options.unwrap_or_default();
        let mut url = Url::parse(&self.auth_url("/authorize"))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("provider", provider.as_str());
            if let Some(redirect_to) = &options.redirect_to {
                query.append_pair("redirect_to", redirect_to);
            }
            if let Some(scopes) = &options.scopes {
                query.append_pair("scopes", scopes);
            }
        }

        Ok(url.to_string())
    }

    /// OAuthで認証をリクエスト
    ///
    /// Returns the authorize URL the user agent must be sent to. The redirect
    /// target has to be an absolute URL, otherwise GoTrue would silently fall
    /// back to the project's site URL.
    pub async fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        options: Option<OAuthSignInOptions>,
    ) -> Result<String, AuthError> {
        if let Some(redirect_to) = options.as_ref().and_then(|o| o.redirect_to.as_deref()) {
            Url::parse(redirect_to)?;
        }

        let url = self.get_oauth_sign_in_url(provider, options)?;
        info!("OAuth sign-in via {} prepared", provider);
        Ok(url)
    }

    /// Pick up the session from the URL GoTrue redirected back to
    ///
    /// The implicit flow puts the tokens in the fragment
    /// (`#access_token=..&refresh_token=..`); failures come back as
    /// `error_description` in either the fragment or the query.
    pub async fn get_session_from_url(&self, callback_url: &str) -> Result<Session, AuthError> {
        let url = Url::parse(callback_url)?;
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if let Some(fragment) = url.fragment() {
            params.extend(
                url::form_urlencoded::parse(fragment.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned())),
            );
        }

        let param = |name: &str| {
            params
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        };

        if let Some(description) = param("error_description").or_else(|| param("error")) {
            return Err(AuthError::ApiError(description));
        }

        let access_token = param("access_token").ok_or(AuthError::MissingSession)?;
        let refresh_token = param("refresh_token").ok_or(AuthError::MissingSession)?;
        self.set_session_from_tokens(&access_token, &refresh_token)
            .await
    }

    /// Restore a session from a token pair, validating it against `/user`
    pub async fn set_session_from_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, AuthError> {
        let claims = decode_claims(access_token)?;
        let user = self.fetch_user(access_token).await?;

        let now = session::now_secs();
        let expires_at = claims.exp.unwrap_or(now + 3600);
        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_in: (expires_at - now).max(0),
            expires_at: Some(expires_at),
            token_type: "bearer".to_string(),
            user,
        };

        self.store_session(&session);
        self.notify(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Install a session obtained elsewhere without contacting the server
    pub fn set_session(&self, session: Session) {
        let session = session.stamped();
        self.store_session(&session);
        self.notify(AuthEvent::SignedIn, Some(session));
    }

    /// セッションをリフレッシュ
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let session = self.current_session().ok_or(AuthError::MissingSession)?;

        let payload = serde_json::json!({
            "refresh_token": session.refresh_token,
        });

        let response = self
            .http_client
            .post(self.auth_url("/token?grant_type=refresh_token"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .json(&payload)
            .send()
            .await?;

        let new_session: Session = read_json(response).await?;
        let new_session = new_session.stamped();

        self.store_session(&new_session);
        self.notify(AuthEvent::TokenRefreshed, Some(new_session.clone()));
        Ok(new_session)
    }

    /// サインアウト
    ///
    /// The local session is dropped even when the server rejects the call;
    /// the server error is still returned to the caller.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let session = self.clear_session().ok_or(AuthError::MissingSession)?;
        self.notify(AuthEvent::SignedOut, None);

        let response = self
            .http_client
            .post(self.auth_url("/logout"))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(AuthError::ApiError(error_text));
        }

        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    if !response.status().is_success() {
        let error_text = response.text().await?;
        return Err(AuthError::ApiError(error_text));
    }
    Ok(response.json::<T>().await?)
}

// Only the expiry is read here; the token itself is checked by the server
// through `/user`.
fn decode_claims(token: &str) -> Result<AccessTokenClaims, AuthError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    jsonwebtoken::decode::<AccessTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| AuthError::InvalidToken(e.to_string()))
}
