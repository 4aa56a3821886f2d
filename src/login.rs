//! The login page

use crate::backend::Backend;
use crate::config::AppConfig;
use bookmarks_auth::OAuthProvider;
use std::sync::Arc;
use tracing::{error, info};

pub struct LoginView {
    backend: Arc<dyn Backend>,
    provider: OAuthProvider,
    redirect_to: String,
}

impl LoginView {
    pub fn new(backend: Arc<dyn Backend>, config: &AppConfig) -> Self {
        Self {
            backend,
            provider: config.oauth_provider,
            redirect_to: config.redirect_to.clone(),
        }
    }

    pub fn provider(&self) -> OAuthProvider {
        self.provider
    }

    pub fn redirect_to(&self) -> &str {
        &self.redirect_to
    }

    /// Start the OAuth flow; returns the URL to send the user to
    ///
    /// Failures are only logged.
    pub async fn login_with_provider(&self) -> Option<String> {
        match self
            .backend
            .sign_in_with_oauth(self.provider, &self.redirect_to)
            .await
        {
            Ok(url) => {
                info!(provider = %self.provider, "Redirecting to OAuth provider");
                Some(url)
            }
            Err(e) => {
                error!("Login error: {}", e);
                None
            }
        }
    }
}
