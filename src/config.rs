//! Configuration for the bookmarks dashboard

use crate::error::{Error, Result};
use bookmarks_auth::OAuthProvider;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Where the OAuth provider sends the user back after signing in
pub const DEFAULT_REDIRECT_TO: &str = "https://smart-bookmark-app-rho-seven.vercel.app/dashboard";

/// Where an incoming bookmark lands in the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertOrder {
    /// Always at the front, regardless of `created_at`
    #[default]
    Prepend,
    /// At the position that keeps `created_at` descending
    CreatedAtDesc,
}

impl FromStr for InsertOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prepend" => Ok(InsertOrder::Prepend),
            "created_at_desc" | "created-at-desc" => Ok(InsertOrder::CreatedAtDesc),
            other => Err(Error::config(format!("Unknown insert order: {}", other))),
        }
    }
}

/// Configuration options for the dashboard
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// The project URL (`https://<ref>.supabase.co`)
    pub supabase_url: Url,

    /// The anonymous API key
    pub anon_key: String,

    /// Post-login destination handed to the OAuth provider
    pub redirect_to: String,

    pub oauth_provider: OAuthProvider,

    /// Table holding the bookmark rows
    pub table: String,

    pub insert_order: InsertOrder,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Realtime heartbeat period
    pub heartbeat_interval: Duration,
}

impl AppConfig {
    /// Create a configuration with defaults for everything but the project
    pub fn new(supabase_url: &str, anon_key: &str) -> Result<Self> {
        let supabase_url = Url::parse(supabase_url)?;
        if anon_key.trim().is_empty() {
            return Err(Error::config("Anon key must not be empty"));
        }

        Ok(Self {
            supabase_url,
            anon_key: anon_key.to_string(),
            redirect_to: DEFAULT_REDIRECT_TO.to_string(),
            oauth_provider: OAuthProvider::Google,
            table: "bookmarks".to_string(),
            insert_order: InsertOrder::default(),
            request_timeout: Some(Duration::from_secs(30)),
            heartbeat_interval: Duration::from_secs(30),
        })
    }

    /// Read the configuration from the environment (and `.env`, if present)
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required;
    /// `BOOKMARKS_REDIRECT_TO`, `BOOKMARKS_TABLE`, `BOOKMARKS_INSERT_ORDER`
    /// and `BOOKMARKS_OAUTH_PROVIDER` override the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let url = env::var("SUPABASE_URL").map_err(|_| Error::config("SUPABASE_URL is not set"))?;
        let key =
            env::var("SUPABASE_ANON_KEY").map_err(|_| Error::config("SUPABASE_ANON_KEY is not set"))?;
        let mut config = Self::new(&url, &key)?;

        if let Ok(redirect_to) = env::var("BOOKMARKS_REDIRECT_TO") {
            config = config.with_redirect_to(&redirect_to)?;
        }
        if let Ok(table) = env::var("BOOKMARKS_TABLE") {
            config = config.with_table(&table);
        }
        if let Ok(order) = env::var("BOOKMARKS_INSERT_ORDER") {
            config = config.with_insert_order(order.parse()?);
        }
        if let Ok(provider) = env::var("BOOKMARKS_OAUTH_PROVIDER") {
            let provider = provider
                .parse::<OAuthProvider>()
                .map_err(|e| Error::config(format!("BOOKMARKS_OAUTH_PROVIDER: {}", e)))?;
            config = config.with_oauth_provider(provider);
        }

        Ok(config)
    }

    /// Set the post-login destination; it must be an absolute URL
    pub fn with_redirect_to(mut self, value: &str) -> Result<Self> {
        Url::parse(value)?;
        self.redirect_to = value.to_string();
        Ok(self)
    }

    pub fn with_oauth_provider(mut self, value: OAuthProvider) -> Self {
        self.oauth_provider = value;
        self
    }

    /// Set the bookmarks table
    pub fn with_table(mut self, value: &str) -> Self {
        self.table = value.to_string();
        self
    }

    pub fn with_insert_order(mut self, value: InsertOrder) -> Self {
        self.insert_order = value;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    pub fn with_heartbeat_interval(mut self, value: Duration) -> Self {
        self.heartbeat_interval = value;
        self
    }
}
