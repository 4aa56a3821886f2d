//! [`Backend`] implementation for a Supabase project

use crate::backend::{Backend, ChannelHandle};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::{Bookmark, BookmarkChange, BookmarkId, NewBookmark};
use async_trait::async_trait;
use bookmarks_auth::{
    Auth, AuthChangeEvent, AuthError, AuthOptions, OAuthProvider, OAuthSignInOptions, Session,
};
use bookmarks_postgrest::{PostgrestClient, SortOrder};
use bookmarks_realtime::{
    ChangeType, DatabaseChanges, PostgresChangePayload, RealtimeClient, RealtimeClientOptions,
};
use reqwest::Client;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Supabase auth, PostgREST and Realtime behind the [`Backend`] trait
pub struct SupabaseBackend {
    config: AppConfig,
    http_client: Client,
    auth: Auth,
    realtime: RealtimeClient,
}

impl SupabaseBackend {
    pub fn new(config: AppConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let url = config.supabase_url.as_str();
        let auth = Auth::new(url, &config.anon_key, http_client.clone(), AuthOptions::default());
        let realtime = RealtimeClient::new_with_options(
            url,
            &config.anon_key,
            RealtimeClientOptions {
                heartbeat_interval: config.heartbeat_interval,
                ..Default::default()
            },
        );
        forward_auth(&auth, &realtime);

        Ok(Self {
            config,
            http_client,
            auth,
            realtime,
        })
    }

    /// The auth client, for picking up a session after the OAuth redirect
    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    async fn access_token(&self) -> Result<String> {
        let session = self.auth.get_session().await?.ok_or(AuthError::MissingSession)?;
        Ok(session.access_token)
    }

    async fn table(&self) -> Result<PostgrestClient> {
        let token = self.access_token().await?;
        let client = PostgrestClient::new(
            self.config.supabase_url.as_str(),
            &self.config.anon_key,
            &self.config.table,
            self.http_client.clone(),
        )
        .with_auth(&token)?;
        Ok(client)
    }
}

/// Keep the token of joined channels in step with the auth session
///
/// Every sign-in and token refresh pushes the new access token to the
/// realtime socket, so channels survive the expiry of the token they joined
/// with. Needs a tokio runtime; without one nothing is forwarded.
fn forward_auth(auth: &Auth, realtime: &RealtimeClient) {
    let runtime = match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime,
        Err(_) => {
            warn!("No async runtime, refreshed tokens will not reach the change channel");
            return;
        }
    };
    let mut events = auth.on_auth_state_change();
    let realtime = realtime.clone();

    runtime.spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthChangeEvent { event, session }) => {
                    debug!(?event, "Forwarding auth change to realtime");
                    realtime.set_auth(session.map(|s| s.access_token)).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed auth notifications");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Auth notifier closed");
    });
}

/// Channel name for a user's bookmark changes
pub fn channel_name(user_id: &str) -> String {
    format!("bookmarks-{}", user_id)
}

/// Typed form of a `postgres_changes` event; `None` for kinds the list ignores
pub fn bookmark_change(change: &PostgresChangePayload) -> Result<Option<BookmarkChange>> {
    match change.change_type {
        ChangeType::Insert => {
            let bookmark: Bookmark = serde_json::from_value(change.record.clone())?;
            Ok(Some(BookmarkChange::Insert(bookmark)))
        }
        ChangeType::Delete => {
            let id = change
                .old_record
                .get("id")
                .cloned()
                .ok_or_else(|| Error::record(format!("DELETE without id: {}", change.old_record)))?;
            let id: BookmarkId = serde_json::from_value(id)?;
            Ok(Some(BookmarkChange::Delete(id)))
        }
        ChangeType::Update => Ok(None),
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn get_session(&self) -> Result<Option<Session>> {
        Ok(self.auth.get_session().await?)
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String> {
        let options = OAuthSignInOptions {
            redirect_to: Some(redirect_to.to_string()),
            scopes: None,
        };
        Ok(self.auth.sign_in_with_oauth(provider, Some(options)).await?)
    }

    async fn sign_out(&self) -> Result<()> {
        self.realtime.set_auth(None).await;
        Ok(self.auth.sign_out().await?)
    }

    async fn fetch_bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>> {
        let bookmarks = self
            .table()
            .await?
            .select("*")
            .eq("user_id", user_id)
            .order("created_at", SortOrder::Descending)
            .execute::<Bookmark>()
            .await?;
        debug!(count = bookmarks.len(), "Fetched bookmarks");
        Ok(bookmarks)
    }

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<()> {
        self.table().await?.insert(vec![bookmark]).await?;
        Ok(())
    }

    async fn delete_bookmark(&self, id: &BookmarkId) -> Result<()> {
        self.table()
            .await?
            .eq("id", &id.to_string())
            .delete()
            .await?;
        Ok(())
    }

    async fn subscribe_bookmarks(
        &self,
        user_id: &str,
        sink: mpsc::UnboundedSender<BookmarkChange>,
    ) -> Result<ChannelHandle> {
        let token = self.access_token().await?;
        self.realtime.set_auth(Some(token)).await;

        let changes = DatabaseChanges::new(&self.config.table).eq("user_id", user_id);
        let subscription = self
            .realtime
            .channel(&channel_name(user_id))
            .on(changes, move |change| match bookmark_change(&change) {
                Ok(Some(change)) => {
                    if sink.send(change).is_err() {
                        debug!("Change arrived after the listener went away");
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Ignoring malformed change: {}", e),
            })
            .subscribe()
            .await?;

        info!(topic = subscription.topic(), "Bookmark channel joined");
        Ok(ChannelHandle::new(subscription.topic()))
    }

    async fn remove_channel(&self, channel: ChannelHandle) -> Result<()> {
        // the socket is closed along with its last channel
        self.realtime.remove_channel(channel.topic()).await?;
        Ok(())
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent> {
        self.auth.on_auth_state_change()
    }
}
