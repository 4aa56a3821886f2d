//! The operations the dashboard needs from the managed backend

use crate::error::Result;
use crate::models::{Bookmark, BookmarkChange, BookmarkId, NewBookmark};
use async_trait::async_trait;
use bookmarks_auth::{AuthChangeEvent, OAuthProvider, Session};
use tokio::sync::{broadcast, mpsc};

/// An open change channel, returned by [`Backend::subscribe_bookmarks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    topic: String,
}

impl ChannelHandle {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Backend boundary of the dashboard
///
/// [`crate::SupabaseBackend`] talks to a Supabase project; tests use
/// in-memory fakes.
#[async_trait]
pub trait Backend: Send + Sync {
    /// The current session, `None` when signed out
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Start an OAuth sign-in; returns the URL the user has to visit
    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String>;

    async fn sign_out(&self) -> Result<()>;

    /// Bookmarks owned by `user_id`, newest first
    async fn fetch_bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>>;

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<()>;

    async fn delete_bookmark(&self, id: &BookmarkId) -> Result<()>;

    /// Open a channel delivering insert/delete changes of `user_id`'s rows into `sink`
    async fn subscribe_bookmarks(
        &self,
        user_id: &str,
        sink: mpsc::UnboundedSender<BookmarkChange>,
    ) -> Result<ChannelHandle>;

    /// Close a channel opened by [`Backend::subscribe_bookmarks`]
    async fn remove_channel(&self, channel: ChannelHandle) -> Result<()>;

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent>;
}
