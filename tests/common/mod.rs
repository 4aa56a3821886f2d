#![allow(dead_code)]

use async_trait::async_trait;
use bookmarks_auth::AuthError;
use bookmarks_postgrest::PostgrestError;
use bookmarks_realtime::RealtimeError;
use chrono::{TimeZone, Utc};
use smart_bookmarks::{
    AuthChangeEvent, AuthEvent, Backend, Bookmark, BookmarkChange, BookmarkId, ChannelHandle, Error,
    HistoryNavigator, NewBookmark, OAuthProvider, Result, Session, User,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub fn bookmark(id: i64, user_id: &str) -> Bookmark {
    Bookmark {
        id: BookmarkId::Number(id),
        title: format!("Bookmark {}", id),
        url: format!("https://example.com/{}", id),
        user_id: user_id.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, id as u32 % 60, 0).unwrap(),
    }
}

pub fn session_for(user_id: &str) -> Session {
    let email = format!("{}@example.com", user_id);
    Session::new("access-token", "refresh-token", User::new(user_id, Some(&email)), 3600)
}

pub fn ids(bookmarks: &[Bookmark]) -> Vec<String> {
    bookmarks.iter().map(|b| b.id.to_string()).collect()
}

/// In-memory backend recording every call
pub struct FakeBackend {
    pub session: Mutex<Option<Session>>,
    pub fail_session: AtomicBool,
    pub fail_sign_in: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_insert: AtomicBool,
    pub fail_delete: AtomicBool,
    pub rows: Mutex<Vec<Bookmark>>,
    pub inserted: Mutex<Vec<NewBookmark>>,
    pub deleted: Mutex<Vec<BookmarkId>>,
    /// Changes delivered while the initial fetch is still running
    pub during_fetch: Mutex<Vec<BookmarkChange>>,
    pub fetch_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    // topic -> sink, `None` once the connection behind it dropped
    channels: Mutex<HashMap<String, Option<mpsc::UnboundedSender<BookmarkChange>>>>,
    auth_events: broadcast::Sender<AuthChangeEvent>,
}

impl FakeBackend {
    pub fn new(session: Option<Session>) -> Arc<Self> {
        let (auth_events, _) = broadcast::channel(16);
        Arc::new(Self {
            session: Mutex::new(session),
            fail_session: AtomicBool::new(false),
            fail_sign_in: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            fail_insert: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            rows: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            during_fetch: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            channels: Mutex::new(HashMap::new()),
            auth_events,
        })
    }

    pub fn signed_in(user_id: &str) -> Arc<Self> {
        Self::new(Some(session_for(user_id)))
    }

    pub fn with_rows(self: Arc<Self>, rows: Vec<Bookmark>) -> Arc<Self> {
        *self.rows.lock().unwrap() = rows;
        self
    }

    /// Deliver a change on every open channel
    pub fn emit(&self, change: BookmarkChange) {
        for sink in self.channels.lock().unwrap().values().flatten() {
            let _ = sink.send(change.clone());
        }
    }

    /// Drop every sink as a lost connection would; the channels stay registered
    pub fn drop_sinks(&self) {
        for sink in self.channels.lock().unwrap().values_mut() {
            *sink = None;
        }
    }

    pub fn emit_auth(&self, event: AuthEvent, session: Option<Session>) {
        *self.session.lock().unwrap() = session.clone();
        let _ = self.auth_events.send(AuthChangeEvent { event, session });
    }

    pub fn open_channels(&self) -> Vec<String> {
        self.channels.lock().unwrap().keys().cloned().collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_session(&self) -> Result<Option<Session>> {
        if self.fail_session.load(Ordering::SeqCst) {
            return Err(Error::Auth(AuthError::ApiError("session lookup failed".to_string())));
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn sign_in_with_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String> {
        if self.fail_sign_in.load(Ordering::SeqCst) {
            return Err(Error::Auth(AuthError::ApiError("provider disabled".to_string())));
        }
        Ok(format!(
            "https://auth.example.com/authorize?provider={}&redirect_to={}",
            provider, redirect_to
        ))
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        self.emit_auth(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn fetch_bookmarks(&self, user_id: &str) -> Result<Vec<Bookmark>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        // let the channel side of the mount finish first now and then
        tokio::time::sleep(Duration::from_millis(5)).await;
        let during_fetch: Vec<_> = self.during_fetch.lock().unwrap().drain(..).collect();
        for change in during_fetch {
            self.emit(change);
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Error::Database(PostgrestError::InvalidParameters(
                "permission denied".to_string(),
            )));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_bookmark(&self, bookmark: &NewBookmark) -> Result<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(Error::Database(PostgrestError::InvalidParameters(
                "insert rejected".to_string(),
            )));
        }
        self.inserted.lock().unwrap().push(bookmark.clone());
        Ok(())
    }

    async fn delete_bookmark(&self, id: &BookmarkId) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::Database(PostgrestError::InvalidParameters(
                "delete rejected".to_string(),
            )));
        }
        self.deleted.lock().unwrap().push(id.clone());
        Ok(())
    }

    async fn subscribe_bookmarks(
        &self,
        user_id: &str,
        sink: mpsc::UnboundedSender<BookmarkChange>,
    ) -> Result<ChannelHandle> {
        let n = self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let topic = format!("realtime:bookmarks-{}-{}", user_id, n);
        self.channels.lock().unwrap().insert(topic.clone(), Some(sink));
        Ok(ChannelHandle::new(topic))
    }

    async fn remove_channel(&self, channel: ChannelHandle) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        match self.channels.lock().unwrap().remove(channel.topic()) {
            Some(_) => Ok(()),
            None => Err(Error::Realtime(RealtimeError::ChannelError(format!(
                "{} is not open",
                channel.topic()
            )))),
        }
    }

    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthChangeEvent> {
        self.auth_events.subscribe()
    }
}

pub fn navigator() -> Arc<HistoryNavigator> {
    Arc::new(HistoryNavigator::new())
}
