//! The dashboard page: session, bookmark list, change channel and form

use crate::backend::Backend;
use crate::config::AppConfig;
use crate::form::{BookmarkForm, SubmitOutcome};
use crate::models::{Bookmark, BookmarkChange, BookmarkId};
use crate::routing::{Navigator, Route};
use crate::session::{SessionGuard, SessionTransition};
use crate::store::BookmarkStore;
use crate::subscription::ChangeSubscription;
use bookmarks_auth::User;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Something the dashboard has to react to
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    Change(BookmarkChange),
    Session(SessionTransition),
}

/// One lifetime of the dashboard page
///
/// Created by [`Dashboard::mount`], driven by [`Dashboard::next_event`] and
/// [`Dashboard::handle`] (or [`Dashboard::run`]), and closed with
/// [`Dashboard::unmount`], which releases the change channel.
pub struct Dashboard {
    backend: Arc<dyn Backend>,
    navigator: Arc<dyn Navigator>,
    user: User,
    session: Option<SessionGuard>,
    store: BookmarkStore,
    subscription: ChangeSubscription,
    form: BookmarkForm,
}

impl Dashboard {
    /// Mount the page
    ///
    /// Returns `None` after redirecting to login when there is no session.
    /// Otherwise the change channel is opened and the bookmarks are fetched.
    pub async fn mount(
        backend: Arc<dyn Backend>,
        navigator: Arc<dyn Navigator>,
        config: &AppConfig,
    ) -> Option<Self> {
        let (user, session) = SessionGuard::check(backend.as_ref(), navigator.as_ref()).await?;
        info!(user_id = %user.id, "Dashboard mounted");

        let mut dashboard = Self {
            subscription: ChangeSubscription::new(backend.clone()),
            backend,
            navigator,
            user,
            session: Some(session),
            store: BookmarkStore::new(config.insert_order),
            form: BookmarkForm::new(),
        };
        dashboard.load_user().await;
        Some(dashboard)
    }

    // Channel and initial fetch are independent. Changes that arrive before
    // the fetch completes wait in the channel queue and are applied after it.
    async fn load_user(&mut self) {
        let user_id = self.user.id.clone();
        let (subscribed, fetched) = tokio::join!(
            self.subscription.establish(&user_id),
            self.backend.fetch_bookmarks(&user_id)
        );

        if let Err(e) = subscribed {
            error!("Failed to subscribe to bookmark changes: {}", e);
        }
        match fetched {
            Ok(bookmarks) => self.store.replace_all(bookmarks),
            Err(e) => error!("Failed to fetch bookmarks: {}", e),
        }
    }

    /// Wait for the next change or session transition
    ///
    /// Cancel safe. Returns `None` once the page is unmounted.
    pub async fn next_event(&mut self) -> Option<DashboardEvent> {
        let session = self.session.as_mut()?;
        tokio::select! {
            change = self.subscription.recv() => Some(DashboardEvent::Change(change)),
            transition = session.next_transition() => Some(DashboardEvent::Session(transition)),
        }
    }

    pub async fn handle(&mut self, event: DashboardEvent) {
        match event {
            DashboardEvent::Change(change) => {
                self.store.apply(change);
            }
            DashboardEvent::Session(SessionTransition::SignedOut) => {
                info!("Session ended");
                self.leave().await;
            }
            DashboardEvent::Session(SessionTransition::SignedIn(user)) => {
                if user.id == self.user.id {
                    self.user = user;
                } else {
                    info!(user_id = %user.id, "Signed in as another user");
                    self.user = user;
                    self.store.clear();
                    self.load_user().await;
                }
            }
        }
    }

    /// Handle events until the page is unmounted or the session ends
    pub async fn run(&mut self) {
        while let Some(event) = self.next_event().await {
            self.handle(event).await;
        }
    }

    /// Apply the changes that have already arrived; returns how many there were
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Some(change) = self.subscription.try_recv() {
            self.store.apply(change);
            applied += 1;
        }
        applied
    }

    /// Fill the form and submit it
    pub async fn create(&mut self, title: &str, url: &str) -> SubmitOutcome {
        self.form.set_title(title);
        self.form.set_url(url);
        self.submit().await
    }

    /// Submit the form as it is
    pub async fn submit(&mut self) -> SubmitOutcome {
        self.form.submit(self.backend.as_ref(), &self.user.id).await
    }

    pub fn form(&self) -> &BookmarkForm {
        &self.form
    }

    /// Delete a bookmark; the list updates when the change comes back
    pub async fn delete(&self, id: &BookmarkId) -> bool {
        match self.backend.delete_bookmark(id).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to delete bookmark {}: {}", id, e);
                false
            }
        }
    }

    pub async fn logout(&mut self) {
        if let Err(e) = self.backend.sign_out().await {
            warn!("Sign out failed: {}", e);
        }
        self.leave().await;
    }

    async fn leave(&mut self) {
        self.store.clear();
        self.form.clear();
        self.unmount().await;
        self.navigator.push(Route::Login);
    }

    /// Close the change channel and stop listening for session changes
    pub async fn unmount(&mut self) {
        self.subscription.teardown().await;
        if self.session.take().is_some() {
            info!("Dashboard unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.store.list()
    }

    /// Plain-text rendering of the page
    pub fn render(&self) -> String {
        let mut out = String::from("Smart Bookmark Dashboard\n");
        out.push_str(&format!(
            "Logged in as: {}\n",
            self.user.email.as_deref().unwrap_or(&self.user.id)
        ));
        out.push('\n');

        if self.store.is_empty() {
            out.push_str("No bookmarks yet.\n");
        } else {
            for bookmark in self.store.list() {
                out.push_str(&format!("[{}] {} <{}>\n", bookmark.id, bookmark.title, bookmark.url));
            }
        }
        out
    }
}
