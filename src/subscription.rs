//! The page's single live change channel

use crate::backend::{Backend, ChannelHandle};
use crate::error::Result;
use crate::models::BookmarkChange;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// At most one open channel per page; a new one replaces the old one.
pub struct ChangeSubscription {
    backend: Arc<dyn Backend>,
    active: Option<ChannelHandle>,
    changes: Option<mpsc::UnboundedReceiver<BookmarkChange>>,
}

impl ChangeSubscription {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            active: None,
            changes: None,
        }
    }

    /// Open the channel for `user_id`, closing the current one first
    pub async fn establish(&mut self, user_id: &str) -> Result<()> {
        self.teardown().await;

        let (sink, changes) = mpsc::unbounded_channel();
        let handle = self.backend.subscribe_bookmarks(user_id, sink).await?;
        debug!(topic = handle.topic(), "Change channel established");
        self.active = Some(handle);
        self.changes = Some(changes);
        Ok(())
    }

    /// Close the open channel, if any. A failed removal is logged only.
    pub async fn teardown(&mut self) {
        self.changes = None;
        if let Some(handle) = self.active.take() {
            debug!(topic = handle.topic(), "Tearing down change channel");
            if let Err(e) = self.backend.remove_channel(handle).await {
                warn!("Failed to remove change channel: {}", e);
            }
        }
    }

    /// Next change from the open channel
    ///
    /// Cancel safe. Pends while no channel is open.
    pub async fn recv(&mut self) -> BookmarkChange {
        loop {
            match self.changes.as_mut() {
                Some(changes) => match changes.recv().await {
                    Some(change) => return change,
                    None => {
                        warn!("Change channel closed, live updates stopped");
                        self.changes = None;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        }
    }

    /// A change that has already arrived, without waiting
    pub fn try_recv(&mut self) -> Option<BookmarkChange> {
        self.changes.as_mut().and_then(|changes| changes.try_recv().ok())
    }
}
