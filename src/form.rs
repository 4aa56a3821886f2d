//! The "add bookmark" form

use crate::backend::Backend;
use crate::models::NewBookmark;
use tracing::{debug, error};

/// Result of [`BookmarkForm::submit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A field was blank; nothing was sent
    Skipped,
    Created,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct BookmarkForm {
    title: String,
    url: String,
}

impl BookmarkForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn clear(&mut self) {
        self.title.clear();
        self.url.clear();
    }

    /// Create a bookmark from the current input
    ///
    /// The new row shows up in the list through the change channel, not
    /// here. On success the fields are cleared; on failure they are kept.
    pub async fn submit(&mut self, backend: &dyn Backend, user_id: &str) -> SubmitOutcome {
        let title = self.title.trim();
        let url = self.url.trim();
        if title.is_empty() || url.is_empty() {
            debug!("Title or URL empty, not submitting");
            return SubmitOutcome::Skipped;
        }

        let bookmark = NewBookmark {
            title: title.to_string(),
            url: url.to_string(),
            user_id: user_id.to_string(),
        };

        match backend.insert_bookmark(&bookmark).await {
            Ok(()) => {
                self.clear();
                SubmitOutcome::Created
            }
            Err(e) => {
                error!("Failed to add bookmark: {}", e);
                SubmitOutcome::Failed
            }
        }
    }
}
