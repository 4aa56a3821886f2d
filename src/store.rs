//! The client-side bookmark list

use crate::config::InsertOrder;
use crate::models::{Bookmark, BookmarkChange, BookmarkId};
use tracing::trace;

/// Ordered copy of the user's bookmarks
///
/// Filled once by [`BookmarkStore::replace_all`] and then kept current by
/// applying changes. Inserting an id that is already present does nothing,
/// which reconciles the initial fetch with the change channel whatever order
/// they complete in.
#[derive(Debug, Clone, Default)]
pub struct BookmarkStore {
    bookmarks: Vec<Bookmark>,
    insert_order: InsertOrder,
}

impl BookmarkStore {
    pub fn new(insert_order: InsertOrder) -> Self {
        Self {
            bookmarks: Vec::new(),
            insert_order,
        }
    }

    /// Replace the contents with a fetched list, keeping its order
    pub fn replace_all(&mut self, bookmarks: Vec<Bookmark>) {
        self.bookmarks = bookmarks;
    }

    /// Add a bookmark unless its id is already present. Returns whether it was added.
    pub fn insert(&mut self, bookmark: Bookmark) -> bool {
        if self.contains(&bookmark.id) {
            trace!(id = %bookmark.id, "Duplicate insert ignored");
            return false;
        }

        let index = match self.insert_order {
            InsertOrder::Prepend => 0,
            InsertOrder::CreatedAtDesc => self
                .bookmarks
                .iter()
                .position(|b| b.created_at <= bookmark.created_at)
                .unwrap_or(self.bookmarks.len()),
        };
        self.bookmarks.insert(index, bookmark);
        true
    }

    /// Remove the bookmark with `id`. Returns whether one was removed.
    pub fn remove(&mut self, id: &BookmarkId) -> bool {
        let before = self.bookmarks.len();
        self.bookmarks.retain(|b| &b.id != id);
        self.bookmarks.len() != before
    }

    pub fn apply(&mut self, change: BookmarkChange) -> bool {
        match change {
            BookmarkChange::Insert(bookmark) => self.insert(bookmark),
            BookmarkChange::Delete(id) => self.remove(&id),
        }
    }

    pub fn clear(&mut self) {
        self.bookmarks.clear();
    }

    pub fn contains(&self, id: &BookmarkId) -> bool {
        self.bookmarks.iter().any(|b| &b.id == id)
    }

    pub fn list(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn len(&self) -> usize {
        self.bookmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.is_empty()
    }
}
