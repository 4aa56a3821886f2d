//! Smart Bookmarks
//!
//! A small bookmark manager on top of Supabase: users sign in with an OAuth
//! provider, then add, list and delete their own bookmarks while changes made
//! elsewhere show up live through a Realtime channel.
//!
//! The page logic ([`Dashboard`], [`LoginView`]) only talks to the backend
//! through the [`Backend`] trait; [`SupabaseBackend`] implements it with the
//! `bookmarks-auth`, `bookmarks-postgrest` and `bookmarks-realtime` crates.
//!
//! ```no_run
//! use smart_bookmarks::{AppConfig, Dashboard, HistoryNavigator, SupabaseBackend};
//! use std::sync::Arc;
//!
//! # async fn run() -> smart_bookmarks::Result<()> {
//! let config = AppConfig::from_env()?;
//! let backend = Arc::new(SupabaseBackend::new(config.clone())?);
//! let navigator = Arc::new(HistoryNavigator::new());
//!
//! if let Some(mut dashboard) = Dashboard::mount(backend, navigator, &config).await {
//!     println!("{}", dashboard.render());
//!     dashboard.unmount().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod form;
pub mod login;
pub mod models;
pub mod routing;
pub mod session;
pub mod store;
pub mod subscription;
pub mod supabase;

pub use backend::{Backend, ChannelHandle};
pub use config::{AppConfig, InsertOrder};
pub use dashboard::{Dashboard, DashboardEvent};
pub use error::{Error, Result};
pub use form::{BookmarkForm, SubmitOutcome};
pub use login::LoginView;
pub use models::{Bookmark, BookmarkChange, BookmarkId, NewBookmark};
pub use routing::{HistoryNavigator, Navigator, Route};
pub use session::{SessionGuard, SessionTransition};
pub use store::BookmarkStore;
pub use subscription::ChangeSubscription;
pub use supabase::SupabaseBackend;

pub use bookmarks_auth::{AuthChangeEvent, AuthEvent, OAuthProvider, Session, User};

/// Re-exports for applications
pub mod prelude {
    pub use crate::backend::Backend;
    pub use crate::config::AppConfig;
    pub use crate::dashboard::{Dashboard, DashboardEvent};
    pub use crate::error::{Error, Result};
    pub use crate::login::LoginView;
    pub use crate::models::{Bookmark, BookmarkId};
    pub use crate::routing::{HistoryNavigator, Navigator, Route};
    pub use crate::supabase::SupabaseBackend;
}
