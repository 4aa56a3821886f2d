//! Session check on mount and session transitions afterwards

use crate::backend::Backend;
use crate::routing::{Navigator, Route};
use bookmarks_auth::{AuthChangeEvent, AuthEvent, User};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// What happened to the session while the page was open
#[derive(Debug, Clone, PartialEq)]
pub enum SessionTransition {
    SignedOut,
    /// A session is present, possibly for another user than before
    SignedIn(User),
}

/// Holds the page's subscription to session changes
pub struct SessionGuard {
    events: broadcast::Receiver<AuthChangeEvent>,
}

impl SessionGuard {
    /// Look up the current session
    ///
    /// Without a session, or when the lookup fails, the user is sent to the
    /// login route and `None` is returned. No retry.
    pub async fn check(backend: &dyn Backend, navigator: &dyn Navigator) -> Option<(User, SessionGuard)> {
        // subscribe before reading so a transition in between is not lost
        let events = backend.on_auth_state_change();

        match backend.get_session().await {
            Ok(Some(session)) => {
                debug!(user_id = %session.user.id, "Session present");
                Some((session.user, SessionGuard { events }))
            }
            Ok(None) => {
                info!("No session, redirecting to login");
                navigator.push(Route::Login);
                None
            }
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                navigator.push(Route::Login);
                None
            }
        }
    }

    /// Wait for the next session transition
    ///
    /// Cancel safe. Pends forever once the backend drops its notifier.
    pub async fn next_transition(&mut self) -> SessionTransition {
        loop {
            match self.events.recv().await {
                Ok(AuthChangeEvent { event, session }) => {
                    return match (event, session) {
                        (AuthEvent::SignedOut, _) | (_, None) => SessionTransition::SignedOut,
                        (_, Some(session)) => SessionTransition::SignedIn(session.user),
                    };
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session notifications");
                }
                Err(RecvError::Closed) => {
                    debug!("Session notifier closed");
                    std::future::pending::<()>().await;
                }
            }
        }
    }
}
