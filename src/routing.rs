//! The two destinations of the app

use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    Dashboard,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/",
            Route::Dashboard => "/dashboard",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Moves the user agent to another route
pub trait Navigator: Send + Sync {
    fn push(&self, route: Route);
}

/// Navigator that only records where it was sent
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    history: Mutex<Vec<Route>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The last route pushed
    pub fn current(&self) -> Option<Route> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }

    pub fn history(&self) -> Vec<Route> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for HistoryNavigator {
    fn push(&self, route: Route) {
        debug!(%route, "Navigating");
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}
