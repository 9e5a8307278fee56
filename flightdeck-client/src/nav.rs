//! Navigation between top-level views.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum View {
    Login,
    Dashboard,
    Alerts,
    Analyses,
}

impl View {
    pub fn title(&self) -> &'static str {
        match self {
            View::Login => "Login",
            View::Dashboard => "Dashboard",
            View::Alerts => "Alerts",
            View::Analyses => "Analyses",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            View::Login => "/login",
            View::Dashboard => "/",
            View::Alerts => "/alerts",
            View::Analyses => "/analyses",
        }
    }
}

/// The one navigation the synchronization layer performs.
pub trait Navigator: Send + Sync {
    fn go_to_login(&self);
}

/// Tracks the active view.
#[derive(Debug)]
pub struct Router {
    current: watch::Sender<View>,
}

impl Router {
    pub fn new(initial: View) -> Self {
        let (current, _) = watch::channel(initial);
        Self { current }
    }

    pub fn current(&self) -> View {
        *self.current.borrow()
    }

    pub fn navigate(&self, view: View) {
        self.current.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            info!(from = current.path(), to = view.path(), "Navigate");
            *current = view;
            true
        });
    }

    pub fn watch(&self) -> watch::Receiver<View> {
        self.current.subscribe()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(View::Dashboard)
    }
}

impl Navigator for Router {
    fn go_to_login(&self) {
        self.navigate(View::Login);
    }
}
