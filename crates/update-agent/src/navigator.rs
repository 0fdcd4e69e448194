//! Location handling for a headless session.
//!
//! The "page" is the process: a reload hands the new location to the
//! supervisor and the process exits so it can be relaunched there.

use std::sync::Mutex;

use services::services::navigator::Navigator;
use tokio::sync::mpsc;
use tracing::{debug, info};
use url::Url;

pub struct ProcessNavigator {
    location: Mutex<Url>,
    reloads: mpsc::UnboundedSender<Url>,
}

impl ProcessNavigator {
    pub fn new(location: Url, reloads: mpsc::UnboundedSender<Url>) -> Self {
        Self {
            location: Mutex::new(location),
            reloads,
        }
    }

    fn set_location(&self, url: Url) {
        *self.location.lock().unwrap_or_else(|e| e.into_inner()) = url;
    }
}

impl Navigator for ProcessNavigator {
    fn location(&self) -> Url {
        self.location
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace_history(&self, url: Url) {
        debug!(location = %url, "Location rewritten");
        self.set_location(url);
    }

    fn navigate_replace(&self, url: Url) {
        info!(location = %url, "Reload requested");
        self.set_location(url.clone());
        // Receiver gone means the session is already shutting down
        if let Err(e) = self.reloads.send(url) {
            debug!(location = %e.0, "Reload dropped, session is shutting down");
        }
    }
}
