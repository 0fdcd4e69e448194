//! Page location and reload primitive.

#[cfg(test)]
use std::sync::Mutex;

use url::Url;

pub trait Navigator: Send + Sync {
    fn location(&self) -> Url;
    /// Rewrite the current location without loading anything
    fn replace_history(&self, url: Url);
    /// Load `url` in place of the current entry
    fn navigate_replace(&self, url: Url);
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    HistoryReplace(Url),
    Reload(Url),
}

/// Records navigations instead of performing them
#[cfg(test)]
#[derive(Debug)]
pub struct MemoryNavigator {
    location: Mutex<Url>,
    history: Mutex<Vec<Navigation>>,
}

#[cfg(test)]
impl MemoryNavigator {
    pub fn new(location: Url) -> Self {
        Self {
            location: Mutex::new(location),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn reloads(&self) -> Vec<Url> {
        self.history()
            .into_iter()
            .filter_map(|n| match n {
                Navigation::Reload(url) => Some(url),
                Navigation::HistoryReplace(_) => None,
            })
            .collect()
    }

    fn record(&self, url: Url, navigation: Navigation) {
        *self.location.lock().unwrap_or_else(|e| e.into_inner()) = url;
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(navigation);
    }
}

#[cfg(test)]
impl Navigator for MemoryNavigator {
    fn location(&self) -> Url {
        self.location
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn replace_history(&self, url: Url) {
        self.record(url.clone(), Navigation::HistoryReplace(url));
    }

    fn navigate_replace(&self, url: Url) {
        self.record(url.clone(), Navigation::Reload(url));
    }
}
