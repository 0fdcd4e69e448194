//! Query parameters used by the reload handshake.
//!
//! A forced reload appends a cache-busting value and the post-update marker to
//! the page location. The next session detects the marker (its value is
//! ignored) and strips both parameters again without navigating.

use url::Url;

pub const DEFAULT_CACHE_BUST_PARAM: &str = "_t";
pub const DEFAULT_MARKER_PARAM: &str = "_updated";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParams {
    pub cache_bust: String,
    pub marker: String,
}

impl Default for UrlParams {
    fn default() -> Self {
        Self {
            cache_bust: DEFAULT_CACHE_BUST_PARAM.to_string(),
            marker: DEFAULT_MARKER_PARAM.to_string(),
        }
    }
}

impl UrlParams {
    /// True when the location carries the post-update marker, whatever its value
    pub fn has_marker(&self, url: &Url) -> bool {
        url.query_pairs().any(|(key, _)| key == self.marker.as_str())
    }

    /// Location to reload into after an update
    pub fn reload_target(&self, url: &Url, now_ms: i64) -> Url {
        let mut target = self.strip_reload_params(url);
        target
            .query_pairs_mut()
            .append_pair(&self.cache_bust, &now_ms.to_string())
            .append_pair(&self.marker, "true");
        target
    }

    /// Remove the cache buster and marker, keeping every other parameter in order
    pub fn strip_reload_params(&self, url: &Url) -> Url {
        self.retain_pairs(url, |key| key != self.cache_bust && key != self.marker)
    }

    /// Descriptor URL with a fresh cache-busting value
    pub fn cache_busted(&self, url: &Url, now_ms: i64) -> Url {
        let mut target = self.retain_pairs(url, |key| key != self.cache_bust);
        target
            .query_pairs_mut()
            .append_pair(&self.cache_bust, &now_ms.to_string());
        target
    }

    fn retain_pairs(&self, url: &Url, keep: impl Fn(&str) -> bool) -> Url {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| keep(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut target = url.clone();
        if kept.is_empty() {
            target.set_query(None);
        } else {
            target.query_pairs_mut().clear().extend_pairs(kept);
        }
        target
    }
}
