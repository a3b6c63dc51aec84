//! Redirect cache for deferred resolution
//!
//! Maps an original request URL to the redirect target the server last named
//! in a 307 or 429 `Location` header. Entries never expire; a newer redirect
//! overwrites the old one. Shared by reference between resolvers, so it lives
//! exactly as long as the host keeps it.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Original URL to remembered redirect target.
#[derive(Debug, Default)]
pub struct LocationMap {
    redirects: RwLock<HashMap<String, String>>,
}

impl LocationMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// The URL to call for `url`: the remembered target, or `url` itself.
    pub fn effective_url(&self, url: &str) -> String {
        self.redirects
            .read()
            .get(url)
            .cloned()
            .unwrap_or_else(|| url.to_string())
    }

    /// Remembered target for `url`, if any.
    pub fn get(&self, url: &str) -> Option<String> {
        self.redirects.read().get(url).cloned()
    }

    /// Remember that `url` now lives at `target`.
    pub fn remember(&self, url: &str, target: &str) {
        debug!(url, target, "remembering redirect");
        self.redirects
            .write()
            .insert(url.to_string(), target.to_string());
    }

    /// Number of remembered redirects
    pub fn len(&self) -> usize {
        self.redirects.read().len()
    }

    /// Whether no redirect is remembered
    pub fn is_empty(&self) -> bool {
        self.redirects.read().is_empty()
    }
}
