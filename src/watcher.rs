//! Clipboard-style URL detection
//!
//! The presentation layer polls its clipboard and offers the text here; a
//! URL is handed back at most once in a row so the same copied link does not
//! start a new download on every poll.

use crate::utils::is_valid_url;

#[derive(Debug, Default, Clone)]
pub struct UrlWatcher {
    last_url: Option<String>,
}

impl UrlWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the trimmed URL if `text` is a valid URL different from the last one accepted
    pub fn offer(&mut self, text: &str) -> Option<String> {
        let candidate = text.trim();
        if candidate.is_empty() || self.last_url.as_deref() == Some(candidate) {
            return None;
        }
        if !is_valid_url(candidate) {
            return None;
        }

        debug!(url = candidate, "New URL detected");
        self.last_url = Some(candidate.to_string());
        self.last_url.clone()
    }

    /// The most recently accepted URL
    pub fn last_url(&self) -> Option<&str> {
        self.last_url.as_deref()
    }
}
