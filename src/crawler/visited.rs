//! Per-entity record of URLs already fetched during a run

use std::collections::HashSet;

use url::Url;

/// Set of URLs already processed for one entity
///
/// URLs are stored without their fragment, so `page#a` and `page#b` count as
/// the same page. Membership only ever grows.
#[derive(Debug, Default, Clone)]
pub struct VisitedSet {
    urls: HashSet<String>,
}

impl VisitedSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `url`; returns `false` if it was already present
    pub fn insert(&mut self, url: &Url) -> bool {
        self.urls.insert(normalize(url))
    }

    /// Whether `url` was already recorded
    pub fn contains(&self, url: &Url) -> bool {
        self.urls.contains(&normalize(url))
    }

    /// Number of distinct URLs recorded
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Whether no URL was recorded yet
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Canonical string form used for visited checks
pub fn normalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}
