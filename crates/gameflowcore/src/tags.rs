//! Hierarchical identity tags (`Enemy.Boss`) used to address listeners.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a tag query is matched against a tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchType {
    /// Every queried tag must be present.
    #[default]
    All,
    /// At least one queried tag must be present.
    Any,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        if tag.is_empty() {
            return false;
        }
        self.0.insert(tag)
    }

    pub fn remove(&mut self, tag: &str) -> bool {
        self.0.remove(tag)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// `Enemy.Boss` in the set satisfies a query for `Enemy`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.0.iter().any(|own| {
            own == tag || (own.len() > tag.len() && own.starts_with(tag) && own.as_bytes()[tag.len()] == b'.')
        })
    }

    pub fn has_tag_exact(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    /// An empty query is satisfied by any set.
    pub fn has_all(&self, query: &TagSet) -> bool {
        query.iter().all(|tag| self.has_tag(tag))
    }

    /// An empty query is never satisfied.
    pub fn has_any(&self, query: &TagSet) -> bool {
        query.iter().any(|tag| self.has_tag(tag))
    }

    pub fn has_all_exact(&self, query: &TagSet) -> bool {
        query.iter().all(|tag| self.has_tag_exact(tag))
    }

    pub fn has_any_exact(&self, query: &TagSet) -> bool {
        query.iter().any(|tag| self.has_tag_exact(tag))
    }

    pub fn matches(&self, query: &TagSet, match_type: MatchType, exact: bool) -> bool {
        match (match_type, exact) {
            (MatchType::All, false) => self.has_all(query),
            (MatchType::Any, false) => self.has_any(query),
            (MatchType::All, true) => self.has_all_exact(query),
            (MatchType::Any, true) => self.has_any_exact(query),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for tag in iter {
            tags.insert(tag);
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchical_match() {
        let tags: TagSet = ["Enemy.Boss", "Door"].into_iter().collect();
        assert!(tags.has_tag("Enemy"));
        assert!(tags.has_tag("Enemy.Boss"));
        assert!(!tags.has_tag("Enem"));
        assert!(!tags.has_tag_exact("Enemy"));
    }

    #[test]
    fn test_match_types() {
        let tags: TagSet = ["Enemy.Boss", "Door"].into_iter().collect();
        let query: TagSet = ["Enemy", "Key"].into_iter().collect();

        assert!(tags.matches(&query, MatchType::Any, false));
        assert!(!tags.matches(&query, MatchType::All, false));
        assert!(!tags.matches(&query, MatchType::Any, true));
        assert!(tags.matches(&TagSet::new(), MatchType::All, true));
        assert!(!tags.matches(&TagSet::new(), MatchType::Any, false));
    }
}
