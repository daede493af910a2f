//! Document Store Domain Models
//!
//! - `TagSet`: normalized tags of one document
//! - `NewDocument`: write model handed to a backend
//! - `StoredDocument`: read model returned to callers
//! - `SearchHit` / `TagCount`: query result rows

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Document key (fixed length, drawn from the key generator alphabet)
pub type DocumentKey = String;

/// Normalized tag set.
///
/// Tags arrive as one comma separated string. Each entry is trimmed, empty and
/// whitespace-only entries are dropped, duplicates collapse. Case is preserved.
/// Iteration order is lexicographic so every backend writes tags in the same
/// order.
///
/// # Examples
///
/// ```rust
/// use paste_store::domain::TagSet;
///
/// let tags = TagSet::parse(" rust, sql ,, rust, ");
/// assert_eq!(tags.len(), 2);
/// assert_eq!(tags.joined(), "rust,sql");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated tag list
    pub fn parse(raw: &str) -> Self {
        raw.split(',').collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma joined form, as stored in the `tags` column and the registry hash
    pub fn joined(&self) -> String {
        self.iter().collect::<Vec<_>>().join(",")
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|tag| tag.as_ref().trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Document to persist
///
/// The key is chosen before the write (by `DocumentHandler`); backends never
/// invent keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub key: DocumentKey,
    /// Opaque text blob, stored byte-for-byte
    pub value: String,
    /// Searchable title (may be empty)
    pub title: String,
    pub tags: TagSet,
}

impl NewDocument {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            title: String::new(),
            tags: TagSet::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }
}

/// Document returned by `DocumentHandler::get`, serialized as `{"data": .., "key": ..}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub data: String,
    pub key: DocumentKey,
}

/// One search result row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub key: DocumentKey,
    pub title: String,
}

/// Live-document count for one tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

/// Sort rows the way every backend reports them: count descending, tag ascending
pub(crate) fn sort_tag_counts(counts: &mut [TagCount]) {
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
}

/// Case-insensitive substring match used by backends without a query engine
pub(crate) fn matches_term(haystack: &str, term_lower: &str) -> bool {
    haystack.to_lowercase().contains(term_lower)
}
