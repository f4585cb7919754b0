use crate::CanonicalPhone;
use std::collections::HashMap;

/// Trim a raw tag; blank tags count as absent.
#[must_use]
pub fn clean_tag(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
}

/// Prefer non-null, first non-null wins: an incoming tag only lands on a
/// slot that is still empty.
pub fn merge_tag(slot: &mut Option<String>, incoming: Option<String>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

/// Insertion-ordered phone → tag map with [`merge_tag`] semantics on
/// repeated phones.
#[derive(Debug, Clone, Default)]
pub struct TagMap {
    index: HashMap<CanonicalPhone, usize>,
    entries: Vec<(CanonicalPhone, Option<String>)>,
}

impl TagMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert or merge. Returns `true` when the phone was not present yet.
    pub fn insert(&mut self, phone: CanonicalPhone, tag: Option<String>) -> bool {
        if let Some(&pos) = self.index.get(&phone) {
            merge_tag(&mut self.entries[pos].1, tag);
            return false;
        }
        self.index.insert(phone.clone(), self.entries.len());
        self.entries.push((phone, tag));
        true
    }

    #[must_use]
    pub fn contains(&self, phone: &CanonicalPhone) -> bool {
        self.index.contains_key(phone)
    }

    #[must_use]
    pub fn tag_of(&self, phone: &CanonicalPhone) -> Option<&str> {
        let pos = *self.index.get(phone)?;
        self.entries[pos].1.as_deref()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn phones(&self) -> impl Iterator<Item = &CanonicalPhone> {
        self.entries.iter().map(|(phone, _)| phone)
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<(CanonicalPhone, Option<String>)> {
        self.entries
    }
}
