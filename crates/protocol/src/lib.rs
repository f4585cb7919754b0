use serde::{Deserialize, Serialize};
use std::fmt;

pub mod tags;

pub use phone_matcher_normalizer::CanonicalPhone;
pub use tags::{clean_tag, merge_tag, TagMap};

/// Identifier of the admin account that first uploaded a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Build an owner id; blank input is rejected.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: u64,
    pub phone: CanonicalPhone,
    pub owner: OwnerId,
    /// Unix seconds
    pub created_at: u64,
}

/// A client candidate: phone plus the optional tag it arrived with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub phone: CanonicalPhone,
    pub tag: Option<String>,
}

/// One line of a tagged match result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedRecord {
    pub tag: Option<String>,
    pub phone: CanonicalPhone,
}

/// Phones found absent from the registry for one match request.
///
/// Insertion-ordered; merging follows [`merge_tag`].
#[derive(Debug, Clone, Default)]
pub struct UnmatchedSet {
    entries: TagMap,
}

impl UnmatchedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, phone: CanonicalPhone, tag: Option<String>) {
        self.entries.insert(phone, tag);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn tag_of(&self, phone: &CanonicalPhone) -> Option<&str> {
        self.entries.tag_of(phone)
    }

    #[must_use]
    pub fn contains(&self, phone: &CanonicalPhone) -> bool {
        self.entries.contains(phone)
    }

    /// Shape the set for output: a flat phone list when no tag was ever seen
    /// in the request, tagged records otherwise.
    #[must_use]
    pub fn into_output(self, had_any_tag: bool) -> MatchOutput {
        let entries = self.entries.into_entries();
        if had_any_tag {
            MatchOutput::Tagged(
                entries
                    .into_iter()
                    .map(|(phone, tag)| UnmatchedRecord { tag, phone })
                    .collect(),
            )
        } else {
            MatchOutput::Phones(entries.into_iter().map(|(phone, _)| phone).collect())
        }
    }
}

/// What a match request hands to the output encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum MatchOutput {
    Phones(Vec<CanonicalPhone>),
    Tagged(Vec<UnmatchedRecord>),
}

impl MatchOutput {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Phones(rows) => rows.len(),
            Self::Tagged(rows) => rows.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn is_tagged(&self) -> bool {
        matches!(self, Self::Tagged(_))
    }
}

/// A page of registry rows, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPage {
    pub entries: Vec<RegistryEntry>,
    pub total: u64,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl RegistryPage {
    #[must_use]
    pub fn pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }
}
