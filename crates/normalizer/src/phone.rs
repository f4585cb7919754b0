use crate::error::NormalizerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized phone number: ASCII digits only, never empty.
///
/// Values come out of [`crate::NormalizationPolicy::normalize`]. Stores that
/// hand back previously written keys re-enter through [`CanonicalPhone::parse`],
/// which only checks the structural shape because the length policy was
/// already applied on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CanonicalPhone(String);

impl CanonicalPhone {
    pub(crate) fn from_digits(digits: String) -> Self {
        debug_assert!(!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
        Self(digits)
    }

    /// Re-validate the shape of a stored key: non-empty, ASCII digits only.
    ///
    /// The length policy is not applied here. Use
    /// [`crate::NormalizationPolicy::normalize`] for untrusted input.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CanonicalPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalPhone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CanonicalPhone {
    type Error = NormalizerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(NormalizerError::NotCanonical(value));
        }
        Ok(Self(value))
    }
}

impl From<CanonicalPhone> for String {
    fn from(value: CanonicalPhone) -> Self {
        value.0
    }
}
