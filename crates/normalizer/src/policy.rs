use crate::error::{NormalizerError, Result};
use crate::phone::CanonicalPhone;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Rules that turn a raw field into a [`CanonicalPhone`].
///
/// The default policy targets NANP national numbers: ten digits, with a
/// leading `1` country code removed from eleven-digit input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationPolicy {
    /// Country or trunk prefixes removed from over-long input, tried in order
    pub strip_prefixes: Vec<String>,

    /// Minimum accepted digit count after prefix stripping
    pub min_len: usize,

    /// Maximum accepted digit count after prefix stripping
    pub max_len: usize,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            strip_prefixes: vec!["1".to_string()],
            min_len: 10,
            max_len: 10,
        }
    }
}

impl NormalizationPolicy {
    pub fn new(strip_prefixes: Vec<String>, min_len: usize, max_len: usize) -> Result<Self> {
        let policy = Self {
            strip_prefixes,
            min_len,
            max_len,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.min_len == 0 {
            return Err(NormalizerError::invalid_policy("min_len must be > 0"));
        }
        if self.min_len > self.max_len {
            return Err(NormalizerError::invalid_policy(format!(
                "min_len ({}) cannot exceed max_len ({})",
                self.min_len, self.max_len
            )));
        }
        if let Some(bad) = self
            .strip_prefixes
            .iter()
            .find(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(NormalizerError::invalid_policy(format!(
                "strip prefix {bad:?} must be non-empty digits"
            )));
        }
        Ok(())
    }

    /// Normalize one raw field. Returns `None` for anything that cannot be a
    /// phone under this policy; never fails.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<CanonicalPhone> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        let digits = self.strip_prefix(digits);
        if !self.accepts_len(digits.len()) {
            return None;
        }
        Some(CanonicalPhone::from_digits(digits))
    }

    fn accepts_len(&self, len: usize) -> bool {
        (self.min_len..=self.max_len).contains(&len)
    }

    // Only over-long input is a candidate, which keeps canonical output a fixed point.
    fn strip_prefix(&self, digits: String) -> String {
        if digits.len() <= self.max_len {
            return digits;
        }
        for prefix in &self.strip_prefixes {
            if let Some(rest) = digits.strip_prefix(prefix.as_str()) {
                if self.accepts_len(rest.len()) {
                    return rest.to_string();
                }
            }
        }
        digits
    }
}

/// Normalize with the default policy.
#[must_use]
pub fn normalize(raw: &str) -> Option<CanonicalPhone> {
    static DEFAULT: OnceLock<NormalizationPolicy> = OnceLock::new();
    DEFAULT
        .get_or_init(NormalizationPolicy::default)
        .normalize(raw)
}
