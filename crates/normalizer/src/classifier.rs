use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// Result of splitting a client row into its phone field and optional tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRow<'a> {
    pub phone: &'a str,
    pub tag: Option<&'a str>,
}

fn build_regex(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|_| unreachable!("built-in pattern {pattern} is valid"))
}

fn phone_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| build_regex("phone|mobile|msisdn"))
}

fn tag_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| build_regex("state|region|province"))
}

fn state_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| build_regex(r"^[a-z][a-z .'\-]{1,29}$"))
}

/// Header name looks like it names a phone column.
#[must_use]
pub fn is_phone_header(header: &str) -> bool {
    phone_header_regex().is_match(header)
}

/// Header name looks like it names a region/state column.
#[must_use]
pub fn is_tag_header(header: &str) -> bool {
    tag_header_regex().is_match(header)
}

/// Value reads like a region code or region name ("CA", "New York") rather
/// than a number.
#[must_use]
pub fn is_probably_state(value: &str) -> bool {
    state_value_regex().is_match(value.trim())
}

/// Decides which of two untyped columns holds the phone.
///
/// Decision table, evaluated in order:
///
/// | value A state-like | value B state-like | phone | tag |
/// |---|---|---|---|
/// | yes | no | B | A |
/// | no | yes | A | B |
/// | otherwise | | header matching phone pattern, else A | header matching tag pattern, else none |
#[derive(Debug, Clone, Copy, Default)]
pub struct RowClassifier;

impl RowClassifier {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify a two-column row. `headers` are the column names for
    /// `value_a` and `value_b` when the source has them.
    #[must_use]
    pub fn classify_pair<'a>(
        &self,
        value_a: &'a str,
        value_b: &'a str,
        headers: Option<(&str, &str)>,
    ) -> ClassifiedRow<'a> {
        let a_is_state = is_probably_state(value_a);
        let b_is_state = is_probably_state(value_b);

        match (a_is_state, b_is_state) {
            (true, false) => ClassifiedRow {
                phone: value_b,
                tag: Some(value_a),
            },
            (false, true) => ClassifiedRow {
                phone: value_a,
                tag: Some(value_b),
            },
            _ => Self::classify_by_headers(value_a, value_b, headers),
        }
    }

    /// Classify a row of any width. The first two fields take part in value
    /// heuristics; all headers take part in the header fallback.
    #[must_use]
    pub fn classify_row<'a>(
        &self,
        headers: &[String],
        values: &'a [String],
    ) -> Option<ClassifiedRow<'a>> {
        match values {
            [] => None,
            [only] => Some(ClassifiedRow {
                phone: only.as_str(),
                tag: None,
            }),
            [a, b, ..] => {
                let a_is_state = is_probably_state(a);
                let b_is_state = is_probably_state(b);
                if a_is_state != b_is_state {
                    return Some(self.classify_pair(a, b, None));
                }
                let phone_idx = headers.iter().position(|h| is_phone_header(h)).unwrap_or(0);
                let tag_idx = headers.iter().position(|h| is_tag_header(h));
                Some(ClassifiedRow {
                    phone: values.get(phone_idx).map_or(a.as_str(), String::as_str),
                    tag: tag_idx.and_then(|idx| values.get(idx)).map(String::as_str),
                })
            }
        }
    }

    fn classify_by_headers<'a>(
        value_a: &'a str,
        value_b: &'a str,
        headers: Option<(&str, &str)>,
    ) -> ClassifiedRow<'a> {
        let Some((header_a, header_b)) = headers else {
            return ClassifiedRow {
                phone: value_a,
                tag: None,
            };
        };

        let phone = if !is_phone_header(header_a) && is_phone_header(header_b) {
            value_b
        } else {
            value_a
        };
        let tag = if is_tag_header(header_a) {
            Some(value_a)
        } else if is_tag_header(header_b) {
            Some(value_b)
        } else {
            None
        };
        ClassifiedRow { phone, tag }
    }
}
