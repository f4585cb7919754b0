//! # Phone Matcher Normalizer
//!
//! Turns noisy spreadsheet cells into canonical phone numbers and decides
//! which column of an untyped row carries the phone.
//!
//! ## Pipeline
//!
//! ```text
//! RawField ("+1 (234) 567-8901")
//!     │
//!     ├──> strip non-digits        → "12345678901"
//!     ├──> strip country/trunk     → "2345678901"
//!     └──> length gate             → CanonicalPhone | rejected
//! ```
//!
//! ## Example
//!
//! ```rust
//! use phone_matcher_normalizer::{normalize, RowClassifier};
//!
//! let phone = normalize("+1 (234) 567-8901").unwrap();
//! assert_eq!(phone.as_str(), "2345678901");
//! assert!(normalize("908").is_none());
//!
//! let classifier = RowClassifier::new();
//! let split = classifier.classify_pair("CA", "2345678901", None);
//! assert_eq!(split.phone, "2345678901");
//! assert_eq!(split.tag.as_deref(), Some("CA"));
//! ```

mod classifier;
mod error;
mod phone;
mod policy;

pub use classifier::{
    is_phone_header, is_probably_state, is_tag_header, ClassifiedRow, RowClassifier,
};
pub use error::{NormalizerError, Result};
pub use phone::CanonicalPhone;
pub use policy::{normalize, NormalizationPolicy};
