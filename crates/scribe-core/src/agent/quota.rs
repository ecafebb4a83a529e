//! Quota-exhaustion classification.
//!
//! Vendors report exhausted credits as ordinary error text, either in a
//! non-success response body or as an in-band `{error}` chunk.  Matching is a
//! case-insensitive substring test against configured phrases.

use crate::error::ScribeError;

/// Classifies vendor failures as quota exhaustion or not.
#[derive(Debug, Clone)]
pub struct QuotaDetector {
    phrases: Vec<String>,
}

impl QuotaDetector {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether `text` contains a quota phrase.
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.phrases.iter().any(|phrase| text.contains(phrase))
    }

    /// Whether `err` is a vendor failure carrying a quota phrase.
    ///
    /// Only non-success HTTP responses and in-band vendor errors qualify;
    /// network, parse, and local failures never do.
    pub fn is_quota_error(&self, err: &ScribeError) -> bool {
        match err {
            ScribeError::HttpStatus { .. } | ScribeError::Vendor { .. } => {
                self.matches(&err.vendor_text())
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> QuotaDetector {
        QuotaDetector::new(["Insufficient credits", "quota exceeded", "  "])
    }

    #[test]
    fn matching_ignores_case() {
        let d = detector();
        assert!(d.matches("Error: INSUFFICIENT CREDITS for this request"));
        assert!(!d.matches("model not found"));
    }

    #[test]
    fn blank_phrases_never_match_everything() {
        assert!(!detector().matches("anything at all"));
    }

    #[test]
    fn only_vendor_errors_are_classified() {
        let d = detector();
        assert!(d.is_quota_error(&ScribeError::HttpStatus {
            status: 402,
            body: r#"{"error":{"message":"Insufficient credits"}}"#.into(),
        }));
        assert!(d.is_quota_error(&ScribeError::Vendor {
            message: "Quota exceeded for model".into(),
        }));
        assert!(!d.is_quota_error(&ScribeError::HttpStatus {
            status: 500,
            body: "internal".into(),
        }));
        assert!(!d.is_quota_error(&ScribeError::Request {
            reason: "insufficient credits".into(),
        }));
    }
}
