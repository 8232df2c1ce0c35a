//! Pattern-based detection of error kinds from free-form error text.
//!
//! Exceptions raised by transports rarely carry structured data; the only
//! signal is the message. The detector matches that text against an ordered
//! list of regex patterns and reports the kind of the first match.

use regex::Regex;

use super::ErrorKind;

/// A pattern for matching errors in text output.
#[derive(Debug)]
pub struct ErrorPattern {
    /// The compiled regex pattern.
    regex: Regex,
    /// The kind to assign when this pattern matches.
    kind: ErrorKind,
    /// A human-readable description of what this pattern detects.
    description: String,
}

impl ErrorPattern {
    /// Creates a new error pattern.
    ///
    /// # Errors
    /// Returns the regex compile error if `pattern` is invalid.
    pub fn new(
        pattern: &str,
        kind: ErrorKind,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self::with_regex(Regex::new(pattern)?, kind, description))
    }

    /// Creates a new error pattern with a pre-compiled regex.
    pub fn with_regex(regex: Regex, kind: ErrorKind, description: impl Into<String>) -> Self {
        Self {
            regex,
            kind,
            description: description.into(),
        }
    }

    /// Returns the regex pattern.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Returns the kind assigned on match.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Checks if this pattern matches the given text.
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// A successful detection: which pattern matched and on what text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection<'a> {
    pub kind: ErrorKind,
    pub description: &'a str,
    pub matched: &'a str,
}

/// Classifies error text by ordered pattern matching.
#[derive(Debug)]
pub struct ErrorDetector {
    /// The list of patterns to match against, in priority order.
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Connectivity failures as reported by browsers, fetch shims, and OS sockets.
const CONNECTIVITY_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)failed\s+to\s+fetch", "Fetch failed before a response"),
    (r"(?i)network\s*(error|failure|request\s+failed)", "Network error"),
    (
        r"(?i)connection\s*(refused|reset|closed|aborted|failed)",
        "Connection error",
    ),
    (
        r"\b(ECONNREFUSED|ECONNRESET|ECONNABORTED|ENOTFOUND|ENETUNREACH|EHOSTUNREACH|EAI_AGAIN)\b",
        "Socket error code",
    ),
    (r"(?i)\b(offline|no\s+internet)\b", "Client is offline"),
    (r"(?i)dns\s*(lookup|resolution)\s*failed", "DNS failure"),
    (r"(?i)load\s+failed", "Resource load failed"),
];

impl ErrorDetector {
    /// Creates a detector with the built-in connectivity patterns.
    pub fn new() -> Self {
        Self {
            patterns: Self::default_patterns(),
        }
    }

    /// Creates an error detector with custom patterns.
    pub fn with_patterns(patterns: Vec<ErrorPattern>) -> Self {
        Self { patterns }
    }

    fn default_patterns() -> Vec<ErrorPattern> {
        CONNECTIVITY_PATTERNS
            .iter()
            .filter_map(|(pattern, description)| {
                match ErrorPattern::new(pattern, ErrorKind::Network, *description) {
                    Ok(pattern) => Some(pattern),
                    Err(err) => {
                        tracing::error!(%err, "built-in connectivity pattern failed to compile");
                        None
                    }
                }
            })
            .collect()
    }

    /// Adds a custom pattern to the detector.
    pub fn add_pattern(&mut self, pattern: ErrorPattern) {
        self.patterns.push(pattern);
    }

    /// Returns the number of patterns configured.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Returns a reference to all configured patterns.
    pub fn patterns(&self) -> &[ErrorPattern] {
        &self.patterns
    }

    /// Matches `text` against all patterns in order and reports the first hit.
    pub fn detect<'a>(&'a self, text: &'a str) -> Option<Detection<'a>> {
        self.patterns.iter().find_map(|pattern| {
            pattern.regex.find(text).map(|m| Detection {
                kind: pattern.kind,
                description: &pattern.description,
                matched: m.as_str(),
            })
        })
    }

    /// Returns the kind of the first matching pattern, if any.
    pub fn detect_kind(&self, text: &str) -> Option<ErrorKind> {
        self.detect(text).map(|detection| detection.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_builtin_patterns_compile() {
        let detector = ErrorDetector::new();
        assert_eq!(detector.pattern_count(), CONNECTIVITY_PATTERNS.len());
    }

    #[test]
    fn test_detect_fetch_failure() {
        let detector = ErrorDetector::new();
        let detection = detector
            .detect("TypeError: Failed to fetch")
            .expect("should detect");
        assert_eq!(detection.kind, ErrorKind::Network);
        assert_eq!(detection.matched, "Failed to fetch");
    }

    #[test]
    fn test_detect_socket_codes() {
        let detector = ErrorDetector::new();
        for text in [
            "connect ECONNREFUSED 127.0.0.1:8080",
            "getaddrinfo ENOTFOUND api.example.com",
            "Connection reset by peer",
            "Network Error",
            "The browser is offline",
        ] {
            assert_eq!(
                detector.detect_kind(text),
                Some(ErrorKind::Network),
                "{text}"
            );
        }
    }

    #[test]
    fn test_no_match_for_ordinary_errors() {
        let detector = ErrorDetector::new();
        assert_eq!(
            detector.detect_kind("Cannot read properties of undefined"),
            None
        );
        assert_eq!(detector.detect_kind(""), None);
    }

    #[test]
    fn test_custom_patterns_take_their_own_kind() {
        let mut detector = ErrorDetector::with_patterns(vec![]);
        detector.add_pattern(
            ErrorPattern::new(r"(?i)gateway\s+timeout", ErrorKind::Timeout, "Gateway timeout")
                .unwrap(),
        );
        assert_eq!(
            detector.detect_kind("504 Gateway Timeout"),
            Some(ErrorKind::Timeout)
        );
        assert_eq!(detector.detect_kind("Failed to fetch"), None);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(ErrorPattern::new(r"(unclosed", ErrorKind::Network, "bad").is_err());
    }
}
