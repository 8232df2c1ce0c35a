//! The closed error taxonomy and its user-facing message templates.
//!
//! Every failure the classifier sees resolves to exactly one [`ErrorKind`].
//! The text shown to users is looked up from [`ErrorKind::user_message`] and
//! never built from the raw server or exception text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The cause of a failure, as seen by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No connectivity, DNS failure, refused or dropped connection.
    Network,
    /// Server-side failure (HTTP 5xx other than 503).
    Server,
    /// Client-side failure (HTTP 4xx without a more specific kind, or a local exception).
    Client,
    /// Missing or expired credentials (HTTP 401).
    Authentication,
    /// Authenticated but not permitted (HTTP 403).
    Authorization,
    /// The request payload was rejected.
    Validation,
    /// The requested resource does not exist (HTTP 404).
    NotFound,
    /// The request or transport timed out (HTTP 408).
    Timeout,
    /// The service is temporarily unavailable (HTTP 503).
    ServiceUnavailable,
    /// Anything the classifier could not place.
    Unknown,
}

/// A title/message/action-label triple shown to users for a kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct UserMessage {
    pub title: &'static str,
    pub message: &'static str,
    pub action_label: &'static str,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 10] = [
        ErrorKind::Network,
        ErrorKind::Server,
        ErrorKind::Client,
        ErrorKind::Authentication,
        ErrorKind::Authorization,
        ErrorKind::Validation,
        ErrorKind::NotFound,
        ErrorKind::Timeout,
        ErrorKind::ServiceUnavailable,
        ErrorKind::Unknown,
    ];

    /// The snake_case name used in configuration and JSON.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::Client => "client",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Returns the fixed user-facing template for this kind.
    pub fn user_message(self) -> UserMessage {
        match self {
            ErrorKind::Network => UserMessage {
                title: "Connection Problem",
                message: "Unable to reach the server. Please check your internet connection.",
                action_label: "Try Again",
            },
            ErrorKind::Server => UserMessage {
                title: "Server Error",
                message: "Something went wrong on our end. Please try again later.",
                action_label: "Try Again",
            },
            ErrorKind::Client => UserMessage {
                title: "Request Error",
                message: "The request could not be completed. Please review and try again.",
                action_label: "Go Back",
            },
            ErrorKind::Authentication => UserMessage {
                title: "Session Expired",
                message: "Your session has expired. Please sign in again.",
                action_label: "Sign In",
            },
            ErrorKind::Authorization => UserMessage {
                title: "Access Denied",
                message: "You do not have permission to perform this action.",
                action_label: "Go Back",
            },
            ErrorKind::Validation => UserMessage {
                title: "Invalid Input",
                message: "Some of the information provided is invalid. Please correct it and try again.",
                action_label: "Review",
            },
            ErrorKind::NotFound => UserMessage {
                title: "Not Found",
                message: "The requested item could not be found.",
                action_label: "Go Back",
            },
            ErrorKind::Timeout => UserMessage {
                title: "Request Timed Out",
                message: "The server took too long to respond. Please try again.",
                action_label: "Try Again",
            },
            ErrorKind::ServiceUnavailable => UserMessage {
                title: "Service Unavailable",
                message: "The service is temporarily unavailable. Please try again in a few minutes.",
                action_label: "Try Again",
            },
            ErrorKind::Unknown => UserMessage {
                title: "Something Went Wrong",
                message: "An unexpected error occurred. Please try again.",
                action_label: "Try Again",
            },
        }
    }

    /// Kinds caused by the caller or by missing permission, where a retry cannot succeed.
    pub fn is_caller_fixable(self) -> bool {
        matches!(
            self,
            ErrorKind::Authentication
                | ErrorKind::Authorization
                | ErrorKind::Validation
                | ErrorKind::NotFound
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name an [`ErrorKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error kind: {0}")]
pub struct ParseErrorKindError(pub String);

impl FromStr for ErrorKind {
    type Err = ParseErrorKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| ParseErrorKindError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_a_distinct_template() {
        let mut messages: Vec<&str> = ErrorKind::ALL
            .iter()
            .map(|kind| kind.user_message().message)
            .collect();
        messages.sort_unstable();
        messages.dedup();
        assert_eq!(messages.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn test_from_str_roundtrips_names() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.as_str().parse::<ErrorKind>(), Ok(kind));
        }
        assert_eq!("Not-Found".parse::<ErrorKind>(), Ok(ErrorKind::NotFound));
        assert!("teapot".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ServiceUnavailable).unwrap();
        assert_eq!(json, "\"service_unavailable\"");
        let kind: ErrorKind = serde_json::from_str("\"not_found\"").unwrap();
        assert_eq!(kind, ErrorKind::NotFound);
    }

    #[test]
    fn test_caller_fixable_kinds() {
        let fixable: Vec<ErrorKind> = ErrorKind::ALL
            .into_iter()
            .filter(|kind| kind.is_caller_fixable())
            .collect();
        assert_eq!(
            fixable,
            vec![
                ErrorKind::Authentication,
                ErrorKind::Authorization,
                ErrorKind::Validation,
                ErrorKind::NotFound,
            ]
        );
    }
}
