//! The application's "current global error".
//!
//! [`ErrorContext`] holds at most one [`ClassifiedError`]. It is an explicit
//! handle passed to whoever needs it; clones share the same slot. Writes are
//! last-write-wins and no history is kept.
//!
//! Consumers that only need a banner-level grouping use [`ErrorCategory`], a
//! coarser five-way split kept separate from [`ErrorKind`].

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{classify, ClassifiedError, ErrorKind, RawError};

/// Coarse grouping of error kinds for global notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Auth,
    Network,
    Validation,
    Server,
    Unknown,
}

impl ErrorCategory {
    pub fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Authentication | ErrorKind::Authorization => ErrorCategory::Auth,
            ErrorKind::Network | ErrorKind::Timeout => ErrorCategory::Network,
            ErrorKind::Validation | ErrorKind::Client => ErrorCategory::Validation,
            ErrorKind::Server | ErrorKind::ServiceUnavailable => ErrorCategory::Server,
            ErrorKind::NotFound | ErrorKind::Unknown => ErrorCategory::Unknown,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            ErrorCategory::Auth => "Authentication error",
            ErrorCategory::Network => "Network error",
            ErrorCategory::Validation => "Validation error",
            ErrorCategory::Server => "Server error",
            ErrorCategory::Unknown => "Error",
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            ErrorCategory::Auth => "Please sign in again or contact your administrator.",
            ErrorCategory::Network => "Please check your connection and try again.",
            ErrorCategory::Validation => "Please check the highlighted fields and try again.",
            ErrorCategory::Server => "The server could not complete the request. Please try again later.",
            ErrorCategory::Unknown => "Something unexpected happened. Please try again.",
        }
    }
}

/// Shared slot for the most recent global error.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    current: Arc<watch::Sender<Option<ClassifiedError>>>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::init()
    }
}

impl ErrorContext {
    /// Creates an empty context.
    pub fn init() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            current: Arc::new(sender),
        }
    }

    /// Classifies `raw` and makes it the current error, replacing any previous one.
    pub fn set_error(&self, raw: impl Into<RawError>) -> ClassifiedError {
        let error = classify(raw);
        tracing::debug!(kind = %error.kind(), "global error set");
        self.current.send_replace(Some(error.clone()));
        error
    }

    /// Empties the slot.
    pub fn clear_error(&self) {
        self.current.send_replace(None);
    }

    /// Returns a copy of the current error, if any.
    pub fn current(&self) -> Option<ClassifiedError> {
        self.current.borrow().clone()
    }

    pub fn has_error(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Watches the slot for changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<ClassifiedError>> {
        self.current.subscribe()
    }

    /// Formats `raw` for display by category. Does not touch the slot.
    pub fn format_error(&self, raw: impl Into<RawError>) -> String {
        format_error(raw)
    }
}

/// Classifies `raw` and renders a category-specific message.
///
/// The text is built from fixed strings and the status code only; the raw
/// message is never included.
pub fn format_error(raw: impl Into<RawError>) -> String {
    let error = classify(raw);
    let category = ErrorCategory::from_kind(error.kind());
    match error.status_code() {
        Some(status) => format!("{} ({}): {}", category.prefix(), status, category.guidance()),
        None => format!("{}: {}", category.prefix(), category.guidance()),
    }
}
