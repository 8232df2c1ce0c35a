//! Error taxonomy and classification.
//!
//! This module turns any failure raised by a remote call, a transport, or a
//! render into a [`ClassifiedError`] with exactly one [`ErrorKind`] and a
//! fixed user-facing message.

pub mod classification;
pub mod detector;
pub mod kind;

// Re-export main types for convenient access
pub use classification::{
    classify, classify_value, classify_with, kind_for_code, kind_for_status, user_message_for,
    ClassifiedError, RawError,
};
pub use detector::{Detection, ErrorDetector, ErrorPattern};
pub use kind::{ErrorKind, ParseErrorKindError, UserMessage};
