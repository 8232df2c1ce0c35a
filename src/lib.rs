//! Callguard - resilient remote-call execution and error classification
//!
//! Every failure a client can see, whether a coded backend error, an HTTP
//! status, a transport failure or a panic while rendering, is normalized
//! into a [`error::ClassifiedError`] with a fixed, user-safe message. On top
//! of that sit the retry policy, the stateful call wrapper, the recovery
//! boundary for render failures, and the shared global error slot.

pub mod boundary;
pub mod call;
pub mod config;
pub mod error;
pub mod logging;
pub mod notification;
pub mod notifier;
pub mod retry;
