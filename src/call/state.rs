//! Observable state of a call wrapper.

use serde::Serialize;

use crate::error::ClassifiedError;

/// Where a call is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// A snapshot of one call site's state.
///
/// Retries do not leave `Loading`; only `attempt` advances.
#[derive(Clone, Debug, PartialEq)]
pub struct CallState<T> {
    pub phase: Phase,
    pub data: Option<T>,
    pub error: Option<ClassifiedError>,
    /// Attempts started for the current generation, 0 while idle.
    pub attempt: u32,
    /// Bumped by every `execute` and `reset`; only the current generation may settle.
    pub generation: u64,
}

impl<T> Default for CallState<T> {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            data: None,
            error: None,
            attempt: 0,
            generation: 0,
        }
    }
}

impl<T> CallState<T> {
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn is_success(&self) -> bool {
        self.phase == Phase::Success
    }

    pub fn is_error(&self) -> bool {
        self.phase == Phase::Error
    }
}

/// How an `execute` call ended.
#[derive(Clone, Debug, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    Failure(ClassifiedError),
    /// A later `execute` or a `reset` took over; the result was discarded.
    Superseded,
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }

    /// The data on success, `None` otherwise.
    pub fn data(self) -> Option<T> {
        match self {
            Self::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Failure(error) => Some(error),
            _ => None,
        }
    }
}
