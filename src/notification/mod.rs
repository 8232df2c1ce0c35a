//! Notifications about retries and terminal failures.
//!
//! The call wrapper emits a [`Notification`] whenever it schedules a retry or
//! settles with an error. A [`NotificationSink`] forwards them to whatever
//! displays toasts or banners; the sink itself is owned by the UI layer.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{ClassifiedError, ErrorKind};

/// A notification about a retry or a failure.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// A failed attempt will be retried after `delay`.
    Retrying {
        /// The attempt that just failed (1-based).
        attempt: u32,
        /// Attempts allowed in total, including the first.
        max_attempts: u32,
        delay: Duration,
        kind: ErrorKind,
    },

    /// A call settled with an error after exhausting its retries.
    Failed {
        error: ClassifiedError,
        /// Whether re-running the call could succeed.
        retryable: bool,
        /// Re-runs the failed call; present only for retryable failures.
        retry: Option<RetryHandle>,
    },

    /// An authentication failure settled; the session should be cleared and
    /// the user sent to sign in.
    SessionExpired,
}

impl Notification {
    /// Creates a new Retrying notification.
    pub fn retrying(attempt: u32, max_attempts: u32, delay: Duration, kind: ErrorKind) -> Self {
        Self::Retrying {
            attempt,
            max_attempts,
            delay,
            kind,
        }
    }

    /// Creates a new Failed notification.
    pub fn failed(error: ClassifiedError, retryable: bool) -> Self {
        Self::Failed {
            error,
            retryable,
            retry: None,
        }
    }

    /// Attaches a retry handle to a `Failed` notification. Other variants are unchanged.
    pub fn with_retry(mut self, handle: RetryHandle) -> Self {
        if let Self::Failed { retry, .. } = &mut self {
            *retry = Some(handle);
        }
        self
    }

    /// The retry handle, if this notification offers one.
    pub fn retry_handle(&self) -> Option<&RetryHandle> {
        match self {
            Self::Failed { retry, .. } => retry.as_ref(),
            _ => None,
        }
    }

    /// Returns true if this notification indicates an error condition.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::SessionExpired)
    }

    /// Returns true if this notification indicates a recovery action.
    pub fn is_recovery(&self) -> bool {
        matches!(self, Self::Retrying { .. })
    }
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retrying {
                attempt,
                max_attempts,
                delay,
                kind,
            } => write!(
                f,
                "Retrying ({}/{}) in {} ms: {}",
                attempt,
                max_attempts,
                delay.as_millis(),
                kind.user_message().title
            ),
            Self::Failed { error, .. } => {
                let template = error.template();
                write!(f, "{}: {}", template.title, template.message)
            }
            Self::SessionExpired => {
                write!(f, "{}", ErrorKind::Authentication.user_message().message)
            }
        }
    }
}

type RetryFn = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

/// Re-runs a failed call from wherever the failure is displayed.
///
/// The returned future drives the call; its result lands in the call
/// wrapper's state, not here.
#[derive(Clone)]
pub struct RetryHandle {
    run: Arc<RetryFn>,
}

impl RetryHandle {
    pub fn new(run: impl Fn() -> BoxFuture<'static, ()> + Send + Sync + 'static) -> Self {
        Self { run: Arc::new(run) }
    }

    /// Starts the retry.
    pub fn retry(&self) -> BoxFuture<'static, ()> {
        (self.run)()
    }
}

impl fmt::Debug for RetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RetryHandle")
    }
}

/// Handles are equal when they re-run the same call.
impl PartialEq for RetryHandle {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.run) as *const (),
            Arc::as_ptr(&other.run) as *const (),
        )
    }
}

/// Receives notifications from call wrappers.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// A sink that logs notifications through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, notification: &Notification) {
        if notification.is_error() {
            tracing::warn!(%notification, "call failed");
        } else {
            tracing::info!(%notification, "call retrying");
        }
    }
}

/// A sink that forwards notifications over a channel.
///
/// Dropped receivers are ignored; notifications are fire-and-forget.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its notifications arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) {
        let _ = self.sender.send(notification.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use crate::error::{classify, RawError};

    #[test]
    fn test_retrying_notification() {
        let notification =
            Notification::retrying(2, 4, Duration::from_millis(2000), ErrorKind::Server);
        assert!(matches!(
            notification,
            Notification::Retrying { attempt, max_attempts, delay, kind }
                if attempt == 2
                    && max_attempts == 4
                    && delay == Duration::from_millis(2000)
                    && kind == ErrorKind::Server
        ));
        assert!(!notification.is_error());
        assert!(notification.is_recovery());
    }

    #[test]
    fn test_failed_notification() {
        let error = classify(RawError::status(500));
        let notification = Notification::failed(error, true);
        assert!(notification.is_error());
        assert!(!notification.is_recovery());
    }

    #[test]
    fn test_retry_handle_only_attaches_to_failed() {
        let handle = RetryHandle::new(|| async {}.boxed());
        let failed = Notification::failed(classify(RawError::status(500)), true)
            .with_retry(handle.clone());
        assert_eq!(failed.retry_handle(), Some(&handle));

        let expired = Notification::SessionExpired.with_retry(handle);
        assert_eq!(expired, Notification::SessionExpired);
        assert!(expired.retry_handle().is_none());
    }

    #[tokio::test]
    async fn test_retry_handle_runs_callback() {
        let runs = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let handle = RetryHandle::new(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async {}.boxed()
        });
        handle.retry().await;
        handle.clone().retry().await;
        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_ne!(handle, RetryHandle::new(|| async {}.boxed()));
    }

    #[test]
    fn test_log_sink_writes_events() {
        let buffer = Capture::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            LogSink.notify(&Notification::retrying(
                1,
                4,
                Duration::from_millis(1000),
                ErrorKind::Network,
            ));
            LogSink.notify(&Notification::SessionExpired);
        });

        let output = buffer.contents();
        assert!(output.contains("INFO"));
        assert!(output.contains("call retrying"));
        assert!(output.contains("Retrying (1/4) in 1000 ms: Connection Problem"));
        assert!(output.contains("WARN"));
        assert!(output.contains("call failed"));
    }

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct Capture(Arc<std::sync::Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_display_retrying() {
        let notification =
            Notification::retrying(1, 4, Duration::from_millis(1000), ErrorKind::Network);
        assert_eq!(
            format!("{}", notification),
            "Retrying (1/4) in 1000 ms: Connection Problem"
        );
    }

    #[test]
    fn test_display_failed_uses_template() {
        let error = classify(RawError::coded("FORBIDDEN", "internal acl dump"));
        let shown = Notification::failed(error, false).to_string();
        assert_eq!(
            shown,
            "Access Denied: You do not have permission to perform this action."
        );
    }

    #[test]
    fn test_display_session_expired() {
        assert_eq!(
            Notification::SessionExpired.to_string(),
            "Your session has expired. Please sign in again."
        );
    }

    #[test]
    fn test_channel_sink_forwards() {
        let (sink, mut receiver) = ChannelSink::new();
        sink.notify(&Notification::SessionExpired);
        assert_eq!(receiver.try_recv().unwrap(), Notification::SessionExpired);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.notify(&Notification::SessionExpired);
    }
}
