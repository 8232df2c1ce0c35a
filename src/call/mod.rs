//! Stateful execution of remote calls with classification and retry.
//!
//! A [`CallWrapper`] owns the [`CallState`] of one call site. `execute`
//! moves it to `Loading`, drives the remote call through the retry policy,
//! and settles it to `Success` or `Error`. Failures are reported through the
//! state and the returned [`CallOutcome`]; they are never propagated.
//!
//! Every `execute` and `reset` stamps the state with a new generation. A
//! settlement is applied only if its generation is still current, so a slow
//! response from a superseded call can never overwrite newer state.

pub mod remote;
pub mod sleeper;
pub mod state;

pub use remote::{ApiError, RemoteResponse, SUCCESS_STATUS};
pub use sleeper::{Sleeper, TokioSleeper};
pub use state::{CallOutcome, CallState, Phase};

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

use crate::config::CallSettings;
use crate::error::{classify, ClassifiedError, ErrorKind, RawError};
use crate::notification::{Notification, NotificationSink, RetryHandle};
use crate::notifier::ErrorContext;
use crate::retry::RetryPolicy;

type RemoteFn<A, T> =
    dyn Fn(A) -> BoxFuture<'static, Result<RemoteResponse<T>, RawError>> + Send + Sync;
type Hook<V> = dyn Fn(&V) + Send + Sync;

/// Drives one call site's remote call and tracks its state.
pub struct CallWrapper<A, T> {
    label: Arc<str>,
    call: Arc<RemoteFn<A, T>>,
    policy: RetryPolicy,
    state: Arc<watch::Sender<CallState<T>>>,
    sleeper: Arc<dyn Sleeper>,
    sink: Option<Arc<dyn NotificationSink>>,
    context: Option<ErrorContext>,
    on_success: Option<Arc<Hook<T>>>,
    on_error: Option<Arc<Hook<ClassifiedError>>>,
    keep_previous_data: bool,
    last_args: Arc<Mutex<Option<A>>>,
}

impl<A, T> Clone for CallWrapper<A, T> {
    /// Clones share state, hooks and the last arguments.
    fn clone(&self) -> Self {
        Self {
            label: Arc::clone(&self.label),
            call: Arc::clone(&self.call),
            policy: self.policy.clone(),
            state: Arc::clone(&self.state),
            sleeper: Arc::clone(&self.sleeper),
            sink: self.sink.clone(),
            context: self.context.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            keep_previous_data: self.keep_previous_data,
            last_args: Arc::clone(&self.last_args),
        }
    }
}

impl<A, T> CallWrapper<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an idle wrapper around `call`.
    pub fn new<F, Fut>(policy: RetryPolicy, call: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RemoteResponse<T>, RawError>> + Send + 'static,
    {
        let (state, _) = watch::channel(CallState::default());
        Self {
            label: Arc::from("call"),
            call: Arc::new(move |args| call(args).boxed()),
            policy,
            state: Arc::new(state),
            sleeper: Arc::new(TokioSleeper),
            sink: None,
            context: None,
            on_success: None,
            on_error: None,
            keep_previous_data: false,
            last_args: Arc::new(Mutex::new(None)),
        }
    }

    /// Names the call site in log output.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Arc::from(label.into());
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Sends retry and failure notifications to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Publishes settled errors as the global error.
    pub fn with_error_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&ClassifiedError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Keeps the last successful data through reloads and failures.
    pub fn keep_previous_data(mut self, keep: bool) -> Self {
        self.keep_previous_data = keep;
        self
    }

    /// Applies loaded settings.
    pub fn with_settings(self, settings: &CallSettings) -> Self {
        self.keep_previous_data(settings.keep_previous_data)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> CallState<T> {
        self.state.borrow().clone()
    }

    /// Watches state transitions.
    pub fn subscribe(&self) -> watch::Receiver<CallState<T>> {
        self.state.subscribe()
    }

    /// Starts the call.
    ///
    /// The state becomes `Loading` with `attempt == 1` before this returns;
    /// the returned future performs the attempts and settles the state.
    /// Dropping the future before it settles returns the state to `Idle`.
    #[must_use = "the call only runs when the returned future is awaited"]
    pub fn execute(&self, args: A) -> impl Future<Output = CallOutcome<T>> + Send + 'static {
        *self
            .last_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(args.clone());

        let keep = self.keep_previous_data;
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            generation = state.generation;
            state.phase = Phase::Loading;
            state.attempt = 1;
            state.error = None;
            if !keep {
                state.data = None;
            }
        });
        tracing::debug!(call = %self.label, generation, "call started");

        let run = Run {
            label: Arc::clone(&self.label),
            call: Arc::clone(&self.call),
            policy: self.policy.clone(),
            state: Arc::clone(&self.state),
            sleeper: Arc::clone(&self.sleeper),
            sink: self.sink.clone(),
            context: self.context.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            keep_previous_data: keep,
            generation,
            retry: self.retry_handle(),
        };
        run.drive(args)
    }

    /// Re-runs the call with the arguments of the last `execute`.
    ///
    /// Returns `None` if the wrapper has never executed.
    pub fn retry(&self) -> Option<impl Future<Output = CallOutcome<T>> + Send + 'static> {
        let args = self
            .last_args
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some(self.execute(args))
    }

    /// A handle that re-runs this call site with its last arguments.
    pub fn retry_handle(&self) -> RetryHandle {
        let wrapper = self.clone();
        RetryHandle::new(move || match wrapper.retry() {
            Some(run) => run.map(|_| ()).boxed(),
            None => futures::future::ready(()).boxed(),
        })
    }

    /// Returns to `Idle` and discards any in-flight result.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            state.generation += 1;
            state.phase = Phase::Idle;
            state.data = None;
            state.error = None;
            state.attempt = 0;
        });
        tracing::debug!(call = %self.label, "call reset");
    }
}

/// Everything one `execute` needs, detached from the wrapper's borrow.
struct Run<A, T> {
    label: Arc<str>,
    call: Arc<RemoteFn<A, T>>,
    policy: RetryPolicy,
    state: Arc<watch::Sender<CallState<T>>>,
    sleeper: Arc<dyn Sleeper>,
    sink: Option<Arc<dyn NotificationSink>>,
    context: Option<ErrorContext>,
    on_success: Option<Arc<Hook<T>>>,
    on_error: Option<Arc<Hook<ClassifiedError>>>,
    keep_previous_data: bool,
    generation: u64,
    retry: RetryHandle,
}

impl<A, T> Drop for Run<A, T> {
    /// An abandoned run still owning the current generation goes back to `Idle`.
    fn drop(&mut self) {
        let abandoned = self.state.send_if_modified(|state| {
            if state.generation != self.generation || state.phase != Phase::Loading {
                return false;
            }
            state.phase = Phase::Idle;
            state.attempt = 0;
            true
        });
        if abandoned {
            tracing::debug!(call = %self.label, generation = self.generation, "call abandoned before settling");
        }
    }
}

impl<A, T> Run<A, T>
where
    A: Clone + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    async fn drive(self, args: A) -> CallOutcome<T> {
        let mut attempt = 1;
        loop {
            let result = (self.call)(args.clone())
                .await
                .and_then(RemoteResponse::into_result);
            let raw = match result {
                Ok(data) => return self.settle_success(data),
                Err(raw) => raw,
            };

            let error = classify(raw);
            let decision = self.policy.decide(error.kind(), attempt);
            if !decision.should_retry {
                return self.settle_failure(error, attempt);
            }
            if !self.is_current() {
                return self.superseded();
            }

            tracing::debug!(
                call = %self.label,
                attempt,
                kind = %error.kind(),
                delay_ms = decision.delay_ms(),
                "retrying remote call"
            );
            self.notify(&Notification::retrying(
                attempt,
                self.policy.max_retries.saturating_add(1),
                decision.delay,
                error.kind(),
            ));
            self.sleeper.sleep(decision.delay).await;

            attempt += 1;
            let advanced = self.state.send_if_modified(|state| {
                if state.generation != self.generation {
                    return false;
                }
                state.attempt = attempt;
                true
            });
            if !advanced {
                return self.superseded();
            }
        }
    }

    fn is_current(&self) -> bool {
        self.state.borrow().generation == self.generation
    }

    fn superseded(&self) -> CallOutcome<T> {
        tracing::debug!(call = %self.label, generation = self.generation, "discarding superseded result");
        CallOutcome::Superseded
    }

    fn settle_success(&self, data: T) -> CallOutcome<T> {
        let applied = self.state.send_if_modified(|state| {
            if state.generation != self.generation {
                return false;
            }
            state.phase = Phase::Success;
            state.data = Some(data.clone());
            state.error = None;
            true
        });
        if !applied {
            return self.superseded();
        }

        if let Some(hook) = &self.on_success {
            hook(&data);
        }
        CallOutcome::Success(data)
    }

    fn settle_failure(&self, error: ClassifiedError, attempts: u32) -> CallOutcome<T> {
        let keep = self.keep_previous_data;
        let applied = self.state.send_if_modified(|state| {
            if state.generation != self.generation {
                return false;
            }
            state.phase = Phase::Error;
            state.error = Some(error.clone());
            if !keep {
                state.data = None;
            }
            true
        });
        if !applied {
            return self.superseded();
        }

        tracing::warn!(
            call = %self.label,
            attempts,
            kind = %error.kind(),
            status = error.status_code(),
            raw_message = error.raw_message(),
            "remote call failed"
        );
        if let Some(hook) = &self.on_error {
            hook(&error);
        }
        if let Some(context) = &self.context {
            context.set_error(RawError::Classified(error.clone()));
        }
        let retryable = self.policy.should_retry(error.kind());
        let mut failed = Notification::failed(error.clone(), retryable);
        if retryable {
            failed = failed.with_retry(self.retry.clone());
        }
        self.notify(&failed);
        if error.kind() == ErrorKind::Authentication {
            self.notify(&Notification::SessionExpired);
        }
        CallOutcome::Failure(error)
    }

    fn notify(&self, notification: &Notification) {
        if let Some(sink) = &self.sink {
            sink.notify(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::notification::ChannelSink;

    /// Records requested delays and returns immediately.
    #[derive(Clone, Default)]
    struct RecordingSleeper {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingSleeper {
        fn delays_ms(&self) -> Vec<u128> {
            self.delays
                .lock()
                .unwrap()
                .iter()
                .map(Duration::as_millis)
                .collect()
        }
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().unwrap().push(delay);
        }
    }

    fn failing(
        raw: RawError,
        calls: Arc<AtomicU32>,
    ) -> impl Fn(()) -> futures::future::Ready<Result<RemoteResponse<u32>, RawError>> {
        move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Err(raw.clone()))
        }
    }

    #[test]
    fn test_new_wrapper_is_idle() {
        let wrapper = CallWrapper::new(RetryPolicy::query(), |_: ()| async {
            Ok(RemoteResponse::success(1u32))
        });
        let state = wrapper.state();
        assert!(state.is_idle());
        assert_eq!(state.attempt, 0);
        assert_eq!(state.generation, 0);
    }

    #[test]
    fn test_execute_enters_loading_before_polling() {
        let wrapper = CallWrapper::new(RetryPolicy::query(), |_: ()| async {
            Ok(RemoteResponse::success(1u32))
        });
        let pending = wrapper.execute(());
        let state = wrapper.state();
        assert!(state.is_loading());
        assert_eq!(state.attempt, 1);
        assert_eq!(state.generation, 1);

        drop(pending);
        let state = wrapper.state();
        assert!(state.is_idle());
        assert_eq!(state.attempt, 0);
        assert_eq!(state.generation, 1);
    }

    #[test]
    fn test_dropping_superseded_run_leaves_newer_state() {
        let wrapper = CallWrapper::new(RetryPolicy::query(), |_: ()| async {
            Ok(RemoteResponse::success(1u32))
        });
        let stale = wrapper.execute(());
        let current = wrapper.execute(());
        drop(stale);

        let state = wrapper.state();
        assert!(state.is_loading());
        assert_eq!(state.generation, 2);
        drop(current);
    }

    #[tokio::test]
    async fn test_settled_run_is_not_reset_by_drop() {
        let wrapper = CallWrapper::new(RetryPolicy::never(), |_: ()| async {
            Err::<RemoteResponse<u32>, _>(RawError::status(500))
        });
        wrapper.execute(()).await;
        assert!(wrapper.state().is_error());
    }

    #[test]
    fn test_settings_enable_keep_previous_data() {
        let config = crate::config::CallguardConfig::from_toml_str(
            "[call]\nkeep_previous_data = true",
        )
        .unwrap();
        let wrapper = CallWrapper::new(RetryPolicy::query(), |_: ()| async {
            Ok(RemoteResponse::success(1u32))
        })
        .with_settings(&config.call);
        assert!(wrapper.keep_previous_data);
    }

    #[tokio::test]
    async fn test_success_settles_and_fires_hook_once() {
        let hits = Arc::new(AtomicU32::new(0));
        let hook_hits = Arc::clone(&hits);
        let wrapper = CallWrapper::new(RetryPolicy::query(), |n: u32| async move {
            Ok(RemoteResponse::success(n * 2))
        })
        .on_success(move |_| {
            hook_hits.fetch_add(1, Ordering::SeqCst);
        });

        let outcome = wrapper.execute(21).await;
        assert_eq!(outcome, CallOutcome::Success(42));
        let state = wrapper.state();
        assert!(state.is_success());
        assert_eq!(state.data, Some(42));
        assert!(state.error.is_none());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_stay_loading_and_advance_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_fn = Arc::clone(&calls);
        let sleeper = RecordingSleeper::default();
        let wrapper = CallWrapper::new(RetryPolicy::query(), move |_: ()| {
            let n = calls_in_fn.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(RawError::status(502))
                } else {
                    Ok(RemoteResponse::success(n))
                }
            }
        })
        .with_sleeper(sleeper.clone());

        let mut receiver = wrapper.subscribe();
        let outcome = wrapper.execute(()).await;
        assert_eq!(outcome, CallOutcome::Success(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays_ms(), vec![1000, 2000]);

        let state = receiver.borrow_and_update().clone();
        assert!(state.is_success());
        assert_eq!(state.attempt, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_settles_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let sleeper = RecordingSleeper::default();
        let wrapper = CallWrapper::new(
            RetryPolicy::query(),
            failing(RawError::coded("NOT_FOUND", "gone"), Arc::clone(&calls)),
        )
        .with_sleeper(sleeper.clone());

        let outcome = wrapper.execute(()).await;
        assert_eq!(outcome.error().map(ClassifiedError::kind), Some(ErrorKind::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays_ms().is_empty());
        let state = wrapper.state();
        assert!(state.is_error());
        assert_eq!(state.attempt, 1);
    }

    #[tokio::test]
    async fn test_mutation_ceiling_allows_one_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let sleeper = RecordingSleeper::default();
        let wrapper = CallWrapper::new(
            RetryPolicy::mutation(),
            failing(RawError::network("offline"), Arc::clone(&calls)),
        )
        .with_sleeper(sleeper.clone());

        let outcome = wrapper.execute(()).await;
        assert_eq!(outcome.error().map(ClassifiedError::kind), Some(ErrorKind::Network));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(sleeper.delays_ms(), vec![1000]);
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_result() {
        let errors = Arc::new(AtomicU32::new(0));
        let error_hits = Arc::clone(&errors);
        let wrapper = CallWrapper::new(
            RetryPolicy::never(),
            failing(RawError::status(500), Arc::new(AtomicU32::new(0))),
        )
        .on_error(move |_| {
            error_hits.fetch_add(1, Ordering::SeqCst);
        });

        let pending = wrapper.execute(());
        wrapper.reset();
        assert_eq!(pending.await, CallOutcome::Superseded);

        let state = wrapper.state();
        assert!(state.is_idle());
        assert!(state.error.is_none());
        assert_eq!(state.generation, 2);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_keep_previous_data_on_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_fn = Arc::clone(&calls);
        let make = move |keep: bool| {
            let calls = Arc::clone(&calls_in_fn);
            CallWrapper::new(RetryPolicy::never(), move |_: ()| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n % 2 == 0 {
                        Ok(RemoteResponse::success(7u32))
                    } else {
                        Err(RawError::status(500))
                    }
                }
            })
            .keep_previous_data(keep)
        };

        let keeping = make(true);
        keeping.execute(()).await;
        keeping.execute(()).await;
        let state = keeping.state();
        assert!(state.is_error());
        assert_eq!(state.data, Some(7));

        let clearing = make(false);
        clearing.execute(()).await;
        clearing.execute(()).await;
        let state = clearing.state();
        assert!(state.is_error());
        assert_eq!(state.data, None);
    }

    #[tokio::test]
    async fn test_retry_reuses_last_arguments() {
        let wrapper = CallWrapper::new(RetryPolicy::never(), |n: u32| async move {
            Ok(RemoteResponse::success(n + 1))
        });
        assert!(wrapper.retry().is_none());

        wrapper.execute(9).await;
        let again = wrapper.retry().expect("has last arguments").await;
        assert_eq!(again, CallOutcome::Success(10));
        assert_eq!(wrapper.state().generation, 2);
    }

    #[tokio::test]
    async fn test_authentication_failure_notifies_session_expiry() {
        let (sink, mut receiver) = ChannelSink::new();
        let context = ErrorContext::init();
        let wrapper = CallWrapper::new(
            RetryPolicy::query(),
            failing(RawError::status(401), Arc::new(AtomicU32::new(0))),
        )
        .with_sink(Arc::new(sink))
        .with_error_context(context.clone());

        wrapper.execute(()).await;

        match receiver.try_recv().unwrap() {
            Notification::Failed {
                error,
                retryable,
                retry,
            } => {
                assert!(retry.is_none());
                assert_eq!(error.kind(), ErrorKind::Authentication);
                assert!(!retryable);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(receiver.try_recv().unwrap(), Notification::SessionExpired);
        assert_eq!(
            context.current().map(|error| error.kind()),
            Some(ErrorKind::Authentication)
        );
    }
}
