//! Containment of render-time failures.
//!
//! A [`RecoveryBoundary`] wraps the code that produces one region of the UI.
//! If that code panics or returns an error, the boundary captures the
//! failure, classifies it, reports it once through the `on_error` hook, and
//! renders a fallback instead. It stays failed, without re-running the
//! region, until [`RecoveryBoundary::retry`] is called.
//!
//! Remote-call failures do not belong here; the call wrapper reports those
//! as ordinary state.

pub mod fallback;

pub use fallback::{DevDetails, FallbackTemplates, FallbackView, RELOAD_LABEL};

use chrono::{DateTime, Utc};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::config::BoundarySettings;
use crate::error::{classify, ClassifiedError, RawError};

type FallbackFn<V> = dyn Fn(&ClassifiedError) -> V + Send + Sync;
type ErrorHook = dyn Fn(&RawError, &ComponentInfo) + Send + Sync;
type ReloadHook = dyn Fn() + Send + Sync;

/// Context passed to the `on_error` hook alongside the raw failure.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentInfo {
    /// The boundary's name.
    pub boundary: String,
    /// Failures captured by this boundary so far, including this one.
    pub failure_count: u32,
    pub captured_at: DateTime<Utc>,
}

/// A failure held by a failed boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedFailure {
    pub raw: RawError,
    pub error: ClassifiedError,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum BoundaryState {
    #[default]
    Healthy,
    Failed(CapturedFailure),
}

/// What a render produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Rendered<V> {
    /// The region rendered normally.
    Content(V),
    /// The built-in fallback for the captured failure.
    Fallback(FallbackView),
    /// The caller-supplied fallback for the captured failure.
    Custom(V),
}

impl<V> Rendered<V> {
    pub fn is_content(&self) -> bool {
        matches!(self, Self::Content(_))
    }

    pub fn fallback(&self) -> Option<&FallbackView> {
        match self {
            Self::Fallback(view) => Some(view),
            _ => None,
        }
    }
}

/// Contains failures raised while rendering one region.
pub struct RecoveryBoundary<V> {
    name: String,
    state: BoundaryState,
    templates: FallbackTemplates,
    custom_fallback: Option<Box<FallbackFn<V>>>,
    on_error: Option<Box<ErrorHook>>,
    on_reload: Option<Box<ReloadHook>>,
    dev_mode: bool,
    color: bool,
    failure_count: u32,
}

impl<V> RecoveryBoundary<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: BoundaryState::Healthy,
            templates: FallbackTemplates::default(),
            custom_fallback: None,
            on_error: None,
            on_reload: None,
            dev_mode: false,
            color: false,
            failure_count: 0,
        }
    }

    /// Applies loaded settings.
    pub fn with_settings(self, settings: &BoundarySettings) -> Self {
        self.dev_mode(settings.dev_mode).with_color(settings.color)
    }

    /// Colors panels produced by [`RecoveryBoundary::render_panel`].
    pub fn with_color(mut self, enabled: bool) -> Self {
        self.color = enabled;
        self
    }

    pub fn with_templates(mut self, templates: FallbackTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Replaces the built-in fallback. A custom fallback always wins.
    pub fn with_fallback(
        mut self,
        fallback: impl Fn(&ClassifiedError) -> V + Send + Sync + 'static,
    ) -> Self {
        self.custom_fallback = Some(Box::new(fallback));
        self
    }

    /// Reports each captured failure, once, with the raw value.
    pub fn on_error(
        mut self,
        hook: impl Fn(&RawError, &ComponentInfo) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// The full-reload escape hatch invoked by [`RecoveryBoundary::reload`].
    pub fn on_reload(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reload = Some(Box::new(hook));
        self
    }

    /// Shows raw diagnostics in fallback views. Never enable outside development.
    pub fn dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &BoundaryState {
        &self.state
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, BoundaryState::Failed(_))
    }

    pub fn captured(&self) -> Option<&CapturedFailure> {
        match &self.state {
            BoundaryState::Failed(failure) => Some(failure),
            BoundaryState::Healthy => None,
        }
    }

    /// Failures captured over the boundary's lifetime.
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Renders the region, capturing panics.
    pub fn render(&mut self, region: impl FnOnce() -> V) -> Rendered<V> {
        self.render_result(|| Ok::<V, RawError>(region()))
    }

    /// Renders the region, capturing panics and `Err` results.
    ///
    /// While failed, the region is not invoked and the fallback is returned.
    pub fn render_result<E>(&mut self, region: impl FnOnce() -> Result<V, E>) -> Rendered<V>
    where
        E: Into<RawError>,
    {
        if let BoundaryState::Failed(failure) = &self.state {
            return self.fallback_for(&failure.error);
        }

        match panic::catch_unwind(AssertUnwindSafe(region)) {
            Ok(Ok(content)) => Rendered::Content(content),
            Ok(Err(err)) => self.capture(err.into()),
            Err(payload) => self.capture(panic_to_raw(payload)),
        }
    }

    /// Returns to healthy so the next render re-runs the region.
    ///
    /// The cause is not checked; a region that fails again is captured again.
    pub fn retry(&mut self) {
        if self.is_failed() {
            tracing::info!(boundary = %self.name, failure_count = self.failure_count, "boundary retry");
        }
        self.state = BoundaryState::Healthy;
    }

    /// Invokes the reload hook without touching boundary state.
    ///
    /// Returns false if no reload hook is configured.
    pub fn reload(&self) -> bool {
        match &self.on_reload {
            Some(hook) => {
                tracing::warn!(boundary = %self.name, "full reload requested");
                hook();
                true
            }
            None => false,
        }
    }

    /// Renders `view` as a terminal panel, colored if the boundary is.
    pub fn render_panel(&self, view: &FallbackView, width: usize) -> String {
        view.render_panel(width, self.color)
    }

    /// The built-in view for `error`, honoring dev mode.
    pub fn fallback_view(&self, error: &ClassifiedError) -> FallbackView {
        self.templates.view_for(error, self.dev_mode)
    }

    fn capture(&mut self, raw: RawError) -> Rendered<V> {
        let error = classify(raw.clone());
        self.failure_count += 1;
        tracing::error!(
            boundary = %self.name,
            kind = %error.kind(),
            failure_count = self.failure_count,
            raw_message = error.raw_message(),
            "render failed, showing fallback"
        );

        if let Some(hook) = &self.on_error {
            let info = ComponentInfo {
                boundary: self.name.clone(),
                failure_count: self.failure_count,
                captured_at: error.timestamp(),
            };
            hook(&raw, &info);
        }

        let rendered = self.fallback_for(&error);
        self.state = BoundaryState::Failed(CapturedFailure { raw, error });
        rendered
    }

    fn fallback_for(&self, error: &ClassifiedError) -> Rendered<V> {
        match &self.custom_fallback {
            Some(fallback) => Rendered::Custom(fallback(error)),
            None => Rendered::Fallback(self.fallback_view(error)),
        }
    }
}

/// Turns a panic payload into an exception with the panic message.
fn panic_to_raw(payload: Box<dyn Any + Send>) -> RawError {
    let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "render panicked with a non-string payload".to_string()
    };
    RawError::exception(message)
}
