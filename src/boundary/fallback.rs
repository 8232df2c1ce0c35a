//! Fallback views shown by a failed recovery boundary.

use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ClassifiedError, ErrorKind, UserMessage};

/// Label for the full-reload escape hatch.
pub const RELOAD_LABEL: &str = "Reload Page";

/// Raw diagnostics, present only in development mode.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DevDetails {
    pub raw_message: String,
    pub details: Option<Value>,
}

/// What a failed boundary shows in place of its children.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FallbackView {
    pub kind: ErrorKind,
    pub title: &'static str,
    pub message: &'static str,
    pub action_label: &'static str,
    pub reload_label: &'static str,
    pub dev_details: Option<DevDetails>,
}

impl FallbackView {
    /// Renders the view as a bordered text panel.
    pub fn render_panel(&self, width: usize, color: bool) -> String {
        let inner_width = width.saturating_sub(2).max(10);
        let border = "─".repeat(inner_width);
        let paint = |text: &str, styled: String| if color { styled } else { text.to_string() };

        let mut output = String::new();
        output.push_str(&paint(&border, border.red().to_string()));
        output.push('\n');
        output.push_str(&format!(" {}\n", paint(self.title, self.title.red().bold().to_string())));
        output.push_str(&paint(&border, border.red().to_string()));
        output.push_str("\n\n");

        for line in wrap(self.message, inner_width.saturating_sub(1)) {
            output.push_str(&format!(" {line}\n"));
        }
        output.push('\n');

        let actions = format!("[ {} ]  [ {} ]", self.action_label, self.reload_label);
        output.push_str(&format!(" {}\n", paint(&actions, actions.bold().to_string())));

        if let Some(dev) = &self.dev_details {
            output.push('\n');
            let header = "Details (development only)";
            output.push_str(&format!(" {}\n", paint(header, header.dimmed().to_string())));
            for line in wrap(&dev.raw_message, inner_width.saturating_sub(1)) {
                output.push_str(&format!(" {line}\n"));
            }
            if let Some(details) = &dev.details {
                output.push_str(&format!(" {details}\n"));
            }
        }

        output.push('\n');
        output.push_str(&paint(&border, border.red().to_string()));
        output
    }
}

impl std::fmt::Display for FallbackView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Greedy word wrap by character count.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = current.chars().count() + word.chars().count() + usize::from(!current.is_empty());
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Boundary templates keyed by kind.
///
/// Kinds without a template use the `unknown` template.
#[derive(Clone, Debug, PartialEq)]
pub struct FallbackTemplates {
    templates: HashMap<ErrorKind, UserMessage>,
}

impl Default for FallbackTemplates {
    fn default() -> Self {
        let kinds = [
            ErrorKind::Network,
            ErrorKind::Authentication,
            ErrorKind::Authorization,
            ErrorKind::NotFound,
            ErrorKind::Timeout,
            ErrorKind::Server,
            ErrorKind::ServiceUnavailable,
            ErrorKind::Unknown,
        ];
        Self {
            templates: kinds
                .into_iter()
                .map(|kind| (kind, kind.user_message()))
                .collect(),
        }
    }
}

impl FallbackTemplates {
    /// No templates at all; every kind renders as `unknown`.
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn with_template(mut self, kind: ErrorKind, template: UserMessage) -> Self {
        self.templates.insert(kind, template);
        self
    }

    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.templates.contains_key(&kind)
    }

    /// The template for `kind`, or the `unknown` one.
    pub fn resolve(&self, kind: ErrorKind) -> (ErrorKind, UserMessage) {
        match self.templates.get(&kind) {
            Some(template) => (kind, *template),
            None => {
                let template = self
                    .templates
                    .get(&ErrorKind::Unknown)
                    .copied()
                    .unwrap_or_else(|| ErrorKind::Unknown.user_message());
                (ErrorKind::Unknown, template)
            }
        }
    }

    /// Builds the view for `error`, attaching raw diagnostics in dev mode.
    pub fn view_for(&self, error: &ClassifiedError, dev_mode: bool) -> FallbackView {
        let (kind, template) = self.resolve(error.kind());
        FallbackView {
            kind,
            title: template.title,
            message: template.message,
            action_label: template.action_label,
            reload_label: RELOAD_LABEL,
            dev_details: dev_mode.then(|| DevDetails {
                raw_message: error.raw_message().to_string(),
                details: error.details().cloned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, RawError};

    #[test]
    fn test_missing_kinds_fall_back_to_unknown() {
        let templates = FallbackTemplates::default();
        assert!(!templates.contains(ErrorKind::Client));
        assert!(!templates.contains(ErrorKind::Validation));
        let (kind, template) = templates.resolve(ErrorKind::Client);
        assert_eq!(kind, ErrorKind::Unknown);
        assert_eq!(template, ErrorKind::Unknown.user_message());
    }

    #[test]
    fn test_known_kind_uses_its_template() {
        let templates = FallbackTemplates::default();
        let (kind, template) = templates.resolve(ErrorKind::Network);
        assert_eq!(kind, ErrorKind::Network);
        assert_eq!(template.title, "Connection Problem");
    }

    #[test]
    fn test_empty_templates_still_resolve() {
        let (kind, template) = FallbackTemplates::empty().resolve(ErrorKind::Server);
        assert_eq!(kind, ErrorKind::Unknown);
        assert_eq!(template, ErrorKind::Unknown.user_message());
    }

    #[test]
    fn test_dev_details_only_in_dev_mode() {
        let error = classify("secret stack frame");
        let templates = FallbackTemplates::default();
        assert!(templates.view_for(&error, false).dev_details.is_none());
        let dev = templates.view_for(&error, true).dev_details.unwrap();
        assert_eq!(dev.raw_message, "secret stack frame");
    }

    #[test]
    fn test_plain_panel_contents() {
        let error = classify(RawError::status(503));
        let view = FallbackTemplates::default().view_for(&error, false);
        let panel = view.render_panel(40, false);
        assert!(panel.contains("Service Unavailable"));
        assert!(panel.contains("[ Try Again ]"));
        assert!(panel.contains("[ Reload Page ]"));
        assert!(!panel.contains("Details"));
        assert!(!panel.contains('\u{1b}'));
    }

    #[test]
    fn test_colored_panel_has_escapes() {
        let error = classify(RawError::status(500));
        let view = FallbackTemplates::default().view_for(&error, true);
        let panel = view.render_panel(60, true);
        assert!(panel.contains('\u{1b}'));
        assert!(panel.contains("Details (development only)"));
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("one two three four five six", 9);
        assert_eq!(lines, vec!["one two", "three", "four five", "six"]);
        assert!(wrap("", 10).is_empty());
    }
}
