//! Classification of raw failures into [`ClassifiedError`]s.
//!
//! [`classify`] is total: every [`RawError`] (and every JSON value, through
//! [`classify_value`]) resolves to exactly one [`ErrorKind`]. Rules are tried
//! in order and the first match wins:
//!
//! 1. an upstream error code (`{code, message}`) or an already classified error
//! 2. an HTTP status code, or a transport timeout
//! 3. a connectivity failure, explicit or recognised from the message text
//! 4. a generic exception, classified as [`ErrorKind::Client`]
//! 5. anything else, classified as [`ErrorKind::Unknown`]

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

use super::{ErrorDetector, ErrorKind, UserMessage};

/// A failure as it arrives from a remote call, a transport, or a render.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RawError {
    /// An upstream error that already carries a machine-readable code.
    #[error("{code}: {message}")]
    Coded { code: String, message: String },

    /// A response with a non-success HTTP status.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Http {
        status: u16,
        message: Option<String>,
        body: Option<Value>,
    },

    /// The transport gave up waiting for a response.
    #[error("timed out: {message}")]
    Timeout { message: String },

    /// No connectivity, or the connection could not be established.
    #[error("network failure: {message}")]
    Network { message: String },

    /// A generic error object, including captured panics.
    #[error("{message}")]
    Exception {
        message: String,
        stack: Option<String>,
    },

    /// Any other value that was raised as an error.
    #[error("{0}")]
    Other(Value),

    /// A value that has already been through the classifier.
    #[error("{0}")]
    Classified(ClassifiedError),
}

impl RawError {
    /// Shorthand for an upstream `{code, message}` error.
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Coded {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a bare HTTP status failure.
    pub fn status(status: u16) -> Self {
        Self::Http {
            status,
            message: None,
            body: None,
        }
    }

    /// Shorthand for a connectivity failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Shorthand for a generic exception without a stack.
    pub fn exception(message: impl Into<String>) -> Self {
        Self::Exception {
            message: message.into(),
            stack: None,
        }
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        Self::exception(message)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        Self::exception(message)
    }
}

impl From<ClassifiedError> for RawError {
    fn from(error: ClassifiedError) -> Self {
        Self::Classified(error)
    }
}

impl From<std::io::Error> for RawError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        let message = err.to_string();
        match err.kind() {
            Io::ConnectionRefused
            | Io::ConnectionReset
            | Io::ConnectionAborted
            | Io::NotConnected
            | Io::AddrNotAvailable
            | Io::BrokenPipe => Self::Network { message },
            Io::TimedOut => Self::Timeout { message },
            _ => Self::exception(message),
        }
    }
}

impl From<reqwest::Error> for RawError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout { message }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                message: Some(message),
                body: None,
            }
        } else if err.is_connect() {
            Self::Network { message }
        } else {
            Self::exception(message)
        }
    }
}

/// A response body that could not be decoded.
impl From<serde_json::Error> for RawError {
    fn from(err: serde_json::Error) -> Self {
        Self::exception(format!("malformed response: {}", err))
    }
}

impl From<Value> for RawError {
    /// Matches a JSON value structurally against the shapes the classifier knows.
    fn from(value: Value) -> Self {
        let Value::Object(map) = &value else {
            return Self::Other(value);
        };

        if let Some(error) = classified_of(map) {
            return Self::Classified(error);
        }
        if let Some((code, message)) = code_and_message(map) {
            return Self::coded(code, message);
        }
        if let Some(Value::Object(inner)) = map.get("error") {
            if let Some((code, message)) = code_and_message(inner) {
                return Self::coded(code, message);
            }
        }
        if let Some(status) = status_of(map) {
            return Self::Http {
                status,
                message: string_field(map, "message"),
                body: Some(value.clone()),
            };
        }
        if let Some(message) = string_field(map, "message") {
            return Self::Exception {
                message,
                stack: string_field(map, "stack"),
            };
        }
        Self::Other(value)
    }
}

/// Recognises a serialized [`ClassifiedError`] so it keeps its kind.
fn classified_of(map: &Map<String, Value>) -> Option<ClassifiedError> {
    let kind = map.get("kind")?.as_str()?.parse::<ErrorKind>().ok()?;
    let raw_message = string_field(map, "rawMessage")?;

    let mut error = ClassifiedError::new(kind, raw_message);
    error.status_code = map
        .get("statusCode")
        .and_then(Value::as_u64)
        .and_then(|status| u16::try_from(status).ok());
    error.details = map.get("details").cloned();
    if let Some(timestamp) = map
        .get("timestamp")
        .and_then(|value| serde_json::from_value::<DateTime<Utc>>(value.clone()).ok())
    {
        error.timestamp = timestamp;
    }
    Some(error)
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn code_and_message(map: &Map<String, Value>) -> Option<(String, String)> {
    let code = match map.get("code")? {
        Value::String(code) => code.clone(),
        Value::Number(code) => code.to_string(),
        _ => return None,
    };
    let message = string_field(map, "message")?;
    Some((code, message))
}

fn status_of(map: &Map<String, Value>) -> Option<u16> {
    let as_status = |value: &Value| {
        value
            .as_u64()
            .and_then(|status| u16::try_from(status).ok())
            .filter(|status| (100..=599).contains(status))
    };

    map.get("status")
        .and_then(as_status)
        .or_else(|| map.get("statusCode").and_then(as_status))
        .or_else(|| {
            map.get("response")
                .and_then(|response| response.get("status"))
                .and_then(as_status)
        })
}

/// The immutable result of classifying a failure.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    kind: ErrorKind,
    raw_message: String,
    user_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
    timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    /// Creates a classified error stamped with the current time.
    ///
    /// The user message always comes from the kind's template.
    pub fn new(kind: ErrorKind, raw_message: impl Into<String>) -> Self {
        Self {
            kind,
            raw_message: raw_message.into(),
            user_message: kind.user_message().message.to_string(),
            status_code: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches the HTTP status the failure carried.
    pub fn with_status_code(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attaches opaque diagnostic details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The original message. Never shown outside development diagnostics.
    pub fn raw_message(&self) -> &str {
        &self.raw_message
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// The full title/message/action template for this error's kind.
    pub fn template(&self) -> UserMessage {
        self.kind.user_message()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.user_message)
    }
}

impl std::error::Error for ClassifiedError {}

/// Maps an upstream error code to a kind. Case-insensitive.
pub fn kind_for_code(code: &str) -> ErrorKind {
    let code = code.trim().to_ascii_uppercase();
    match code.as_str() {
        "UNAUTHORIZED" | "TOKEN_EXPIRED" | "INVALID_TOKEN" => ErrorKind::Authentication,
        "FORBIDDEN" | "ACCESS_DENIED" => ErrorKind::Authorization,
        "VALIDATION_ERROR" | "BAD_REQUEST" => ErrorKind::Validation,
        "NOT_FOUND" => ErrorKind::NotFound,
        "NETWORK_ERROR" => ErrorKind::Network,
        "TIMEOUT" => ErrorKind::Timeout,
        "SERVICE_UNAVAILABLE" => ErrorKind::ServiceUnavailable,
        "INTERNAL_ERROR" => ErrorKind::Server,
        c if c.starts_with("SERVER_") => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

/// Maps an HTTP status to a kind.
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Authorization,
        404 => ErrorKind::NotFound,
        408 => ErrorKind::Timeout,
        503 => ErrorKind::ServiceUnavailable,
        500..=599 => ErrorKind::Server,
        400..=499 => ErrorKind::Client,
        _ => ErrorKind::Unknown,
    }
}

fn shared_detector() -> &'static ErrorDetector {
    static DETECTOR: OnceLock<ErrorDetector> = OnceLock::new();
    DETECTOR.get_or_init(ErrorDetector::new)
}

/// Classifies any raw failure. Never panics.
pub fn classify(raw: impl Into<RawError>) -> ClassifiedError {
    classify_with(shared_detector(), raw.into())
}

/// Classifies an arbitrary JSON value by its shape.
pub fn classify_value(value: &Value) -> ClassifiedError {
    classify(value.clone())
}

/// Classifies using a caller-supplied detector for free-text connectivity rules.
pub fn classify_with(detector: &ErrorDetector, raw: RawError) -> ClassifiedError {
    match raw {
        RawError::Classified(error) => error,
        RawError::Coded { code, message } => {
            ClassifiedError::new(kind_for_code(&code), message).with_details(json!({ "code": code }))
        }
        RawError::Http {
            status,
            message,
            body,
        } => {
            let raw_message = message.unwrap_or_else(|| format!("HTTP {status}"));
            let error =
                ClassifiedError::new(kind_for_status(status), raw_message).with_status_code(status);
            match body {
                Some(body) => error.with_details(body),
                None => error,
            }
        }
        RawError::Timeout { message } => ClassifiedError::new(ErrorKind::Timeout, message),
        RawError::Network { message } => ClassifiedError::new(ErrorKind::Network, message),
        RawError::Exception { message, stack } => {
            let kind = detector.detect_kind(&message).unwrap_or(ErrorKind::Client);
            let details = json!({ "message": message, "stack": stack });
            ClassifiedError::new(kind, message).with_details(details)
        }
        RawError::Other(value) => {
            let text = match &value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            let kind = detector.detect_kind(&text).unwrap_or(ErrorKind::Unknown);
            ClassifiedError::new(kind, text.clone()).with_details(Value::String(text))
        }
    }
}

/// Returns the user-facing message for any raw failure.
pub fn user_message_for(raw: impl Into<RawError>) -> String {
    classify(raw).user_message
}
