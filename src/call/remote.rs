//! The response envelope returned by remote-call functions.

use serde::{Deserialize, Serialize};

use crate::error::RawError;

/// The `status` value the API uses for a successful response.
pub const SUCCESS_STATUS: &str = "SUCCESS";

/// A machine-readable error carried in a response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

/// The envelope every API endpoint responds with.
///
/// A response is successful only when `status` is `"SUCCESS"` and `data` is
/// present; anything else is treated as a failure and classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct RemoteResponse<T> {
    pub status: String,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

impl<T> RemoteResponse<T> {
    /// A successful response carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            status: SUCCESS_STATUS.to_string(),
            data: Some(data),
            message: None,
            error: None,
        }
    }

    /// A failed response carrying an API error.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: "ERROR".to_string(),
            data: None,
            message: Some(message.clone()),
            error: Some(ApiError {
                code: code.into(),
                message,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SUCCESS_STATUS && self.data.is_some()
    }

    /// Splits the envelope into its data or the raw failure it represents.
    pub fn into_result(self) -> Result<T, RawError> {
        if self.status == SUCCESS_STATUS {
            if let Some(data) = self.data {
                return Ok(data);
            }
        }
        match self.error {
            Some(ApiError { code, message }) => Err(RawError::Coded { code, message }),
            None => Err(RawError::Coded {
                message: self
                    .message
                    .unwrap_or_else(|| format!("response status {} without data", self.status)),
                code: self.status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{classify, ErrorKind};
    use serde_json::{json, Value};

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct LeavePolicy {
        policy_code: String,
    }

    #[test]
    fn test_success_envelope() {
        let response: RemoteResponse<LeavePolicy> =
            serde_json::from_value(json!({ "status": "SUCCESS", "data": { "policyCode": "X" } }))
                .unwrap();
        assert!(response.is_success());
        assert_eq!(response.into_result().unwrap().policy_code, "X");
    }

    #[test]
    fn test_success_without_data_is_a_failure() {
        let response: RemoteResponse<Value> =
            serde_json::from_value(json!({ "status": "SUCCESS" })).unwrap();
        assert!(!response.is_success());
        let raw = response.into_result().unwrap_err();
        assert_eq!(classify(raw).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_error_envelope_carries_code() {
        let response: RemoteResponse<Value> = serde_json::from_value(json!({
            "status": "ERROR",
            "error": { "code": "VALIDATION_ERROR", "message": "bad" }
        }))
        .unwrap();
        let raw = response.into_result().unwrap_err();
        assert_eq!(raw, RawError::coded("VALIDATION_ERROR", "bad"));
    }

    #[test]
    fn test_status_used_as_code_when_no_error_body() {
        let response: RemoteResponse<Value> = serde_json::from_value(json!({
            "status": "UNAUTHORIZED",
            "message": "login required"
        }))
        .unwrap();
        let error = classify(response.into_result().unwrap_err());
        assert_eq!(error.kind(), ErrorKind::Authentication);
        assert_eq!(error.raw_message(), "login required");
    }

    #[test]
    fn test_failure_constructor() {
        let raw = RemoteResponse::<()>::failure("FORBIDDEN", "nope")
            .into_result()
            .unwrap_err();
        assert_eq!(classify(raw).kind(), ErrorKind::Authorization);
    }
}
