//! Result envelope returned by every caller-facing operation

use serde::Serialize;

use crate::error::{ErrorKind, Result, VaultError};

/// `{success, message, kind?, data?}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response<T> {
    pub success: bool,
    pub message: String,
    /// Failure category, absent on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Response<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            kind: None,
            data: Some(data),
        }
    }

    pub fn failure(error: &VaultError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            kind: Some(error.kind()),
            data: None,
        }
    }

    pub fn from_result(result: Result<T>, message: impl Into<String>) -> Self {
        match result {
            Ok(data) => Self::ok(message, data),
            Err(e) => Self::failure(&e),
        }
    }
}
