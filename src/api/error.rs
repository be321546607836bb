//! Error taxonomy for calls against the inventory API.

use std::collections::BTreeMap;
use thiserror::Error;

/// Fallback shown when the server fails without a usable message.
pub const GENERIC_SERVER_MESSAGE: &str = "An error occurred";

/// Shown when no response was received at all.
pub const NO_CONNECTION_MESSAGE: &str = "No connection to the server";

/// Errors produced by the inventory API boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
  /// The request was superseded by a newer one. Never shown to the user.
  #[error("request cancelled")]
  Cancelled,

  /// No response was received.
  #[error("network error: {0}")]
  Network(String),

  /// The server answered with a non-success status.
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },

  /// The session is no longer valid (HTTP 401).
  #[error("session expired")]
  Unauthorized,

  /// Field-level validation failures (HTTP 400 with an `errors` object).
  #[error("validation failed: {message}")]
  Validation {
    message: String,
    fields: BTreeMap<String, Vec<String>>,
  },

  /// The response body could not be decoded.
  #[error("unexpected response: {0}")]
  Decode(String),
}

impl ApiError {
  pub fn is_auth_failure(&self) -> bool {
    matches!(self, Self::Unauthorized)
  }

  /// Message suitable for display next to a list or an item.
  pub fn user_message(&self) -> String {
    match self {
      Self::Cancelled => String::new(),
      Self::Network(_) => NO_CONNECTION_MESSAGE.to_string(),
      Self::Server { message, .. } | Self::Validation { message, .. } => {
        if message.trim().is_empty() {
          GENERIC_SERVER_MESSAGE.to_string()
        } else {
          message.clone()
        }
      }
      Self::Unauthorized => "Session expired, please log in again".to_string(),
      Self::Decode(_) => GENERIC_SERVER_MESSAGE.to_string(),
    }
  }

  /// First error reported for the given form field, if any.
  pub fn field_error(&self, field: &str) -> Option<&str> {
    match self {
      Self::Validation { fields, .. } => fields
        .get(field)
        .and_then(|errors| errors.first())
        .map(String::as_str),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::Decode(err.to_string())
    } else {
      Self::Network(err.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(err: serde_json::Error) -> Self {
    Self::Decode(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_server_message_falls_back_when_blank() {
    let err = ApiError::Server {
      status: 500,
      message: "  ".to_string(),
    };
    assert_eq!(err.user_message(), GENERIC_SERVER_MESSAGE);
  }

  #[test]
  fn test_network_is_distinct_from_cancelled() {
    let network = ApiError::Network("connection refused".to_string());
    assert_ne!(network, ApiError::Cancelled);
    assert_eq!(network.user_message(), NO_CONNECTION_MESSAGE);
    assert!(ApiError::Cancelled.user_message().is_empty());
  }

  #[test]
  fn test_field_error_lookup() {
    let mut fields = BTreeMap::new();
    fields.insert(
      "username".to_string(),
      vec!["taken".to_string(), "too short".to_string()],
    );
    let err = ApiError::Validation {
      message: "invalid".to_string(),
      fields,
    };
    assert_eq!(err.field_error("username"), Some("taken"));
    assert_eq!(err.field_error("password"), None);
  }

  #[test]
  fn test_only_unauthorized_is_auth_failure() {
    let err = ApiError::Server {
      status: 403,
      message: "forbidden".to_string(),
    };
    assert!(!err.is_auth_failure());
    assert!(ApiError::Unauthorized.is_auth_failure());
  }
}
