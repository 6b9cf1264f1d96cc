// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors surfaced to callers of [`crate::ApiClient::send`].
#[derive(Debug)]
pub enum ClientError {
    /// No response was received (connect failure, timeout, broken body).
    Network(reqwest::Error),
    /// The server answered with a non-success status other than 401.
    Status { status: u16, body: String },
    /// 401 on a request that already went through the refresh path once.
    Unauthorized,
    /// The credential refresh failed; the session has been torn down.
    RefreshFailed { reason: String },
    /// 401 with no credential in the session store; nothing to refresh.
    NoCredential,
    /// 401 after a failed refresh and before the next login.
    LoggedOut,
    /// The refresh task went away without settling this request.
    Abandoned,
    /// The session store could not be read or written.
    Store(String),
    /// A response body did not match the expected shape.
    Decode(String),
}

impl ClientError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK",
            Self::Status { .. } => "STATUS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RefreshFailed { .. } => "REFRESH_FAILED",
            Self::NoCredential => "NO_CREDENTIAL",
            Self::LoggedOut => "LOGGED_OUT",
            Self::Abandoned => "ABANDONED",
            Self::Store(_) => "STORE",
            Self::Decode(_) => "DECODE",
        }
    }

    /// HTTP status this error maps to, when there is one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized
            | Self::RefreshFailed { .. }
            | Self::NoCredential
            | Self::LoggedOut => Some(401),
            Self::Abandoned | Self::Store(_) | Self::Decode(_) => None,
        }
    }

    /// Whether the caller should present this as "please log in again".
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized | Self::RefreshFailed { .. } | Self::NoCredential | Self::LoggedOut
        )
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Status { status, body } if body.is_empty() => {
                write!(f, "server returned {status}")
            }
            Self::Status { status, body } => write!(f, "server returned {status}: {body}"),
            Self::Unauthorized => f.write_str("unauthorized after credential refresh"),
            Self::RefreshFailed { reason } => write!(f, "session refresh failed: {reason}"),
            Self::NoCredential => f.write_str("not logged in"),
            Self::LoggedOut => f.write_str("session ended, log in again"),
            Self::Abandoned => f.write_str("request abandoned during session refresh"),
            Self::Store(msg) => write!(f, "session store error: {msg}"),
            Self::Decode(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
