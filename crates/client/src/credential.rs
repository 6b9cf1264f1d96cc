// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bearer credential and the identity it belongs to.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// The current access token plus its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    /// Expiry as epoch seconds. `None` when neither the token nor the
    /// server reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    /// Build a credential, preferring the JWT `exp` claim over `expires_in`.
    pub fn from_token(token: impl Into<String>, expires_in: Option<u64>) -> Self {
        let token = token.into();
        let expires_at = jwt_expiry(&token).or_else(|| expires_in.map(|s| epoch_secs() + s));
        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= epoch_secs())
    }

    /// Seconds until expiry; `Some(0)` once expired, `None` if unknown.
    pub fn expires_in_secs(&self) -> Option<u64> {
        self.expires_at.map(|at| at.saturating_sub(epoch_secs()))
    }
}

/// Profile of the logged-in console user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(alias = "name", alias = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub role: String,
}

/// Body returned by the login and refresh endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "access_token", alias = "accessToken")]
    pub token: String,
    #[serde(default, alias = "refreshToken")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: Identity,
}

impl TokenResponse {
    pub fn credential(&self) -> Credential {
        Credential::from_token(self.token.clone(), self.expires_in)
    }
}

#[derive(Deserialize)]
struct ExpClaim {
    exp: Option<u64>,
}

/// Read the `exp` claim from a JWT without verifying it.
///
/// Returns `None` for anything that is not a three-part token with a JSON
/// payload carrying a numeric `exp`.
pub fn jwt_expiry(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claim: ExpClaim = serde_json::from_slice(&bytes).ok()?;
    claim.exp
}

/// Current time as epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
