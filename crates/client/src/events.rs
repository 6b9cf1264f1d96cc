// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::credential::Identity;

/// Session lifecycle notifications broadcast by [`crate::ApiClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A login established a new session.
    LoggedIn { identity: Identity },
    /// A request hit 401 and is waiting on the credential refresh.
    Deferred { method: String, path: String },
    /// The credential was refreshed; deferred requests are being replayed.
    Refreshed { identity: Identity },
    /// The refresh failed; every deferred request was rejected.
    #[serde(rename = "refresh:failed")]
    RefreshFailed { error: String },
    /// The session was torn down.
    LoggedOut,
}
