// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Returning the client to an unauthenticated state.

use crate::store::Session;

/// Boundary to whatever owns the console's views.
pub trait Navigator: Send + Sync {
    /// Whether the login view is already showing.
    fn is_at_login(&self) -> bool;
    /// Switch to the login view.
    fn to_login(&self);
}

/// Navigator for headless use: there is no login view to show.
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn is_at_login(&self) -> bool {
        true
    }

    fn to_login(&self) {}
}

/// Clear the stored session and send the user to login.
///
/// Safe to call repeatedly; store errors are logged, not returned.
pub fn teardown(session: &Session, navigator: &dyn Navigator) {
    if let Err(e) = session.clear() {
        tracing::warn!(err = %e, "failed to clear session store");
    }
    if !navigator.is_at_login() {
        tracing::info!("session ended, redirecting to login");
        navigator.to_login();
    }
}

#[cfg(test)]
#[path = "teardown_tests.rs"]
mod tests;
