// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Settling the requests released by a refresh.

use tracing::debug;

use crate::credential::Credential;
use crate::dispatch::Shared;
use crate::error::ClientError;
use crate::refresh::PendingRequest;

/// Re-send each request with `credential`, in queue order, and reply to its caller.
///
/// Replays run one after another so the server sees them in arrival order.
/// A replay is never routed back into the refresh path.
pub(crate) async fn replay_all(shared: &Shared, queue: Vec<PendingRequest>, credential: &Credential) {
    for pending in queue {
        let mut attempt = pending.attempt.clone();
        let result = shared.send_replay(&mut attempt, credential).await;
        debug!(
            method = %attempt.spec.method,
            path = %attempt.spec.path,
            ok = result.is_ok(),
            "replayed request"
        );
        pending.settle(result);
    }
}

/// Fail every waiter because the refresh could not produce a credential.
pub(crate) fn reject_all(queue: Vec<PendingRequest>, cause: &ClientError) {
    for pending in queue {
        pending.settle(Err(rejection(cause)));
    }
}

fn rejection(cause: &ClientError) -> ClientError {
    match cause {
        ClientError::LoggedOut => ClientError::LoggedOut,
        other => ClientError::RefreshFailed { reason: other.to_string() },
    }
}
