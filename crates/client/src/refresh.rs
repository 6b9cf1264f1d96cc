// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight credential refresh.
//!
//! The first request to hit 401 starts a refresh on a background task; every
//! request failing while that refresh is in flight joins the wait queue.
//! When the refresh settles the queue is handed over whole, either to
//! [`crate::replay::replay_all`] or to [`crate::replay::reject_all`], so the
//! coordinator is never idle with waiters still queued.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::credential::Credential;
use crate::dispatch::Shared;
use crate::error::ClientError;
use crate::events::SessionEvent;
use crate::replay;
use crate::request::{ApiResponse, Attempt};
use crate::teardown::teardown;

/// A request waiting for the refresh to settle, with its one-shot reply.
pub(crate) struct PendingRequest {
    pub attempt: Attempt,
    reply: oneshot::Sender<Result<ApiResponse, ClientError>>,
}

impl PendingRequest {
    pub fn new(
        attempt: Attempt,
    ) -> (Self, oneshot::Receiver<Result<ApiResponse, ClientError>>) {
        let (reply, rx) = oneshot::channel();
        (Self { attempt, reply }, rx)
    }

    /// Deliver the outcome. Consumes the request, so it settles exactly once.
    pub fn settle(self, result: Result<ApiResponse, ClientError>) {
        // The caller may have stopped waiting; nothing else to do then.
        let _ = self.reply.send(result);
    }
}

enum RefreshState {
    Idle,
    Refreshing {
        queue: Vec<PendingRequest>,
        /// Set by logout mid-refresh: the refresh result must not be kept.
        abandoned: bool,
        /// Set by a login mid-refresh: the login's credential supersedes the refresh.
        relogged: bool,
    },
    LoggedOut,
}

/// What happened to a request handed to [`RefreshCoordinator::admit`].
pub(crate) enum Admission {
    /// The request is the trigger; the caller must start the refresh.
    Start,
    /// The request joined an in-flight refresh at this queue position.
    Queued(usize),
    /// A refresh already replaced the token this request carried.
    Replay(PendingRequest, Credential),
    /// Terminal failure. `teardown` asks the caller to clear the session.
    Reject { pending: PendingRequest, error: ClientError, teardown: bool },
}

/// How a refresh settled, with the waiters it released.
pub(crate) enum Settled {
    /// The refresh produced this credential and it was stored.
    Refreshed(Vec<PendingRequest>, Credential),
    /// A login landed while the refresh was in flight; replay with the stored credential.
    Relogged(Vec<PendingRequest>),
    Failed(Vec<PendingRequest>, ClientError),
}

/// Owner of the refresh flag and the wait queue.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self { state: Mutex::new(RefreshState::Idle) }
    }

    pub fn is_refreshing(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::Refreshing { .. })
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(*self.state.lock(), RefreshState::LoggedOut)
    }

    /// Route a request that just failed with 401.
    ///
    /// `current` reads the stored credential. It runs under the state lock,
    /// the same lock a successful refresh persists under.
    pub(crate) fn admit(
        &self,
        mut pending: PendingRequest,
        current: impl FnOnce() -> Result<Option<Credential>, ClientError>,
    ) -> Admission {
        let mut state = self.state.lock();
        pending.attempt.mark_retried();
        match &mut *state {
            RefreshState::Refreshing { queue, .. } => {
                queue.push(pending);
                Admission::Queued(queue.len() - 1)
            }
            RefreshState::LoggedOut => {
                Admission::Reject { pending, error: ClientError::LoggedOut, teardown: false }
            }
            RefreshState::Idle => match current() {
                Err(error) => Admission::Reject { pending, error, teardown: false },
                Ok(None) => {
                    *state = RefreshState::LoggedOut;
                    Admission::Reject { pending, error: ClientError::NoCredential, teardown: true }
                }
                Ok(Some(cred)) if pending.attempt.sent_token() != Some(cred.token.as_str()) => {
                    Admission::Replay(pending, cred)
                }
                Ok(Some(_)) => {
                    *state = RefreshState::Refreshing {
                        queue: vec![pending],
                        abandoned: false,
                        relogged: false,
                    };
                    Admission::Start
                }
            },
        }
    }

    /// Close out a successful refresh call.
    ///
    /// `persist` runs under the state lock so the new credential is stored
    /// before any request can observe `Idle`.
    pub(crate) fn complete(
        &self,
        credential: Credential,
        persist: impl FnOnce(&Credential) -> anyhow::Result<()>,
    ) -> Settled {
        let mut state = self.state.lock();
        let (queue, abandoned, relogged) =
            match std::mem::replace(&mut *state, RefreshState::Idle) {
                RefreshState::Refreshing { queue, abandoned, relogged } => {
                    (queue, abandoned, relogged)
                }
                other => {
                    *state = other;
                    return Settled::Refreshed(Vec::new(), credential);
                }
            };
        if relogged {
            return Settled::Relogged(queue);
        }
        if abandoned {
            *state = RefreshState::LoggedOut;
            return Settled::Failed(queue, ClientError::LoggedOut);
        }
        match persist(&credential) {
            Ok(()) => Settled::Refreshed(queue, credential),
            Err(e) => {
                *state = RefreshState::LoggedOut;
                Settled::Failed(queue, ClientError::Store(e.to_string()))
            }
        }
    }

    /// Close out a failed refresh call. No refresh runs again until [`Self::rearm`].
    pub(crate) fn fail(&self, cause: ClientError) -> Settled {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, RefreshState::LoggedOut) {
            RefreshState::Refreshing { queue, relogged: true, .. } => {
                *state = RefreshState::Idle;
                Settled::Relogged(queue)
            }
            RefreshState::Refreshing { queue, abandoned: true, .. } => {
                Settled::Failed(queue, ClientError::LoggedOut)
            }
            RefreshState::Refreshing { queue, .. } => Settled::Failed(queue, cause),
            _ => Settled::Failed(Vec::new(), cause),
        }
    }

    /// A login is storing a fresh credential: allow refreshes again.
    ///
    /// `persist` runs under the state lock. A refresh still in flight keeps
    /// its queue but yields to the login when it settles.
    pub(crate) fn rearm(
        &self,
        persist: impl FnOnce() -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        persist()?;
        match &mut *state {
            RefreshState::LoggedOut => *state = RefreshState::Idle,
            RefreshState::Refreshing { abandoned, relogged, .. } => {
                *abandoned = false;
                *relogged = true;
            }
            RefreshState::Idle => {}
        }
        Ok(())
    }

    /// Explicit logout. An in-flight refresh finishes but its result is dropped.
    pub(crate) fn log_out(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            RefreshState::Refreshing { abandoned, relogged, .. } => {
                *abandoned = true;
                *relogged = false;
            }
            _ => *state = RefreshState::LoggedOut,
        }
    }
}

/// Recover a request that failed with 401 on its first attempt.
pub(crate) async fn recover(
    shared: &Arc<Shared>,
    attempt: Attempt,
) -> Result<ApiResponse, ClientError> {
    let method = attempt.spec.method.to_string();
    let path = attempt.spec.path.clone();
    let (pending, rx) = PendingRequest::new(attempt);

    let current = || shared.session.credential().map_err(|e| ClientError::Store(e.to_string()));
    match shared.coordinator.admit(pending, current) {
        Admission::Start => {
            info!(%method, %path, "credential rejected, refreshing session");
            shared.emit(SessionEvent::Deferred { method, path });
            let task = Arc::clone(shared);
            tokio::spawn(async move {
                run_refresh(task).await;
            });
        }
        Admission::Queued(queued) => {
            debug!(%method, %path, queued, "waiting on in-flight refresh");
            shared.emit(SessionEvent::Deferred { method, path });
        }
        Admission::Replay(pending, credential) => {
            debug!(%method, %path, "credential already refreshed, replaying");
            replay::replay_all(shared, vec![pending], &credential).await;
        }
        Admission::Reject { pending, error, teardown: clear } => {
            debug!(%method, %path, err = %error, "rejecting without refresh");
            if clear {
                teardown(&shared.session, shared.navigator.as_ref());
                shared.emit(SessionEvent::LoggedOut);
            }
            pending.settle(Err(error));
        }
    }

    rx.await.unwrap_or(Err(ClientError::Abandoned))
}

/// Perform the one refresh call and release the queue.
async fn run_refresh(shared: Arc<Shared>) {
    let refresh_token = match shared.session.refresh_token() {
        Ok(token) => token,
        Err(e) => {
            warn!(err = %e, "could not read refresh token");
            None
        }
    };

    let settled = match shared.transport.refresh(refresh_token.as_deref()).await {
        Ok(tokens) => {
            let settled = shared.coordinator.complete(tokens.credential(), |credential| {
                shared.session.establish(credential, &tokens.user, tokens.refresh_token.as_deref())
            });
            if let Settled::Refreshed(ref queue, _) = settled {
                info!(user = %tokens.user.id, queued = queue.len(), "session refreshed");
                shared.emit(SessionEvent::Refreshed { identity: tokens.user });
            }
            settled
        }
        Err(e) => shared.coordinator.fail(e),
    };

    match settled {
        Settled::Refreshed(queue, credential) => {
            replay::replay_all(&shared, queue, &credential).await;
        }
        Settled::Relogged(queue) => {
            info!(queued = queue.len(), "login replaced the session mid-refresh");
            match shared.session.credential() {
                Ok(Some(credential)) => replay::replay_all(&shared, queue, &credential).await,
                Ok(None) => replay::reject_all(queue, &ClientError::LoggedOut),
                Err(e) => replay::reject_all(queue, &ClientError::Store(e.to_string())),
            }
        }
        Settled::Failed(queue, cause) => {
            // A logout during the refresh already tore the session down.
            if !matches!(cause, ClientError::LoggedOut) {
                warn!(err = %cause, queued = queue.len(), "session refresh failed, logging out");
                teardown(&shared.session, shared.navigator.as_ref());
                shared.emit(SessionEvent::RefreshFailed { error: cause.to_string() });
                shared.emit(SessionEvent::LoggedOut);
            }
            replay::reject_all(queue, &cause);
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
