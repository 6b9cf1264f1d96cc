// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request dispatcher: the one entry point business code calls.

use std::sync::Arc;

use reqwest::StatusCode;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::credential::{Credential, Identity};
use crate::error::ClientError;
use crate::events::SessionEvent;
use crate::refresh::{self, RefreshCoordinator};
use crate::request::{ApiResponse, Attempt, RequestSpec};
use crate::store::{FileStore, Session};
use crate::teardown::{teardown, Navigator, NoopNavigator};

/// State shared between callers and the background refresh task.
pub(crate) struct Shared {
    pub transport: crate::transport::HttpTransport,
    pub session: Session,
    pub coordinator: RefreshCoordinator,
    pub navigator: Arc<dyn Navigator>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Send a first attempt, routing a 401 into credential recovery.
    async fn dispatch(self: &Arc<Self>, mut attempt: Attempt) -> Result<ApiResponse, ClientError> {
        let credential = self.current_credential()?;
        let resp = self.transport.transmit(&mut attempt, credential.as_ref()).await?;
        if resp.status == StatusCode::UNAUTHORIZED && !attempt.is_retried() {
            return refresh::recover(self, attempt).await;
        }
        settle_status(resp)
    }

    /// Send an attempt that already went through recovery. 401 is final here.
    pub async fn send_replay(
        &self,
        attempt: &mut Attempt,
        credential: &Credential,
    ) -> Result<ApiResponse, ClientError> {
        let resp = self.transport.transmit(attempt, Some(credential)).await?;
        settle_status(resp)
    }

    fn current_credential(&self) -> Result<Option<Credential>, ClientError> {
        self.session.credential().map_err(|e| ClientError::Store(e.to_string()))
    }
}

fn settle_status(resp: ApiResponse) -> Result<ApiResponse, ClientError> {
    if resp.status.is_success() {
        return Ok(resp);
    }
    if resp.status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    Err(ClientError::Status { status: resp.status.as_u16(), body: resp.text() })
}

/// Authenticated console API client.
///
/// Cheap to clone; clones share the session, the refresh coordinator and
/// the event channel.
#[derive(Clone)]
pub struct ApiClient {
    shared: Arc<Shared>,
}

impl ApiClient {
    /// Client over `session` with no login view to redirect to.
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, ClientError> {
        Self::with_navigator(config, session, Arc::new(NoopNavigator))
    }

    /// Client persisting its session to `config.session_file()`.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let session = Session::new(Arc::new(FileStore::new(config.session_file())));
        Self::new(config, session)
    }

    pub fn with_navigator(
        config: ClientConfig,
        session: Session,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let transport = crate::transport::HttpTransport::new(config)?;
        let (events, _) = broadcast::channel(64);
        let shared = Shared {
            transport,
            session,
            coordinator: RefreshCoordinator::new(),
            navigator,
            events,
        };
        Ok(Self { shared: Arc::new(shared) })
    }

    pub fn config(&self) -> &ClientConfig {
        self.shared.transport.config()
    }

    /// Read access to the stored session. Log in through [`Self::login`] or
    /// [`Self::establish`] so the refresh coordinator is re-armed.
    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.shared.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Send a request with the current credential.
    ///
    /// A 401 is recovered by refreshing the credential once and replaying the
    /// request; the caller only sees the final outcome.
    pub async fn send(&self, spec: RequestSpec) -> Result<ApiResponse, ClientError> {
        debug!(method = %spec.method, path = %spec.path, "send");
        self.shared.dispatch(Attempt::first(spec)).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(RequestSpec::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, ClientError> {
        self.send(RequestSpec::post(path).with_body(body)).await
    }

    pub async fn put(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, ClientError> {
        self.send(RequestSpec::put(path).with_body(body)).await
    }

    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<ApiResponse, ClientError> {
        self.send(RequestSpec::patch(path).with_body(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ClientError> {
        self.send(RequestSpec::delete(path)).await
    }

    /// Log in with username and password, replacing any stored session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, ClientError> {
        let tokens = self.shared.transport.login(username, password).await.map_err(|e| match e {
            ClientError::Status { status: 401, .. } => ClientError::Unauthorized,
            other => other,
        })?;
        self.establish(&tokens.credential(), &tokens.user, tokens.refresh_token.as_deref())?;
        Ok(tokens.user)
    }

    /// Store a credential obtained elsewhere and allow refreshes again.
    ///
    /// This is the only way to write a session from outside the crate;
    /// [`Session`] exposes reads and `clear` but not `establish`.
    pub fn establish(
        &self,
        credential: &Credential,
        identity: &Identity,
        refresh_token: Option<&str>,
    ) -> Result<(), ClientError> {
        let session = &self.shared.session;
        self.shared
            .coordinator
            .rearm(|| session.establish(credential, identity, refresh_token))
            .map_err(|e| ClientError::Store(e.to_string()))?;
        info!(user = %identity.id, role = %identity.role, "logged in");
        self.shared.emit(SessionEvent::LoggedIn { identity: identity.clone() });
        Ok(())
    }

    /// End the session. Calling it again is harmless.
    pub fn logout(&self) {
        self.shared.coordinator.log_out();
        teardown(&self.shared.session, self.shared.navigator.as_ref());
        self.shared.emit(SessionEvent::LoggedOut);
    }

    pub fn identity(&self) -> Result<Option<Identity>, ClientError> {
        self.shared.session.identity().map_err(|e| ClientError::Store(e.to_string()))
    }

    pub fn credential(&self) -> Result<Option<Credential>, ClientError> {
        self.shared.current_credential()
    }
}
