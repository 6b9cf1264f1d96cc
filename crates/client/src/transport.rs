// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP plumbing shared by dispatch, refresh and replay.

use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::Serialize;

use crate::config::ClientConfig;
use crate::credential::{Credential, TokenResponse};
use crate::error::ClientError;
use crate::request::{ApiResponse, Attempt};

/// Thin wrapper over one `reqwest::Client` pointed at the console API.
pub(crate) struct HttpTransport {
    config: ClientConfig,
    client: Client,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        crate::ensure_crypto();
        let client = Client::builder().timeout(config.timeout()).cookie_store(true).build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `attempt` once, carrying `credential` as a bearer token if given.
    ///
    /// Any status comes back as `Ok`; only transport failures are `Err`.
    pub async fn transmit(
        &self,
        attempt: &mut Attempt,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ClientError> {
        let spec = &attempt.spec;
        let mut headers = spec.headers.clone();
        if credential.is_some() {
            headers.remove(AUTHORIZATION);
        }
        let mut req =
            self.client.request(spec.method.clone(), self.config.url(&spec.path)).headers(headers);
        if let Some(ref body) = spec.body {
            req = req.json(body);
        }
        if let Some(cred) = credential {
            req = req.bearer_auth(&cred.token);
        }
        attempt.record_sent(credential.map(|c| c.token.as_str()));

        let resp = req.send().await?;
        ApiResponse::read(resp).await
    }

    /// Exchange the session cookie (and refresh token, when stored) for a new credential.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<TokenResponse, ClientError> {
        let mut req = self.client.post(self.config.url(&self.config.refresh_path));
        if let Some(token) = refresh_token {
            req = req.json(&RefreshBody { refresh_token: token });
        }
        read_tokens(req.send().await?).await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse, ClientError> {
        let req = self
            .client
            .post(self.config.url(&self.config.login_path))
            .json(&LoginBody { username, password });
        read_tokens(req.send().await?).await
    }
}

async fn read_tokens(resp: reqwest::Response) -> Result<TokenResponse, ClientError> {
    let resp = ApiResponse::read(resp).await?;
    if !resp.status.is_success() {
        return Err(ClientError::Status { status: resp.status.as_u16(), body: resp.text() });
    }
    resp.json()
}
