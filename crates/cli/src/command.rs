// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fieldops` subcommands.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;

use fieldops_client::{ApiClient, ClientError, FileStore, Navigator, RequestSpec, Session};

use crate::config::{Cli, Command};

/// The CLI's "login view": a hint on stderr, printed once per process.
#[derive(Default)]
pub struct LoginHint {
    shown: AtomicBool,
}

impl Navigator for LoginHint {
    fn is_at_login(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }

    fn to_login(&self) {
        if !self.shown.swap(true, Ordering::SeqCst) {
            eprintln!("session expired; run `fieldops login` to sign in again");
        }
    }
}

/// Run the selected subcommand and return the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let session = Session::new(Arc::new(FileStore::new(cli.client.session_file())));
    let client = ApiClient::with_navigator(cli.client, session, Arc::new(LoginHint::default()))?;

    let outcome = match cli.command {
        Command::Login { username, password } => login(&client, &username, &password).await,
        Command::Logout => {
            client.logout();
            println!("logged out");
            Ok(())
        }
        Command::Whoami => whoami(&client),
        Command::Request { method, path, data, headers } => {
            let spec = build_request(&method, &path, data.as_deref(), &headers)?;
            request(&client, spec).await
        }
    };

    match outcome {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("error: {e}");
            Ok(exit_code(&e))
        }
    }
}

fn exit_code(err: &ClientError) -> i32 {
    if err.is_auth() {
        2
    } else {
        1
    }
}

async fn login(client: &ApiClient, username: &str, password: &str) -> Result<(), ClientError> {
    let who = client.login(username, password).await?;
    println!("logged in as {} ({})", who.display_name, who.role);
    Ok(())
}

fn whoami(client: &ApiClient) -> Result<(), ClientError> {
    let (who, cred) = match (client.identity()?, client.credential()?) {
        (Some(who), Some(cred)) => (who, cred),
        _ => return Err(ClientError::NoCredential),
    };
    println!("{} ({}), id {}", who.display_name, who.role, who.id);
    match cred.expires_in_secs() {
        Some(0) => println!("credential expired; it will be refreshed on the next request"),
        Some(secs) => println!("credential expires in {}m {:02}s", secs / 60, secs % 60),
        None => println!("credential expiry unknown"),
    }
    Ok(())
}

async fn request(client: &ApiClient, spec: RequestSpec) -> Result<(), ClientError> {
    let resp = client.send(spec).await?;
    match resp.json::<serde_json::Value>() {
        Ok(serde_json::Value::Null) => {}
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| resp.text()))
        }
        Err(_) => println!("{}", resp.text()),
    }
    Ok(())
}

/// Turn CLI arguments into a request description.
pub fn build_request(
    method: &str,
    path: &str,
    data: Option<&str>,
    headers: &[String],
) -> anyhow::Result<RequestSpec> {
    let method: Method = method
        .to_uppercase()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid HTTP method: {method}"))?;
    let mut spec = RequestSpec::new(method, path);
    if let Some(raw) = data {
        let body: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("--data is not JSON: {e}"))?;
        spec = spec.with_body(body);
    }
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("header must be `Name: value`: {header}"))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())?;
        let value = HeaderValue::from_str(value.trim())?;
        spec = spec.header(name, value);
    }
    Ok(spec)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
