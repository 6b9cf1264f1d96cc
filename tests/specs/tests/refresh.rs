// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios for credential refresh, replay and teardown.

use std::sync::Arc;

use fieldops_client::{ApiClient, ApiResponse, ClientError, FileStore, Session, SessionEvent};
use fieldops_specs::{wait_deferred, FakeConsole, PASSWORD};
use tokio::task::JoinHandle;

fn spawn_get(client: &ApiClient, path: &str) -> JoinHandle<Result<ApiResponse, ClientError>> {
    let client = client.clone();
    let path = path.to_owned();
    tokio::spawn(async move { client.get(&path).await })
}

// -- Pass-through -------------------------------------------------------------

#[tokio::test]
async fn valid_credential_passes_through() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    let before = client.credential()?;

    let resp = client.post("/work-orders", serde_json::json!({ "title": "Inspect pump" })).await?;
    let body: serde_json::Value = resp.json()?;

    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"]["title"], "Inspect pump");
    assert_eq!(console.refresh_calls(), 0);
    assert_eq!(client.credential()?, before);
    Ok(())
}

#[tokio::test]
async fn other_status_propagates_without_refresh() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;

    let err = client.get("/status/503").await.err();

    assert!(matches!(err, Some(ClientError::Status { status: 503, .. })));
    assert_eq!(console.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn network_error_propagates_without_refresh() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let dead_port = listener.local_addr()?.port();
    drop(listener);

    let config = fieldops_client::ClientConfig::with_base_url(format!("http://127.0.0.1:{dead_port}/api"));
    let client = ApiClient::new(config, Session::in_memory())?;

    let err = client.get("/vehicles").await.err();

    assert!(matches!(err, Some(ClientError::Network(_))));
    assert_eq!(console.refresh_calls(), 0);
    Ok(())
}

// -- Single-flight refresh ----------------------------------------------------

#[tokio::test]
async fn concurrent_401s_share_one_refresh() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    let mut events = client.subscribe();

    console.expire_credentials();
    console.hold_refresh();
    let calls = [
        spawn_get(&client, "/work-orders"),
        spawn_get(&client, "/vehicles/12/location"),
        spawn_get(&client, "/materials"),
    ];
    wait_deferred(&mut events, 3).await?;
    assert!(client.coordinator().is_refreshing());
    console.release_refresh();

    for call in calls {
        let resp = call.await??;
        assert!(resp.status.is_success());
    }
    assert_eq!(console.refresh_calls(), 1);
    assert_eq!(console.rejected(), 3);

    let stored = client.credential()?.map(|c| c.token);
    assert_eq!(stored, Some(console.current_token()));
    assert!(client.credential()?.and_then(|c| c.expires_at).is_some());
    assert!(!client.coordinator().is_refreshing());
    Ok(())
}

#[tokio::test]
async fn replays_run_in_arrival_order() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    let mut events = client.subscribe();

    console.expire_credentials();
    console.hold_refresh();
    let mut calls = Vec::new();
    for (n, path) in ["/trigger", "/a", "/b", "/c"].into_iter().enumerate() {
        calls.push(spawn_get(&client, path));
        let deferred = wait_deferred(&mut events, 1).await?;
        assert_eq!(deferred, vec![path.to_owned()], "deferral {n}");
    }
    console.release_refresh();

    for call in calls {
        call.await??;
    }
    assert_eq!(console.served(), vec!["GET /trigger", "GET /a", "GET /b", "GET /c"]);
    assert_eq!(console.refresh_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn refreshed_event_carries_identity() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    let mut events = client.subscribe();

    console.expire_credentials();
    client.get("/technicians").await?;

    loop {
        match tokio::time::timeout(fieldops_specs::TIMEOUT, events.recv()).await?? {
            SessionEvent::Refreshed { identity } => {
                assert_eq!(identity.display_name, "Dispatch Desk");
                assert_eq!(identity.role, "dispatcher");
                break;
            }
            SessionEvent::Deferred { .. } => continue,
            other => anyhow::bail!("unexpected event: {other:?}"),
        }
    }
    Ok(())
}

// -- Retry guard --------------------------------------------------------------

#[tokio::test]
async fn replay_401_is_terminal() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    console.lock_path("/admin/settings");

    let err = client.get("/admin/settings").await.err();

    assert!(matches!(err, Some(ClientError::Unauthorized)));
    assert_eq!(console.refresh_calls(), 1);
    assert_eq!(console.rejected(), 2);
    // The refresh succeeded, so the session itself is intact.
    assert!(client.credential()?.is_some());
    Ok(())
}

// -- Failure and teardown -----------------------------------------------------

#[tokio::test]
async fn refresh_failure_rejects_all_and_logs_out() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    let mut events = client.subscribe();

    console.expire_credentials();
    console.fail_refresh();
    console.hold_refresh();
    let calls = [
        spawn_get(&client, "/work-orders"),
        spawn_get(&client, "/vehicles"),
        spawn_get(&client, "/gps/tracks"),
    ];
    wait_deferred(&mut events, 3).await?;
    console.release_refresh();

    for call in calls {
        match call.await? {
            Err(e @ ClientError::RefreshFailed { .. }) => assert!(e.is_auth()),
            other => anyhow::bail!("expected refresh failure, got {other:?}"),
        }
    }
    assert_eq!(console.refresh_calls(), 1);
    assert_eq!(client.credential()?, None);
    assert_eq!(client.identity()?, None);
    assert_eq!(client.session().refresh_token()?, None);
    assert_eq!(views.redirects(), 1);
    assert!(client.coordinator().is_logged_out());
    Ok(())
}

#[tokio::test]
async fn no_refresh_after_failure_until_login() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;

    console.expire_credentials();
    console.fail_refresh();
    assert!(client.get("/work-orders").await.is_err());
    assert_eq!(console.refresh_calls(), 1);

    let err = client.get("/work-orders").await.err();
    assert!(err.as_ref().is_some_and(ClientError::is_auth));
    assert_eq!(console.refresh_calls(), 1);
    assert_eq!(views.redirects(), 1);

    client.login("dispatch", PASSWORD).await?;
    let resp = client.get("/work-orders").await?;
    assert!(resp.status.is_success());
    Ok(())
}

#[tokio::test]
async fn missing_credential_rejects_without_refresh() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, views) = console.client()?;

    let err = client.get("/work-orders").await.err();

    assert!(matches!(err, Some(ClientError::NoCredential)));
    assert_eq!(console.refresh_calls(), 0);
    assert_eq!(views.redirects(), 1);
    Ok(())
}

#[tokio::test]
async fn logout_twice_is_harmless() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;

    client.logout();
    client.logout();

    assert_eq!(client.credential()?, None);
    assert_eq!(client.identity()?, None);
    assert_eq!(views.redirects(), 1);
    Ok(())
}

#[tokio::test]
async fn logout_during_refresh_discards_new_credential() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    let mut events = client.subscribe();

    console.expire_credentials();
    console.hold_refresh();
    let call = spawn_get(&client, "/work-orders");
    wait_deferred(&mut events, 1).await?;

    client.logout();
    console.release_refresh();

    assert!(matches!(call.await?, Err(ClientError::LoggedOut)));
    assert_eq!(client.credential()?, None);
    assert_eq!(views.redirects(), 1);
    Ok(())
}

#[tokio::test]
async fn relogin_during_refresh_keeps_new_session() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;
    let mut events = client.subscribe();

    console.expire_credentials();
    console.hold_refresh();
    let call = spawn_get(&client, "/work-orders");
    wait_deferred(&mut events, 1).await?;

    client.logout();
    client.login("dispatch", PASSWORD).await?;
    let login_token = client.credential()?.map(|c| c.token);
    console.release_refresh();

    let resp = call.await??;
    assert!(resp.status.is_success());
    assert_eq!(client.credential()?.map(|c| c.token), login_token);
    assert!(!client.coordinator().is_logged_out());

    console.expire_credentials();
    let resp = client.get("/vehicles").await?;
    assert!(resp.status.is_success());
    assert_eq!(console.refresh_calls(), 2);
    Ok(())
}

#[tokio::test]
async fn establish_rearms_after_refresh_failure() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;
    client.login("dispatch", PASSWORD).await?;

    console.expire_credentials();
    console.fail_refresh();
    assert!(client.get("/work-orders").await.is_err());
    assert!(client.coordinator().is_logged_out());

    let (other, _) = console.client()?;
    let who = other.login("dispatch", PASSWORD).await?;
    let credential = other.credential()?.ok_or_else(|| anyhow::anyhow!("no credential stored"))?;
    client.establish(&credential, &who, None)?;

    assert!(!client.coordinator().is_logged_out());
    let resp = client.get("/work-orders").await?;
    assert!(resp.status.is_success());
    Ok(())
}

// -- Login and persistence ----------------------------------------------------

#[tokio::test]
async fn bad_password_is_unauthorized() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let (client, _views) = console.client()?;

    let err = client.login("dispatch", "wrong").await.err();

    assert!(matches!(err, Some(ClientError::Unauthorized)));
    assert_eq!(client.credential()?, None);
    Ok(())
}

#[tokio::test]
async fn file_session_survives_restart() -> anyhow::Result<()> {
    let console = FakeConsole::start().await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.json");

    {
        let (client, _views) =
            console.client_with_session(Session::new(Arc::new(FileStore::new(&path))))?;
        let who = client.login("dispatch", PASSWORD).await?;
        assert_eq!(who.id, "u-1");
    }

    let (client, _views) =
        console.client_with_session(Session::new(Arc::new(FileStore::new(&path))))?;
    assert_eq!(client.identity()?.map(|i| i.display_name).as_deref(), Some("Dispatch Desk"));
    assert_eq!(client.session().refresh_token()?.as_deref(), Some("ref-1"));
    let resp = client.get("/inventory").await?;
    assert!(resp.status.is_success());
    assert_eq!(console.refresh_calls(), 0);
    Ok(())
}
