// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated API client for the field-service console.
//!
//! Every business module (work orders, technicians, vehicles, inventory)
//! talks to the backend through [`ApiClient::send`]. The client attaches the
//! stored bearer credential, refreshes it at most once when the server
//! answers 401, replays the requests that failed meanwhile, and tears the
//! session down when the refresh itself fails.

pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod refresh;
mod replay;
pub mod request;
pub mod store;
pub mod teardown;
mod transport;

use std::sync::Once;

pub use config::ClientConfig;
pub use credential::{Credential, Identity};
pub use dispatch::ApiClient;
pub use error::ClientError;
pub use events::SessionEvent;
pub use request::{ApiResponse, RequestSpec};
pub use store::{FileStore, KeyValueStore, MemoryStore, Session};
pub use teardown::{Navigator, NoopNavigator};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
