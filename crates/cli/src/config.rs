// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};

use fieldops_client::ClientConfig;

/// Command-line access to the field-service console API.
#[derive(Debug, Parser)]
#[command(name = "fieldops", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub client: ClientConfig,

    /// Log format (json or text).
    #[arg(long, env = "FIELDOPS_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    #[arg(long, env = "FIELDOPS_LOG", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Log in and store the session
    Login {
        #[arg(long, short, env = "FIELDOPS_USERNAME")]
        username: String,
        #[arg(long, short, env = "FIELDOPS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Discard the stored session
    Logout,
    /// Show the logged-in user and credential expiry
    Whoami,
    /// Send a raw API request and print the response body
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE)
        method: String,
        /// Path relative to the base URL, e.g. /work-orders
        path: String,
        /// JSON request body
        #[arg(long, short)]
        data: Option<String>,
        /// Extra header as `Name: value` (repeatable)
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,
    },
}

impl Cli {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        if self.client.timeout_ms == 0 {
            anyhow::bail!("--timeout-ms must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
