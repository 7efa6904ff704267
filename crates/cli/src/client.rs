// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Thin HTTP client over `smd`'s surface. Every subcommand goes through
//! here so the exit-code mapping (`spec.md` §6/§7) lives in exactly one
//! place: 0 success, 1 business error, 2 daemon unreachable.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::SmConfig;

/// A CLI-facing error that already knows its process exit code.
#[derive(Debug)]
pub struct CliError {
    pub message: String,
    pub exit_code: i32,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl CliError {
    fn unavailable(err: impl std::fmt::Display) -> Self {
        Self { message: format!("session manager unavailable: {err}"), exit_code: 2 }
    }

    fn business(message: impl Into<String>) -> Self {
        Self { message: message.into(), exit_code: 1 }
    }
}

pub struct SmClient {
    http: reqwest::Client,
    base_url: String,
}

impl SmClient {
    pub fn new(cfg: &SmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()?;
        Ok(Self { http, base_url: cfg.api_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn finish<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, CliError> {
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if status.is_success() {
            serde_json::from_value(body).map_err(|e| CliError::business(format!("unexpected response shape: {e}")))
        } else {
            Err(CliError::business(error_message(&body, status)))
        }
    }

    async fn finish_empty(resp: reqwest::Response) -> Result<(), CliError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        Err(CliError::business(error_message(&body, status)))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let resp = self.http.get(self.url(path)).send().await.map_err(CliError::unavailable)?;
        Self::finish(resp).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, CliError> {
        let resp = self.http.post(self.url(path)).json(body).send().await.map_err(CliError::unavailable)?;
        Self::finish(resp).await
    }

    pub async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), CliError> {
        let resp = self.http.post(self.url(path)).json(body).send().await.map_err(CliError::unavailable)?;
        Self::finish_empty(resp).await
    }

    pub async fn patch_empty<B: Serialize>(&self, path: &str, body: &B) -> Result<(), CliError> {
        let resp = self.http.patch(self.url(path)).json(body).send().await.map_err(CliError::unavailable)?;
        Self::finish_empty(resp).await
    }

    pub async fn delete_empty(&self, path: &str) -> Result<(), CliError> {
        let resp = self.http.delete(self.url(path)).send().await.map_err(CliError::unavailable)?;
        Self::finish_empty(resp).await
    }
}

fn error_message(body: &Value, status: reqwest::StatusCode) -> String {
    if let Some(err) = body.get("error").and_then(Value::as_str) {
        let code = body.get("error_code").and_then(Value::as_str).unwrap_or("");
        if code.is_empty() {
            err.to_string()
        } else {
            format!("{err} ({code})")
        }
    } else {
        format!("request failed: {status}")
    }
}
