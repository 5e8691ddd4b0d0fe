use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "prop-edge/0.1";

const SNIPPET_CHARS: usize = 220;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http {status}: {snippet}")]
    Status { status: StatusCode, snippet: String },
    #[error("invalid payload: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Decode(_) => "decode",
        }
    }
}

pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

/// GET `url` and return the body, failing on any non-2xx status.
pub fn fetch_text(
    client: &Client,
    url: &str,
    mut headers: HeaderMap,
) -> Result<String, FetchError> {
    if !headers.contains_key(USER_AGENT) {
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
    }
    let resp = client.get(url).headers(headers).send()?;
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        return Err(FetchError::Status {
            status,
            snippet: snippet(&body),
        });
    }
    Ok(body)
}

pub fn snippet(body: &str) -> String {
    body.trim()
        .replace(['\n', '\r'], " ")
        .chars()
        .take(SNIPPET_CHARS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_flattens_and_truncates() {
        let body = format!("  line one\nline two\r\n{}", "x".repeat(400));
        let s = snippet(&body);
        assert!(s.starts_with("line one line two"));
        assert_eq!(s.chars().count(), SNIPPET_CHARS);
    }

    #[test]
    fn error_kinds() {
        let err = FetchError::Decode("missing data".to_string());
        assert_eq!(err.kind(), "decode");
        assert_eq!(err.to_string(), "invalid payload: missing data");
    }
}
