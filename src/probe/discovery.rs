//! Model-id discovery for single-model servers.
//!
//! llama.cpp's server advertises whatever model it loaded under
//! `GET /v1/models`; deriving the id from there lets the conformance
//! probe run without hardcoding one. Discovery failures are
//! configuration errors, reported before any probing starts.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    id: String,
}

/// Map a chat-completions URL onto its sibling models endpoint.
pub fn models_url_from_chat_url(chat_url: &str) -> String {
    if let Some(base) = chat_url.strip_suffix("/v1/chat/completions") {
        return format!("{base}/v1/models");
    }
    if let Some(base) = chat_url.strip_suffix("/chat/completions") {
        return format!("{base}/models");
    }
    // Best effort: assume /v1/models exists at the URL's origin.
    match reqwest::Url::parse(chat_url) {
        Ok(mut url) => {
            url.set_path("/v1/models");
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => chat_url.to_string(),
    }
}

/// Fetch the first advertised model id.
pub async fn first_model_id(
    client: &reqwest::Client,
    chat_url: &str,
    timeout: Duration,
) -> Result<String> {
    let url = models_url_from_chat_url(chat_url);

    let response = client
        .get(&url)
        .timeout(timeout)
        .send()
        .await
        .with_context(|| format!("failed to fetch models from {url}"))?;

    let status = response.status();
    if !status.is_success() {
        bail!("models endpoint {url} returned HTTP {}", status.as_u16());
    }

    let models: ModelsResponse = response
        .json()
        .await
        .with_context(|| format!("invalid JSON from models endpoint {url}"))?;

    match models.data.into_iter().next() {
        Some(entry) if !entry.id.is_empty() => Ok(entry.id),
        _ => bail!("no model id found at {url}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────
