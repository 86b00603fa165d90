//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use reqwest::header::{ETAG, IF_NONE_MATCH};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{Conditional, SourceError};

/// Per-request ceiling; the fan-out applies its own, usually tighter, timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("ccscout/", env!("CARGO_PKG_VERSION"));

/// Build the client shared by an adapter (gzip transfer encoding enabled)
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .gzip(true)
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Map a non-success status to a `SourceError`.
///
/// 403 and 429 are how providers signal exhausted quota or rate limits.
pub fn status_error(provider: &str, status: StatusCode) -> SourceError {
    match status.as_u16() {
        403 | 429 => SourceError::QuotaExceeded {
            provider: provider.to_string(),
        },
        code => SourceError::Http {
            provider: provider.to_string(),
            status: code,
        },
    }
}

fn transport_error(provider: &str, err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout {
            provider: provider.to_string(),
            elapsed: REQUEST_TIMEOUT,
        }
    } else if err.is_decode() {
        SourceError::Malformed {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    } else {
        SourceError::Network {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

/// Send a request and decode its JSON body
pub async fn get_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T, SourceError> {
    match get_json_conditional(provider, request, None).await? {
        Conditional::Modified { body, .. } => Ok(body),
        // Only possible if the provider answers 304 unprompted
        Conditional::NotModified => Err(SourceError::Malformed {
            provider: provider.to_string(),
            message: "unexpected 304 for an unconditional request".to_string(),
        }),
    }
}

/// Send a request with `If-None-Match` when an ETag is known
pub async fn get_json_conditional<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
    etag: Option<&str>,
) -> Result<Conditional<T>, SourceError> {
    let request = match etag {
        Some(tag) => request.header(IF_NONE_MATCH, tag),
        None => request,
    };

    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    if status == StatusCode::NOT_MODIFIED {
        debug!(provider, "Provider returned 304 Not Modified");
        return Ok(Conditional::NotModified);
    }
    if !status.is_success() {
        return Err(status_error(provider, status));
    }

    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(provider, e))?;
    let body = serde_json::from_slice(&bytes).map_err(|e| SourceError::Malformed {
        provider: provider.to_string(),
        message: e.to_string(),
    })?;

    Ok(Conditional::Modified { body, etag })
}
