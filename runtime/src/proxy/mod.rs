//! Stateless adapters in front of the document-understanding provider.
//!
//! Both proxies hold the server-side credential, validate the caller's input
//! before touching the network, forward exactly one request and normalize the
//! provider's failure into a [`ProxyError`]. They never retry and never cache.

use std::fmt;

use serde_json::Value;
use tracing::warn;

use crate::{
    config::API_KEY_VAR,
    provider::{Endpoint, ProviderForm, ProviderTransport},
};

pub mod error;
pub mod extract;
pub mod parse;

pub use error::{ProxyError, upstream_reason};
pub use extract::{
    DEFAULT_EXTRACT_MODEL, ExtractProxy, ExtractRequest, ExtractService, MarkdownSource,
};
pub use parse::{DEFAULT_PARSE_MODEL, DocumentSource, ParseProxy, ParseRequest, ParseService};

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: Option<String>) -> Option<Self> {
        raw.map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(Self)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

fn require_key(api_key: Option<&ApiKey>) -> Result<&ApiKey, ProxyError> {
    api_key.ok_or_else(|| {
        warn!(var = API_KEY_VAR, "provider credential missing, refusing request");
        ProxyError::Unconfigured(API_KEY_VAR)
    })
}

async fn forward(
    transport: &dyn ProviderTransport,
    endpoint: Endpoint,
    api_key: &ApiKey,
    form: ProviderForm,
    failure: &'static str,
) -> Result<Value, ProxyError> {
    let response = transport.send(endpoint, api_key.expose(), form).await?;
    if !response.is_success() {
        warn!(
            endpoint = endpoint.path(),
            status = response.status,
            reason = %upstream_reason(&response.body),
            "provider rejected request"
        );
        return Err(ProxyError::Upstream {
            status: response.status,
            message: failure,
            details: response.body,
        });
    }
    Ok(response.body)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_url(field: &str, raw: String) -> Result<String, ProxyError> {
    match reqwest::Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(raw),
        _ => Err(ProxyError::invalid_input(format!(
            "{field} must be an absolute http(s) URL"
        ))),
    }
}
