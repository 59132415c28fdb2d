use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde_json::Value;
use tokio::time::Duration;
use tracing::debug;

use super::{Endpoint, FormValue, ProviderForm, ProviderResponse, ProviderTransport, TransportError};
use crate::config::ProviderConfig;

pub struct HttpProvider {
    http: Client,
    base: String,
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build provider http client")?;
        Ok(Self {
            http,
            base: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base, endpoint.path())
    }

    fn multipart(form: ProviderForm) -> Form {
        form.into_fields()
            .into_iter()
            .fold(Form::new(), |multipart, (name, value)| match value {
                FormValue::Text(text) => multipart.text(name, text),
                FormValue::File { filename, bytes } => {
                    multipart.part(name, Part::bytes(bytes).file_name(filename))
                }
            })
    }
}

#[async_trait]
impl ProviderTransport for HttpProvider {
    async fn send(
        &self,
        endpoint: Endpoint,
        api_key: &str,
        form: ProviderForm,
    ) -> Result<ProviderResponse, TransportError> {
        let url = self.url(endpoint);
        let res = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .multipart(Self::multipart(form))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::TimedOut
                } else {
                    TransportError::Unreachable(err.to_string())
                }
            })?;

        let status = res.status().as_u16();
        let text = res
            .text()
            .await
            .map_err(|err| TransportError::Body(err.to_string()))?;
        debug!(%url, status, bytes = text.len(), "provider responded");

        Ok(ProviderResponse {
            status,
            body: decode_body(&text),
        })
    }
}

/// Provider bodies are JSON in practice; anything else is kept as a string so
/// error details are never dropped.
pub fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
