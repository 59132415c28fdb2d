use async_trait::async_trait;
use serde_json::Value;

pub mod client;

pub use client::{HttpProvider, decode_body};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Parse,
    Extract,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Parse => "/v1/ade/parse",
            Endpoint::Extract => "/v1/ade/extract",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File { filename: String, bytes: Vec<u8> },
}

/// Multipart body bound for the provider, kept transport-agnostic so fakes can
/// inspect exactly what would have been sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderForm {
    fields: Vec<(String, FormValue)>,
}

impl ProviderForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields
            .push((name.to_string(), FormValue::Text(value.into())));
        self
    }

    pub fn file(mut self, name: &str, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.fields.push((
            name.to_string(),
            FormValue::File {
                filename: filename.into(),
                bytes,
            },
        ));
        self
    }

    pub fn fields(&self) -> &[(String, FormValue)] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<(String, FormValue)> {
        self.fields
    }

    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|(field, value)| match value {
            FormValue::Text(text) if field == name => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn file_name(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|(field, value)| match value {
            FormValue::File { filename, .. } if field == name => Some(filename.as_str()),
            _ => None,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(field, _)| field == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: Value,
}

impl ProviderResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("provider request timed out")]
    TimedOut,
    #[error("failed to read provider response: {0}")]
    Body(String),
}

#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: Endpoint,
        api_key: &str,
        form: ProviderForm,
    ) -> Result<ProviderResponse, TransportError>;
}
