use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ApiKey, ProxyError, forward, non_blank, require_key, validate_url};
use crate::provider::{Endpoint, ProviderForm, ProviderTransport};

pub const DEFAULT_PARSE_MODEL: &str = "dpt-2-latest";

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    Upload { filename: String, bytes: Vec<u8> },
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseRequest {
    pub source: DocumentSource,
    pub model: Option<String>,
    pub split: Option<String>,
}

impl ParseRequest {
    pub fn new(source: DocumentSource) -> Self {
        Self {
            source,
            model: None,
            split: None,
        }
    }

    pub fn upload(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(DocumentSource::Upload {
            filename: filename.into(),
            bytes,
        })
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::new(DocumentSource::Url(url.into()))
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_split(mut self, split: Option<String>) -> Self {
        self.split = split;
        self
    }

    /// Builds a request from loosely-typed form input. Exactly one of
    /// `document` and `document_url` must be present.
    pub fn from_parts(
        document: Option<(String, Vec<u8>)>,
        document_url: Option<String>,
        model: Option<String>,
        split: Option<String>,
    ) -> Result<Self, ProxyError> {
        let source = match (document, non_blank(document_url)) {
            (Some(_), Some(_)) => {
                return Err(ProxyError::missing_input(
                    "Provide either document or document_url, not both",
                ));
            }
            (None, None) => {
                return Err(ProxyError::missing_input(
                    "Either document or document_url must be provided",
                ));
            }
            (Some((filename, bytes)), None) => {
                if filename.trim().is_empty() {
                    return Err(ProxyError::invalid_input("document is missing a filename"));
                }
                if bytes.is_empty() {
                    return Err(ProxyError::invalid_input("document is empty"));
                }
                DocumentSource::Upload { filename, bytes }
            }
            (None, Some(url)) => DocumentSource::Url(validate_url("document_url", url)?),
        };

        Ok(Self {
            source,
            model: non_blank(model),
            split: non_blank(split),
        })
    }

    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_PARSE_MODEL)
    }

    fn into_form(self) -> ProviderForm {
        let model = self.effective_model().to_string();
        let form = match self.source {
            DocumentSource::Upload { filename, bytes } => {
                ProviderForm::new().file("document", filename, bytes)
            }
            DocumentSource::Url(url) => ProviderForm::new().text("document_url", url),
        };
        let form = form.text("model", model);
        match self.split {
            Some(split) => form.text("split", split),
            None => form,
        }
    }
}

#[async_trait]
pub trait ParseService: Send + Sync {
    /// Returns the provider's parse result verbatim.
    async fn parse(&self, request: ParseRequest) -> Result<Value, ProxyError>;
}

#[derive(Clone)]
pub struct ParseProxy {
    transport: Arc<dyn ProviderTransport>,
    api_key: Option<ApiKey>,
}

impl ParseProxy {
    pub fn new(transport: Arc<dyn ProviderTransport>, api_key: Option<ApiKey>) -> Self {
        Self { transport, api_key }
    }
}

#[async_trait]
impl ParseService for ParseProxy {
    async fn parse(&self, request: ParseRequest) -> Result<Value, ProxyError> {
        let api_key = require_key(self.api_key.as_ref())?;
        forward(
            self.transport.as_ref(),
            Endpoint::Parse,
            api_key,
            request.into_form(),
            "Failed to parse document",
        )
        .await
    }
}
