use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{ApiKey, ProxyError, forward, non_blank, require_key, validate_url};
use crate::provider::{Endpoint, ProviderForm, ProviderTransport};

pub const DEFAULT_EXTRACT_MODEL: &str = "extract-latest";

#[derive(Debug, Clone, PartialEq)]
pub enum MarkdownSource {
    Inline(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractRequest {
    pub source: MarkdownSource,
    pub schema: Value,
    pub model: Option<String>,
}

impl ExtractRequest {
    pub fn inline(markdown: impl Into<String>, schema: Value) -> Self {
        Self {
            source: MarkdownSource::Inline(markdown.into()),
            schema,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = non_blank(model);
        self
    }

    /// Exactly one of `markdown` and `markdown_url`, plus a JSON `schema`.
    pub fn from_parts(
        markdown: Option<String>,
        markdown_url: Option<String>,
        schema: Option<String>,
        model: Option<String>,
    ) -> Result<Self, ProxyError> {
        let markdown = markdown.filter(|text| !text.trim().is_empty());
        let source = match (markdown, non_blank(markdown_url)) {
            (Some(_), Some(_)) => {
                return Err(ProxyError::missing_input(
                    "Provide either markdown or markdown_url, not both",
                ));
            }
            (None, None) => {
                return Err(ProxyError::missing_input(
                    "Either markdown or markdown_url must be provided",
                ));
            }
            (Some(markdown), None) => MarkdownSource::Inline(markdown),
            (None, Some(url)) => MarkdownSource::Url(validate_url("markdown_url", url)?),
        };

        let schema = non_blank(schema).ok_or_else(ProxyError::missing_schema)?;
        let schema: Value = serde_json::from_str(&schema)
            .map_err(|err| ProxyError::invalid_input(format!("schema is not valid JSON: {err}")))?;

        Ok(Self {
            source,
            schema,
            model: non_blank(model),
        })
    }

    pub fn effective_model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_EXTRACT_MODEL)
    }

    fn into_form(self) -> Result<ProviderForm, ProxyError> {
        if self.schema.is_null() {
            return Err(ProxyError::missing_schema());
        }
        let model = self.effective_model().to_string();
        let schema = match self.schema {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let form = match self.source {
            MarkdownSource::Inline(markdown) => ProviderForm::new().text("markdown", markdown),
            MarkdownSource::Url(url) => ProviderForm::new().text("markdown_url", url),
        };
        Ok(form.text("schema", schema).text("model", model))
    }
}

#[async_trait]
pub trait ExtractService: Send + Sync {
    async fn extract(&self, request: ExtractRequest) -> Result<Value, ProxyError>;
}

#[derive(Clone)]
pub struct ExtractProxy {
    transport: Arc<dyn ProviderTransport>,
    api_key: Option<ApiKey>,
}

impl ExtractProxy {
    pub fn new(transport: Arc<dyn ProviderTransport>, api_key: Option<ApiKey>) -> Self {
        Self { transport, api_key }
    }
}

#[async_trait]
impl ExtractService for ExtractProxy {
    async fn extract(&self, request: ExtractRequest) -> Result<Value, ProxyError> {
        let form = request.into_form()?;
        let api_key = require_key(self.api_key.as_ref())?;
        forward(
            self.transport.as_ref(),
            Endpoint::Extract,
            api_key,
            form,
            "Failed to extract data",
        )
        .await
    }
}
