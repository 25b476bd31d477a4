//! Traits for the external collaborators the engine consumes.
//!
//! Adapters live in `outreach-providers` and `outreach-context`; tests use
//! scripted in-process fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProviderError, Result};
use crate::types::{ClientContext, ClientId, ProviderConfig, Template};

/// A chat prompt: system instructions plus one user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Text returned by the completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

/// A ranked web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Readable text extracted from a fetched page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub url: Url,
    pub title: Option<String>,
    pub text: String,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &Prompt,
        config: &ProviderConfig,
    ) -> std::result::Result<Completion, ProviderError>;
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Ranked hits, best first. An empty list is not an error.
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, ProviderError>;
}

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<PageContent, ProviderError>;
}

#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Fails with `ContextNotFound` when the client is unknown.
    async fn load_context(&self, client_id: &ClientId) -> Result<ClientContext>;
}

#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Fails with `TemplateNotFound` when no template has that name.
    async fn get_template(&self, name: &str) -> Result<Template>;
}
