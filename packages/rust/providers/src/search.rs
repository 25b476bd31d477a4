//! Brave-compatible web search client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;
use tracing::{debug, instrument};

use outreach_shared::{OutreachError, ProviderError, Result, SearchConfig, SearchHit, SearchProvider};

use crate::http::{USER_AGENT, check_response, transport_error};

/// [`SearchProvider`] over the Brave web search API.
pub struct BraveSearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
    count: u32,
}

impl BraveSearchClient {
    pub fn new(config: &SearchConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OutreachError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: api_key.into(),
            count: config.count,
        })
    }

    /// `None` when the key variable is unset; search is optional.
    pub fn from_env(config: &SearchConfig) -> Result<Option<Self>> {
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.is_empty() => Self::new(config, key).map(Some),
            _ => Ok(None),
        }
    }
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<WebResults>,
}

#[derive(Deserialize)]
struct WebResults {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    title: String,
    url: String,
    #[serde(default)]
    description: String,
}

#[async_trait]
impl SearchProvider for BraveSearchClient {
    #[instrument(skip(self))]
    async fn search(&self, query: &str) -> std::result::Result<Vec<SearchHit>, ProviderError> {
        let count = self.count.to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| transport_error("search", &e))?;
        let resp = check_response(resp, "search").await?;

        let parsed: BraveResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("search body: {e}")))?;

        let hits: Vec<SearchHit> = parsed
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| SearchHit {
                title: strip_markup(&r.title),
                url: r.url,
                snippet: strip_markup(&r.description),
            })
            .collect();

        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }
}

/// Snippets carry `<strong>` highlighting and entities.
fn strip_markup(text: &str) -> String {
    let fragment = Html::parse_fragment(text);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client(server: &MockServer) -> BraveSearchClient {
        let config = SearchConfig {
            endpoint: format!("{}/res/v1/web/search", server.uri()),
            count: 3,
            ..SearchConfig::default()
        };
        BraveSearchClient::new(&config, "brave-key").unwrap()
    }

    #[tokio::test]
    async fn maps_results_to_hits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "Northwind Logistics news"))
            .and(query_param("count", "3"))
            .and(header("x-subscription-token", "brave-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "web": {"results": [{
                    "title": "Northwind opens <strong>Rotterdam</strong> hub",
                    "url": "https://news.example.com/northwind",
                    "description": "Northwind Logistics &amp; partners opened a hub."
                }]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let hits = client(&server).search("Northwind Logistics news").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Northwind opens Rotterdam hub");
        assert_eq!(hits[0].snippet, "Northwind Logistics & partners opened a hub.");
        assert_eq!(hits[0].url, "https://news.example.com/northwind");
    }

    #[tokio::test]
    async fn missing_web_section_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        assert!(client(&server).search("anything").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server).search("anything").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }
}
