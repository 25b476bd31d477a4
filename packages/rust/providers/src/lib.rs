//! HTTP adapters for the engine's external collaborators.
//!
//! - [`OpenRouterProvider`]: chat completions over the OpenRouter API
//! - [`BraveSearchClient`]: web search over a Brave-compatible endpoint
//! - [`SiteFetcher`]: single-page fetch with private-address protection and
//!   HTML-to-text extraction

mod http;
pub mod openrouter;
pub mod search;
pub mod site;

pub use openrouter::OpenRouterProvider;
pub use search::BraveSearchClient;
pub use site::SiteFetcher;
