//! Shared types, error model, ports and configuration for the outreach engine.
//!
//! This crate is the foundation depended on by all other outreach crates.
//! It provides:
//! - [`OutreachError`] and [`ProviderError`], the error model
//! - Domain types ([`ClientContext`], [`Contact`], [`StageResult`], [`Draft`], [`RunRecord`])
//! - Collaborator traits ([`CompletionProvider`], [`SearchProvider`], [`ContentFetcher`],
//!   [`ContextStore`], [`TemplateSource`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod ports;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, DefaultsConfig, EffortTiersConfig, FetchConfig, GenerationConfig,
    OpenRouterConfig, SearchConfig, ValidationConfig, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{OutreachError, ProviderError, Result};
pub use ports::{
    Completion, CompletionProvider, ContentFetcher, ContextStore, PageContent, Prompt, SearchHit,
    SearchProvider, TemplateSource,
};
pub use types::{
    AttemptRecord, CaseStudy, ClientContext, ClientId, Confidence, Contact, Criterion,
    CriterionScore, Draft, EffortTier, Evidence, Issue, ProviderConfig, RunId, RunRecord,
    RunState, Source, StageKind, StageOutputs, StageResult, Template, Usage, ValidationReport,
};
