//! Generation stages.
//!
//! Every stage implements [`Stage`]: it takes the contact, the client context
//! and optional correction hints, and always returns a [`StageResult`]. The
//! six built-in stages share one fallback ladder ([`LadderStage`]) and differ
//! only in their [`Lookup`] plan.

mod competitor;
mod ladder;
mod pain_point;
mod proof_point;
mod role;
mod signal;
mod tooling;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use outreach_shared::{
    ClientContext, CompletionProvider, Contact, ContentFetcher, ProviderConfig, ProviderError,
    SearchProvider, StageKind, StageResult, Usage,
};

pub use competitor::CompetitorLookup;
pub use ladder::{Extraction, LadderStage, Lookup};
pub use pain_point::PainPointLookup;
pub use proof_point::ProofPointLookup;
pub use role::RoleLookup;
pub use signal::SignalLookup;
pub use tooling::ToolingLookup;

/// Everything a stage reads for one invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub contact: &'a Contact,
    pub context: &'a ClientContext,
    /// Correction hints from the previous attempt's validation report.
    pub hints: &'a [String],
    /// Completion settings resolved from the current effort tier.
    pub provider: &'a ProviderConfig,
    /// Whether search and fetch calls are allowed.
    pub live_lookup: bool,
    /// The signal stage's result; only set for stages that depend on it.
    pub signal: Option<&'a StageResult>,
}

/// Calls and failures observed while producing one result.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageTrace {
    pub searches: u32,
    pub fetches: u32,
    pub completion_calls: u32,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
    /// Recovered collaborator failures, in call order.
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
    /// Served from the result cache without running the stage.
    pub cached: bool,
}

impl StageTrace {
    /// Trace for a result served from the cache.
    pub fn from_cache() -> Self {
        Self {
            cached: true,
            ..Self::default()
        }
    }

    pub fn record_error(&mut self, call: &str, err: &ProviderError) {
        self.errors.push(format!("{call}: {err}"));
    }

    pub fn has_provider_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn usage(&self) -> Usage {
        Usage {
            completion_calls: self.completion_calls as u64,
            searches: self.searches as u64,
            fetches: self.fetches as u64,
            tokens_in: self.tokens_in,
            tokens_out: self.tokens_out,
            cost_usd: self.cost_usd,
        }
    }
}

/// A stage's result plus the trace of how it was obtained.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub result: StageResult,
    pub trace: StageTrace,
}

/// Common contract of the six generation stages.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Produce a result. Never fails: collaborator errors degrade the
    /// result down the fallback ladder instead.
    async fn produce(&self, input: &StageInput<'_>) -> StageOutcome;
}

/// External collaborators available to stages.
///
/// Search and fetch are optional: without them the ladder starts at
/// inference.
#[derive(Clone)]
pub struct Toolkit {
    pub completion: Arc<dyn CompletionProvider>,
    pub search: Option<Arc<dyn SearchProvider>>,
    pub fetcher: Option<Arc<dyn ContentFetcher>>,
}

/// One stage per slot.
#[derive(Clone)]
pub struct StageSet {
    pub role: Arc<dyn Stage>,
    pub competitor: Arc<dyn Stage>,
    pub pain_point: Arc<dyn Stage>,
    pub signal: Arc<dyn Stage>,
    pub tooling: Arc<dyn Stage>,
    pub proof_point: Arc<dyn Stage>,
}

impl StageSet {
    /// The six built-in ladder stages over one toolkit.
    pub fn standard(tools: &Toolkit) -> Self {
        Self {
            role: Arc::new(LadderStage::new(RoleLookup, tools.clone())),
            competitor: Arc::new(LadderStage::new(CompetitorLookup, tools.clone())),
            pain_point: Arc::new(LadderStage::new(PainPointLookup, tools.clone())),
            signal: Arc::new(LadderStage::new(SignalLookup, tools.clone())),
            tooling: Arc::new(LadderStage::new(ToolingLookup, tools.clone())),
            proof_point: Arc::new(LadderStage::new(ProofPointLookup, tools.clone())),
        }
    }
}
