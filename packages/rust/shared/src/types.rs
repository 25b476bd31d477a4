//! Core domain types for outreach drafting runs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a sponsoring business in the context store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ClientContext
// ---------------------------------------------------------------------------

/// A published outcome the sponsor can cite as social proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseStudy {
    /// Customer the outcome was achieved for.
    pub customer: String,
    /// Customer's industry.
    pub industry: String,
    /// Outcome statement, e.g. "cut onboarding time by 40%".
    pub outcome: String,
    /// Where the case study is published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The sponsoring business's profile. Immutable for the duration of a run.
///
/// Every stage reads the same typed fields from this value; stage behavior is
/// never keyed on the sponsor's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContext {
    pub client_id: ClientId,
    /// Sponsor's company name.
    pub company_name: String,
    /// Person signing the email.
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<Url>,
    /// What the sponsor sells and why it matters.
    pub value_proposition: String,
    /// Business area the sponsor serves (e.g. "sales operations").
    pub domain: String,
    /// Target language of the drafts (ISO 639-1).
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub target_industries: Vec<String>,
    /// Personas the outreach is addressed to, most preferred first.
    #[serde(default)]
    pub target_roles: Vec<String>,
    /// Problems the offering solves, most important first.
    #[serde(default)]
    pub pain_themes: Vec<String>,
    /// Tool categories relevant to the offering (relevance filter).
    #[serde(default)]
    pub tool_categories: Vec<String>,
    /// Companies that must never be named as a competitor.
    #[serde(default)]
    pub competitor_exclusions: Vec<String>,
    #[serde(default)]
    pub case_studies: Vec<CaseStudy>,
    /// Template used when a run does not name one.
    #[serde(default = "default_template_name")]
    pub default_template: String,
}

fn default_language() -> String {
    "en".into()
}

fn default_template_name() -> String {
    "intro".into()
}

impl ClientContext {
    /// Whether `name` must not be used as a competitor (the sponsor itself
    /// always counts as excluded).
    pub fn excludes_competitor(&self, name: &str) -> bool {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        needle == self.company_name.to_lowercase()
            || self
                .competitor_exclusions
                .iter()
                .any(|e| e.to_lowercase() == needle)
    }

    /// Whether the sponsor declares `industry` as a target.
    pub fn serves_industry(&self, industry: &str) -> bool {
        let industry = industry.to_lowercase();
        self.target_industries
            .iter()
            .any(|t| t.to_lowercase() == industry)
    }

    /// The case study closest to `industry`, falling back to the first one.
    pub fn case_study_for(&self, industry: &str) -> Option<&CaseStudy> {
        let industry = industry.to_lowercase();
        self.case_studies
            .iter()
            .find(|c| c.industry.to_lowercase() == industry)
            .or_else(|| self.case_studies.first())
    }

    /// The configured tool category named by `label`, if any.
    pub fn tool_category(&self, label: &str) -> Option<&str> {
        let label = label.trim().to_lowercase();
        self.tool_categories
            .iter()
            .find(|c| c.to_lowercase() == label)
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// The prospect being addressed. Immutable input to a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<Url>,
    pub industry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// The six generation stages. Each produces one semantic field of a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Role,
    Competitor,
    PainPoint,
    Signal,
    Tooling,
    ProofPoint,
}

impl StageKind {
    /// All stages in assembly order.
    pub const ALL: [StageKind; 6] = [
        Self::Role,
        Self::Competitor,
        Self::PainPoint,
        Self::Signal,
        Self::Tooling,
        Self::ProofPoint,
    ];

    /// Stable name, also used as the template placeholder.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Competitor => "competitor",
            Self::PainPoint => "pain_point",
            Self::Signal => "signal",
            Self::Tooling => "tooling",
            Self::ProofPoint => "proof_point",
        }
    }

    /// Parse a placeholder name.
    pub fn from_placeholder(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stage result came from, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    WebSearch,
    SiteContent,
    Inference,
    Generic,
}

impl Source {
    /// Ordinal of the fallback ladder tier (0 best, 3 weakest).
    pub fn fallback_level(&self) -> u8 {
        match self {
            Self::WebSearch => 0,
            Self::SiteContent => 1,
            Self::Inference => 2,
            Self::Generic => 3,
        }
    }

    /// Inclusive confidence band for results from this source.
    ///
    /// Bands never overlap upwards, so confidence cannot increase with the
    /// fallback level.
    pub fn confidence_band(&self) -> (Confidence, Confidence) {
        match self {
            Self::WebSearch => (Confidence::High, Confidence::VeryHigh),
            Self::SiteContent => (Confidence::High, Confidence::High),
            Self::Inference => (Confidence::Medium, Confidence::Medium),
            Self::Generic => (Confidence::VeryLow, Confidence::VeryLow),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSearch => "web-search",
            Self::SiteContent => "site-content",
            Self::Inference => "inference",
            Self::Generic => "generic",
        }
    }
}

/// Reliability rating of a stage result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
#[repr(u8)]
pub enum Confidence {
    VeryLow = 1,
    Low = 2,
    Medium = 3,
    High = 4,
    VeryHigh = 5,
}

impl From<Confidence> for u8 {
    fn from(c: Confidence) -> u8 {
        c as u8
    }
}

impl TryFrom<u8> for Confidence {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(Self::VeryLow),
            2 => Ok(Self::Low),
            3 => Ok(Self::Medium),
            4 => Ok(Self::High),
            5 => Ok(Self::VeryHigh),
            other => Err(format!("confidence must be 1-5, got {other}")),
        }
    }
}

/// The observed text a live-lookup result is attributed to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    /// Verbatim excerpt from the search snippet or page text.
    pub quote: String,
    /// URL of the snippet or page, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Output of one stage invocation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    stage: StageKind,
    value: String,
    confidence: Confidence,
    fallback_level: u8,
    source: Source,
    #[serde(skip_serializing_if = "Option::is_none")]
    evidence: Option<Evidence>,
    created_at: DateTime<Utc>,
}

impl StageResult {
    /// Create a result; `confidence` is clamped into the source's band.
    pub fn new(stage: StageKind, value: impl Into<String>, source: Source, confidence: Confidence) -> Self {
        let (low, high) = source.confidence_band();
        Self {
            stage,
            value: value.into(),
            confidence: confidence.clamp(low, high),
            fallback_level: source.fallback_level(),
            source,
            evidence: None,
            created_at: Utc::now(),
        }
    }

    /// Level 2 result derived from the client context.
    pub fn inferred(stage: StageKind, value: impl Into<String>) -> Self {
        Self::new(stage, value, Source::Inference, Confidence::Medium)
    }

    /// Level 3 hedged result.
    pub fn generic(stage: StageKind, value: impl Into<String>) -> Self {
        Self::new(stage, value, Source::Generic, Confidence::VeryLow)
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn stage(&self) -> StageKind {
        self.stage
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    pub fn fallback_level(&self) -> u8 {
        self.fallback_level
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn evidence(&self) -> Option<&Evidence> {
        self.evidence.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Exactly one result per stage slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutputs {
    pub role: StageResult,
    pub competitor: StageResult,
    pub pain_point: StageResult,
    pub signal: StageResult,
    pub tooling: StageResult,
    pub proof_point: StageResult,
}

impl StageOutputs {
    /// Build from a map; `None` unless every slot is present.
    pub fn from_map(mut map: HashMap<StageKind, StageResult>) -> Option<Self> {
        Some(Self {
            role: map.remove(&StageKind::Role)?,
            competitor: map.remove(&StageKind::Competitor)?,
            pain_point: map.remove(&StageKind::PainPoint)?,
            signal: map.remove(&StageKind::Signal)?,
            tooling: map.remove(&StageKind::Tooling)?,
            proof_point: map.remove(&StageKind::ProofPoint)?,
        })
    }

    pub fn get(&self, kind: StageKind) -> &StageResult {
        match kind {
            StageKind::Role => &self.role,
            StageKind::Competitor => &self.competitor,
            StageKind::PainPoint => &self.pain_point,
            StageKind::Signal => &self.signal,
            StageKind::Tooling => &self.tooling,
            StageKind::ProofPoint => &self.proof_point,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageResult> {
        StageKind::ALL.into_iter().map(|k| self.get(k))
    }
}

// ---------------------------------------------------------------------------
// Effort tiers
// ---------------------------------------------------------------------------

/// Named level of generation capability/cost, escalated across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffortTier {
    Standard,
    Enhanced,
    Maximum,
}

impl EffortTier {
    /// The next tier up; `Maximum` stays put.
    pub fn escalate(self) -> Self {
        match self {
            Self::Standard => Self::Enhanced,
            Self::Enhanced | Self::Maximum => Self::Maximum,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Enhanced => "enhanced",
            Self::Maximum => "maximum",
        }
    }
}

impl std::fmt::Display for EffortTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved completion settings handed to stages and the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider model identifier.
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// USD per million input tokens.
    #[serde(default)]
    pub input_cost_per_mtok: f64,
    /// USD per million output tokens.
    #[serde(default)]
    pub output_cost_per_mtok: f64,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    512
}

impl ProviderConfig {
    /// USD cost of a call with the given token counts.
    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        (tokens_in as f64 * self.input_cost_per_mtok + tokens_out as f64 * self.output_cost_per_mtok)
            / 1_000_000.0
    }
}

// ---------------------------------------------------------------------------
// Templates & drafts
// ---------------------------------------------------------------------------

/// A text template with `{{placeholder}}` markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub text: String,
    /// Placeholder names declared by the template source.
    pub placeholders: Vec<String>,
}

/// An assembled email and the stage results that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Draft {
    /// 1-based attempt number within the run.
    pub attempt: u32,
    pub effort_tier: EffortTier,
    pub template_name: String,
    pub text: String,
    /// SHA-256 of `text`, hex-encoded.
    pub content_hash: String,
    pub stages: StageOutputs,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Rubric criteria with fixed weights summing to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Capitalization,
    Punctuation,
    LanguagePurity,
    LogicalCorrectness,
    FactualGrounding,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Self::Capitalization,
        Self::Punctuation,
        Self::LanguagePurity,
        Self::LogicalCorrectness,
        Self::FactualGrounding,
    ];

    pub fn weight(&self) -> u8 {
        match self {
            Self::Capitalization => 20,
            Self::Punctuation => 15,
            Self::LanguagePurity => 25,
            Self::LogicalCorrectness => 25,
            Self::FactualGrounding => 15,
        }
    }
}

/// One rubric violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub criterion: Criterion,
    pub message: String,
    /// Points deducted before the per-criterion cap is applied.
    pub penalty: u8,
}

/// Points awarded for one criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: Criterion,
    pub weight: u8,
    pub awarded: u8,
}

/// Score and feedback for one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// 0-100.
    pub score: u8,
    pub passed: bool,
    #[serde(default)]
    pub breakdown: Vec<CriterionScore>,
    /// One entry per violation, in rubric order.
    pub issues: Vec<Issue>,
    /// One corrective instruction per issue.
    pub suggestions: Vec<String>,
}

impl ValidationReport {
    /// Free-text hints for the next generation attempt.
    pub fn correction_hints(&self) -> Vec<String> {
        self.issues
            .iter()
            .zip(self.suggestions.iter())
            .map(|(issue, suggestion)| format!("{} -> {}", issue.message, suggestion))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Run record
// ---------------------------------------------------------------------------

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Passed the gate, or the last allowed attempt was the best one.
    Done,
    /// Budget spent; an earlier attempt was kept.
    Exhausted,
    /// Cancelled by the caller or the run timeout.
    Cancelled,
}

/// One generate-and-validate cycle.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub draft: Draft,
    pub report: ValidationReport,
    pub elapsed_ms: u64,
}

/// External call accounting for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub completion_calls: u64,
    pub searches: u64,
    pub fetches: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cost_usd: f64,
}

impl std::ops::AddAssign<&Usage> for Usage {
    fn add_assign(&mut self, rhs: &Usage) {
        self.completion_calls += rhs.completion_calls;
        self.searches += rhs.searches;
        self.fetches += rhs.fetches;
        self.tokens_in += rhs.tokens_in;
        self.tokens_out += rhs.tokens_out;
        self.cost_usd += rhs.cost_usd;
    }
}

/// Audit trail and result of one orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub client_id: ClientId,
    pub contact: Contact,
    /// Attempts in order; `attempts[i].draft.attempt == i + 1`.
    pub attempts: Vec<AttemptRecord>,
    /// Attempt number of the chosen draft, if any attempt completed.
    pub chosen_attempt: Option<u32>,
    /// Whether the chosen draft met the quality gate.
    pub passed: bool,
    pub state: RunState,
    pub usage: Usage,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl RunRecord {
    fn chosen(&self) -> Option<&AttemptRecord> {
        let n = self.chosen_attempt?;
        self.attempts.get(n.checked_sub(1)? as usize)
    }

    /// The draft to send (or hold back if `passed` is false).
    pub fn final_draft(&self) -> Option<&Draft> {
        self.chosen().map(|a| &a.draft)
    }

    pub fn final_report(&self) -> Option<&ValidationReport> {
        self.chosen().map(|a| &a.report)
    }
}
