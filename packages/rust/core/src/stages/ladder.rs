//! The fallback ladder shared by all built-in stages.
//!
//! 1. Search for the company; ask the completion provider to extract a fact
//!    from the ranked snippets (level 0).
//! 2. Otherwise fetch one page of the company's site and extract from its
//!    text (level 1).
//! 3. Otherwise derive a value from the client context (level 2).
//! 4. Otherwise return a hedged generic phrase (level 3).
//!
//! An extracted value is only accepted when its supporting quote occurs in
//! the gathered evidence, so nothing reaches a draft that was not observed.

use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use outreach_shared::{
    Confidence, Evidence, Prompt, SearchHit, Source, StageKind, StageResult,
};

use super::{Stage, StageInput, StageOutcome, StageTrace, Toolkit};

/// Search hits included in the extraction prompt.
const MAX_HITS: usize = 5;

/// Page text included in the extraction prompt.
const MAX_PAGE_CHARS: usize = 6_000;

/// Longest value accepted from the completion provider.
const MAX_VALUE_CHARS: usize = 200;

/// Shortest quote that counts as attribution.
const MIN_QUOTE_CHARS: usize = 4;

/// What a stage looks for and how it degrades.
pub trait Lookup: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Web search query, or `None` to skip the search rung.
    fn search_query(&self, input: &StageInput<'_>) -> Option<String>;

    /// Path on the company's site to fetch, or `None` to skip the site rung.
    fn site_path(&self) -> Option<&'static str> {
        None
    }

    /// Extraction instruction for the completion provider.
    fn task(&self, input: &StageInput<'_>) -> String;

    /// Stage-specific filter applied to a grounded extraction.
    fn accept(&self, _extraction: &Extraction, _input: &StageInput<'_>) -> bool {
        true
    }

    /// Value derived from the client context and industry.
    fn infer(&self, input: &StageInput<'_>) -> Option<String>;

    /// Hedged phrase that names nothing specific.
    fn generic(&self, input: &StageInput<'_>) -> String;
}

/// JSON answer expected from the completion provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Extraction {
    pub value: String,
    pub quote: String,
    /// Tool category, for stages that ask for one.
    #[serde(default)]
    pub category: Option<String>,
}

/// A [`Stage`] running the fallback ladder for one [`Lookup`].
pub struct LadderStage<L> {
    lookup: L,
    tools: Toolkit,
}

impl<L: Lookup> LadderStage<L> {
    pub fn new(lookup: L, tools: Toolkit) -> Self {
        Self { lookup, tools }
    }

    async fn live(&self, input: &StageInput<'_>, trace: &mut StageTrace) -> Option<StageResult> {
        if !input.live_lookup {
            return None;
        }
        if let Some(result) = self.from_search(input, trace).await {
            return Some(result);
        }
        self.from_site(input, trace).await
    }

    async fn from_search(
        &self,
        input: &StageInput<'_>,
        trace: &mut StageTrace,
    ) -> Option<StageResult> {
        let search = self.tools.search.as_ref()?;
        let query = self.lookup.search_query(input)?;

        trace.searches += 1;
        let hits = match search.search(&query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(stage = %self.lookup.kind(), error = %e, "search failed");
                trace.record_error("search", &e);
                return None;
            }
        };
        if hits.is_empty() {
            debug!(stage = %self.lookup.kind(), %query, "no search hits");
            return None;
        }

        let gathered = Gathered::from_hits(&hits);
        self.extract(input, &gathered, Source::WebSearch, trace).await
    }

    async fn from_site(
        &self,
        input: &StageInput<'_>,
        trace: &mut StageTrace,
    ) -> Option<StageResult> {
        let fetcher = self.tools.fetcher.as_ref()?;
        let url = site_url(input.contact.website.as_ref()?, self.lookup.site_path()?)?;

        trace.fetches += 1;
        let page = match fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(e) => {
                warn!(stage = %self.lookup.kind(), %url, error = %e, "site fetch failed");
                trace.record_error("fetch", &e);
                return None;
            }
        };
        if page.text.trim().is_empty() {
            return None;
        }

        let gathered = Gathered {
            text: truncate_content(&page.text, MAX_PAGE_CHARS),
            sources: vec![(page.url.to_string(), page.text)],
        };
        self.extract(input, &gathered, Source::SiteContent, trace).await
    }

    async fn extract(
        &self,
        input: &StageInput<'_>,
        gathered: &Gathered,
        source: Source,
        trace: &mut StageTrace,
    ) -> Option<StageResult> {
        let prompt = extraction_prompt(&self.lookup.task(input), input, &gathered.text);

        trace.completion_calls += 1;
        let completion = match self.tools.completion.complete(&prompt, input.provider).await {
            Ok(c) => c,
            Err(e) => {
                warn!(stage = %self.lookup.kind(), error = %e, "extraction call failed");
                trace.record_error("completion", &e);
                return None;
            }
        };
        trace.tokens_in += completion.tokens_in;
        trace.tokens_out += completion.tokens_out;
        trace.cost_usd += input
            .provider
            .cost(completion.tokens_in, completion.tokens_out);

        let extraction = parse_extraction(&completion.text)?;
        let value = clean_value(&extraction.value)?;

        if !contains_normalized(&gathered.text, &extraction.quote) {
            debug!(stage = %self.lookup.kind(), quote = %extraction.quote, "quote not found in evidence");
            return None;
        }
        if !self.lookup.accept(&extraction, input) {
            debug!(stage = %self.lookup.kind(), %value, "extraction rejected by stage filter");
            return None;
        }

        let url = gathered
            .sources
            .iter()
            .find(|(_, text)| contains_normalized(text, &extraction.quote))
            .map(|(url, _)| url.clone());
        let confidence = if source == Source::WebSearch
            && contains_normalized(&extraction.quote, &value)
        {
            Confidence::VeryHigh
        } else {
            Confidence::High
        };

        Some(
            StageResult::new(self.lookup.kind(), value, source, confidence).with_evidence(
                Evidence {
                    quote: extraction.quote.trim().to_string(),
                    url,
                },
            ),
        )
    }

    fn offline(&self, input: &StageInput<'_>) -> StageResult {
        let kind = self.lookup.kind();
        match self.lookup.infer(input).as_deref().and_then(clean_value) {
            Some(value) => StageResult::inferred(kind, value),
            None => StageResult::generic(kind, self.lookup.generic(input)),
        }
    }
}

#[async_trait]
impl<L: Lookup> Stage for LadderStage<L> {
    fn kind(&self) -> StageKind {
        self.lookup.kind()
    }

    #[instrument(skip_all, fields(stage = %self.lookup.kind(), company = %input.contact.company))]
    async fn produce(&self, input: &StageInput<'_>) -> StageOutcome {
        let start = Instant::now();
        let mut trace = StageTrace::default();

        let result = match self.live(input, &mut trace).await {
            Some(result) => result,
            None => self.offline(input),
        };

        trace.elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(
            level = result.fallback_level(),
            confidence = u8::from(result.confidence()),
            searches = trace.searches,
            fetches = trace.fetches,
            "stage produced"
        );
        StageOutcome { result, trace }
    }
}

// ---------------------------------------------------------------------------
// Evidence
// ---------------------------------------------------------------------------

/// Evidence text shown to the provider, plus per-source text for attribution.
struct Gathered {
    text: String,
    sources: Vec<(String, String)>,
}

impl Gathered {
    fn from_hits(hits: &[SearchHit]) -> Self {
        let hits = &hits[..hits.len().min(MAX_HITS)];
        let text = hits
            .iter()
            .enumerate()
            .map(|(i, h)| format!("[{}] {}\n{}\n{}", i + 1, h.title, h.snippet, h.url))
            .collect::<Vec<_>>()
            .join("\n\n");
        let sources = hits
            .iter()
            .map(|h| (h.url.clone(), format!("{}\n{}", h.title, h.snippet)))
            .collect();
        Self { text, sources }
    }
}

fn site_url(website: &Url, path: &str) -> Option<Url> {
    website.join(path).ok()
}

fn extraction_prompt(task: &str, input: &StageInput<'_>, evidence: &str) -> Prompt {
    let ctx = input.context;
    let system = format!(
        "You research companies for a personalized B2B email sent by {sponsor} ({value}). \
         Use only the evidence provided. Reply with a single JSON object \
         {{\"value\": \"...\", \"quote\": \"...\"}} where quote is copied verbatim from the \
         evidence and supports value. Reply NONE if the evidence does not answer the task. \
         Never invent names, numbers or events. Write value in the language '{lang}' as a \
         short phrase that reads naturally in the middle of a sentence.",
        sponsor = ctx.company_name,
        value = ctx.value_proposition,
        lang = ctx.language,
    );

    let mut user = format!(
        "Company: {}\nIndustry: {}\n\nTask: {task}\n",
        input.contact.company, input.contact.industry
    );
    if let Some(signal) = input.signal {
        user.push_str(&format!("\nRecent signal: {}\n", signal.value()));
    }
    if !input.hints.is_empty() {
        user.push_str("\nA previous draft was rejected. Address this feedback:\n");
        for hint in input.hints {
            user.push_str(&format!("- {hint}\n"));
        }
    }
    user.push_str(&format!("\nEvidence:\n{evidence}"));

    Prompt { system, user }
}

/// Parse the provider's answer; `None` for `NONE` or unparseable text.
pub(crate) fn parse_extraction(text: &str) -> Option<Extraction> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.to_ascii_uppercase().starts_with("NONE") {
        return None;
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn clean_value(raw: &str) -> Option<String> {
    let value = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    if value.is_empty()
        || value.eq_ignore_ascii_case("none")
        || value.chars().count() > MAX_VALUE_CHARS
    {
        return None;
    }
    Some(value.to_string())
}

fn squash(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether `needle` occurs in `haystack`, ignoring case and whitespace runs.
pub(crate) fn contains_normalized(haystack: &str, needle: &str) -> bool {
    let needle = squash(needle);
    needle.chars().count() >= MIN_QUOTE_CHARS && squash(haystack).contains(&needle)
}

/// Truncate content to fit the provider's context window.
pub(crate) fn truncate_content(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        None => content.to_string(),
        Some((cut, _)) => format!("{}\n\n[... content truncated ...]", &content[..cut]),
    }
}
