//! Quality validator.
//!
//! Scores a draft 0-100 against a fixed rubric:
//!
//! | Criterion | Weight |
//! |-----------|--------|
//! | capitalization after placeholders | 20 |
//! | punctuation | 15 |
//! | target-language purity | 25 |
//! | logical correctness | 25 |
//! | factual grounding | 15 |
//!
//! Each violation deducts points from its criterion (never below zero) and
//! yields exactly one suggestion.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use outreach_shared::{
    ClientContext, CompletionProvider, Contact, Criterion, CriterionScore, Draft, Issue, Prompt,
    ProviderConfig, Source, Usage, ValidationConfig, ValidationReport,
};

use crate::assembler::{ProperNouns, keeps_capital};

/// Everything the validator reads for one draft.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub draft: &'a Draft,
    pub contact: &'a Contact,
    pub context: &'a ClientContext,
    /// Raw template text; its figures count as grounded.
    pub template_text: &'a str,
    pub quality_gate: u8,
    /// Completion settings for an optional judge call.
    pub provider: &'a ProviderConfig,
}

/// A report plus the cost of producing it.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub report: ValidationReport,
    pub usage: Usage,
}

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, input: &ValidationInput<'_>) -> ValidationOutcome;
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

struct Finding {
    issue: Issue,
    suggestion: String,
}

#[derive(Default)]
struct Findings(Vec<Finding>);

impl Findings {
    fn push(
        &mut self,
        criterion: Criterion,
        penalty: u8,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.0.push(Finding {
            issue: Issue {
                criterion,
                message: message.into(),
                penalty,
            },
            suggestion: suggestion.into(),
        });
    }

    fn into_report(self, quality_gate: u8) -> ValidationReport {
        let mut deducted: HashMap<Criterion, u32> = HashMap::new();
        for f in &self.0 {
            *deducted.entry(f.issue.criterion).or_default() += f.issue.penalty as u32;
        }

        let breakdown: Vec<CriterionScore> = Criterion::ALL
            .iter()
            .map(|&criterion| {
                let weight = criterion.weight();
                let lost = deducted.get(&criterion).copied().unwrap_or(0).min(weight as u32) as u8;
                CriterionScore {
                    criterion,
                    weight,
                    awarded: weight - lost,
                }
            })
            .collect();
        let score = breakdown.iter().map(|c| c.awarded as u32).sum::<u32>().min(100) as u8;

        // Rubric order, then discovery order within a criterion.
        let mut findings = self.0;
        findings.sort_by_key(|f| {
            Criterion::ALL
                .iter()
                .position(|c| *c == f.issue.criterion)
                .unwrap_or(usize::MAX)
        });
        let (issues, suggestions): (Vec<Issue>, Vec<String>) = findings
            .into_iter()
            .map(|f| (f.issue, f.suggestion))
            .unzip();

        ValidationReport {
            score,
            passed: score >= quality_gate,
            breakdown,
            issues,
            suggestions,
        }
    }
}

// ---------------------------------------------------------------------------
// Rubric validator
// ---------------------------------------------------------------------------

/// Deterministic rubric checks with an optional completion-provider judge.
pub struct RubricValidator {
    config: ValidationConfig,
    proper_nouns: ProperNouns,
    judge: Option<Arc<dyn CompletionProvider>>,
}

impl RubricValidator {
    pub fn new(config: ValidationConfig) -> Self {
        let proper_nouns = ProperNouns::new(config.proper_nouns.clone());
        Self {
            config,
            proper_nouns,
            judge: None,
        }
    }

    /// Ask `judge` for a logical-correctness verdict on every draft.
    pub fn with_judge(mut self, judge: Arc<dyn CompletionProvider>) -> Self {
        self.judge = Some(judge);
        self
    }

    fn check_capitalization(&self, input: &ValidationInput<'_>, nouns: &ProperNouns, out: &mut Findings) {
        let text = &input.draft.text;

        for result in input.draft.stages.iter() {
            let value = result.value();
            if value.is_empty() || ends_sentence(value) {
                continue;
            }
            for (start, _) in text.match_indices(value) {
                let rest = &text[start + value.len()..];
                let after = rest.trim_start_matches([' ', '\t', ',', ';', ':']);
                if after.len() == rest.len() && !rest.is_empty() {
                    // Value runs straight into more text; not a word boundary.
                    continue;
                }
                let word = leading_word(after);
                if starts_upper(after) && !keeps_capital(after, nouns) {
                    out.push(
                        Criterion::Capitalization,
                        10,
                        format!("'{word}' is capitalized after the {} value", result.stage()),
                        format!("Lower-case '{word}' after the {} value", result.stage()),
                    );
                }
            }
        }

        static SENTENCE_START_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"(?:^|[.!?…]\s+|\n\s*)(\p{Ll}\w*)").expect("valid regex"));
        for caps in SENTENCE_START_RE.captures_iter(text) {
            let word = &caps[1];
            out.push(
                Criterion::Capitalization,
                5,
                format!("sentence starts with lower-case '{word}'"),
                format!("Capitalize '{word}' at the start of the sentence"),
            );
        }
    }

    fn check_punctuation(&self, text: &str, language: &str, out: &mut Findings) {
        static RUN_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"[.!?…]{2,}").expect("valid regex"));
        static SPACE_BEFORE_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\w[ \t]+[,.;:!?]").expect("valid regex"));
        static DOUBLE_SPACE_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\S  +\S").expect("valid regex"));

        for m in RUN_RE.find_iter(text) {
            out.push(
                Criterion::Punctuation,
                5,
                format!("repeated punctuation '{}'", m.as_str()),
                "Use a single terminal punctuation mark",
            );
        }
        // French typography puts a space before two-part marks.
        let french = language.trim().to_lowercase().starts_with("fr");
        for m in SPACE_BEFORE_RE.find_iter(text) {
            if french && m.as_str().ends_with([';', ':', '!', '?']) {
                continue;
            }
            out.push(
                Criterion::Punctuation,
                3,
                format!("space before punctuation in '{}'", m.as_str()),
                "Remove the space before the punctuation mark",
            );
        }
        if DOUBLE_SPACE_RE.is_match(text) {
            out.push(
                Criterion::Punctuation,
                2,
                "double spaces between words",
                "Use single spaces between words",
            );
        }
        let opens = text.matches('(').count();
        let closes = text.matches(')').count();
        if opens != closes {
            out.push(
                Criterion::Punctuation,
                5,
                "unbalanced parentheses",
                "Close every opened parenthesis",
            );
        }
        if text.matches('"').count() % 2 == 1 {
            out.push(
                Criterion::Punctuation,
                5,
                "unbalanced quotation marks",
                "Close every opened quotation mark",
            );
        }
    }

    fn check_language(&self, text: &str, out: &mut Findings) {
        let lowered = text.to_lowercase();
        for token in &self.config.banned_tokens {
            let token = token.trim().to_lowercase();
            if token.is_empty() {
                continue;
            }
            let count = count_whole(&lowered, &token);
            if count == 0 {
                continue;
            }
            let penalty = (count as u32 * self.config.banned_token_penalty as u32).min(u8::MAX as u32) as u8;
            out.push(
                Criterion::LanguagePurity,
                penalty,
                format!("'{token}' appears {count} time(s)"),
                format!("Replace '{token}' with a plain word in the target language"),
            );
        }
    }

    fn check_logic(&self, input: &ValidationInput<'_>, out: &mut Findings) {
        let words = words_lower(&input.draft.text);
        let count_of = |list: &[String]| {
            words
                .iter()
                .filter(|w| list.iter().any(|p| p.eq_ignore_ascii_case(w)))
                .count()
        };
        let sender = count_of(&self.config.sender_pronouns);
        let prospect = count_of(&self.config.prospect_pronouns);
        if sender > prospect {
            out.push(
                Criterion::LogicalCorrectness,
                10,
                format!("draft is sender-centric ({sender} sender vs {prospect} prospect references)"),
                "Reframe sentences around the prospect's situation instead of the sender",
            );
        }

        let competitor = &input.draft.stages.competitor;
        if competitor.source() != Source::Generic {
            let name = competitor.value();
            if input.context.excludes_competitor(name)
                || name.eq_ignore_ascii_case(input.contact.company.trim())
            {
                out.push(
                    Criterion::LogicalCorrectness,
                    15,
                    format!("'{name}' is not a valid competitor"),
                    "Name a company the prospect actually competes with, never the sender or an excluded partner",
                );
            }
        }

        let pain = input.draft.stages.pain_point.value().to_lowercase();
        if pain.contains(&input.context.company_name.to_lowercase()) {
            out.push(
                Criterion::LogicalCorrectness,
                10,
                "pain point describes the sender, not the prospect",
                "State a problem the prospect has, without mentioning the sender",
            );
        }
    }

    async fn check_with_judge(
        &self,
        input: &ValidationInput<'_>,
        out: &mut Findings,
        usage: &mut Usage,
    ) {
        let Some(judge) = &self.judge else {
            return;
        };
        let prompt = Prompt {
            system: "You review B2B outreach emails for logical coherence. Reply with a JSON \
                     object {\"coherent\": true|false, \"issue\": \"...\"}. Flag only \
                     contradictions, non-sequiturs or claims that do not fit the recipient."
                .into(),
            user: format!(
                "Recipient company: {}\nSender company: {}\n\nEmail:\n{}",
                input.contact.company, input.context.company_name, input.draft.text
            ),
        };

        usage.completion_calls += 1;
        match judge.complete(&prompt, input.provider).await {
            Ok(completion) => {
                usage.tokens_in += completion.tokens_in;
                usage.tokens_out += completion.tokens_out;
                usage.cost_usd += input
                    .provider
                    .cost(completion.tokens_in, completion.tokens_out);
                match parse_verdict(&completion.text) {
                    Some(Verdict {
                        coherent: false,
                        issue,
                    }) => {
                        let issue = issue.unwrap_or_else(|| "judged incoherent".into());
                        out.push(
                            Criterion::LogicalCorrectness,
                            10,
                            format!("judge: {issue}"),
                            format!("Fix the logic: {issue}"),
                        );
                    }
                    Some(_) => {}
                    None => debug!("judge answer not parseable, ignoring"),
                }
            }
            Err(e) => warn!(error = %e, "judge call failed, skipping"),
        }
    }

    fn check_grounding(&self, input: &ValidationInput<'_>, out: &mut Findings) {
        let mut known = String::new();
        known.push_str(input.template_text);
        known.push('\n');
        known.push_str(&context_corpus(input.context, input.contact));
        for result in input.draft.stages.iter() {
            if let Some(evidence) = result.evidence() {
                known.push('\n');
                known.push_str(&evidence.quote);
            }
            if result.source() == Source::Inference {
                // Inferred values are derived from the context.
                known.push('\n');
                known.push_str(result.value());
            }
        }

        static FIGURE_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)*").expect("valid regex"));
        // Whole figures only: "4" is not grounded by a known "40%".
        let grounded: HashSet<&str> = FIGURE_RE.find_iter(&known).map(|m| m.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        for m in FIGURE_RE.find_iter(&input.draft.text) {
            let figure = m.as_str();
            if !seen.insert(figure) {
                continue;
            }
            if !grounded.contains(figure) {
                out.push(
                    Criterion::FactualGrounding,
                    5,
                    format!("figure '{figure}' is not supported by any evidence"),
                    format!("Remove '{figure}' or replace it with an observed fact"),
                );
            }
        }

        for result in input.draft.stages.iter() {
            match result.source() {
                Source::Generic if result.value().chars().any(|c| c.is_ascii_digit()) => {
                    out.push(
                        Criterion::FactualGrounding,
                        5,
                        format!("generic {} value contains specifics", result.stage()),
                        format!("Keep the {} statement hedged and non-specific", result.stage()),
                    );
                }
                Source::WebSearch | Source::SiteContent if result.evidence().is_none() => {
                    out.push(
                        Criterion::FactualGrounding,
                        5,
                        format!("{} value has no supporting quote", result.stage()),
                        format!("Attribute the {} value to observed text", result.stage()),
                    );
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl Validator for RubricValidator {
    #[instrument(skip_all, fields(attempt = input.draft.attempt))]
    async fn validate(&self, input: &ValidationInput<'_>) -> ValidationOutcome {
        let nouns = self.proper_nouns.with_run(input.contact, input.context);
        let mut findings = Findings::default();
        let mut usage = Usage::default();

        self.check_capitalization(input, &nouns, &mut findings);
        self.check_punctuation(&input.draft.text, &input.context.language, &mut findings);
        self.check_language(&input.draft.text, &mut findings);
        self.check_logic(input, &mut findings);
        if self.config.llm_judge {
            self.check_with_judge(input, &mut findings, &mut usage).await;
        }
        self.check_grounding(input, &mut findings);

        let report = findings.into_report(input.quality_gate);
        debug!(score = report.score, passed = report.passed, issues = report.issues.len(), "draft validated");
        ValidationOutcome { report, usage }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Verdict {
    coherent: bool,
    #[serde(default)]
    issue: Option<String>,
}

fn parse_verdict(text: &str) -> Option<Verdict> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn context_corpus(context: &ClientContext, contact: &Contact) -> String {
    let mut parts: Vec<&str> = vec![
        context.company_name.as_str(),
        context.sender_name.as_str(),
        context.value_proposition.as_str(),
        context.domain.as_str(),
        contact.company.as_str(),
        contact.industry.as_str(),
    ];
    for study in &context.case_studies {
        parts.push(study.customer.as_str());
        parts.push(study.outcome.as_str());
    }
    parts.extend(context.pain_themes.iter().map(String::as_str));
    parts.extend(context.target_roles.iter().map(String::as_str));
    parts.join("\n")
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(['.', '!', '?', '…'])
}

fn starts_upper(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_uppercase)
}

fn leading_word(text: &str) -> &str {
    text.split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default()
}

fn words_lower(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whole-word occurrences of `needle` in already lower-cased `haystack`.
fn count_whole(haystack: &str, needle: &str) -> usize {
    haystack
        .match_indices(needle)
        .filter(|(i, _)| {
            let before = haystack[..*i].chars().next_back();
            let after = haystack[i + needle.len()..].chars().next();
            before.is_none_or(|c| !c.is_alphanumeric()) && after.is_none_or(|c| !c.is_alphanumeric())
        })
        .count()
}
