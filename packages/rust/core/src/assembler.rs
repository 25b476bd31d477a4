//! Template assembler.
//!
//! Parses `{{placeholder}}` templates, substitutes stage results and contact
//! variables, and normalizes the result. Normalization runs in a fixed order:
//!
//! 1. Collapse runs of terminal punctuation (`.`, `!`, `?`, `…`) to the first mark.
//! 2. Lower-case the first letter after a placeholder, unless it opens a new
//!    sentence or is a proper noun or acronym.
//! 3. Trim surrounding whitespace.

use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use outreach_shared::{
    ClientContext, Contact, Draft, EffortTier, OutreachError, Result, StageKind, StageOutputs,
    Template,
};

const TERMINAL_MARKS: [char; 4] = ['.', '!', '?', '…'];

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Contact and context values a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    RecipientName,
    Company,
    SenderName,
    SenderCompany,
}

impl Variable {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "recipient_name" => Some(Self::RecipientName),
            "company" => Some(Self::Company),
            "sender_name" => Some(Self::SenderName),
            "sender_company" => Some(Self::SenderCompany),
            _ => None,
        }
    }

    fn resolve(&self, contact: &Contact, context: &ClientContext) -> String {
        match self {
            Self::RecipientName => contact
                .recipient_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "there".into()),
            Self::Company => contact.company.clone(),
            Self::SenderName => context.sender_name.clone(),
            Self::SenderCompany => context.company_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Stage(StageKind),
    Var(Variable),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

/// A template validated for assembly.
#[derive(Debug, Clone)]
pub struct ParsedTemplate {
    name: String,
    segments: Vec<Segment>,
}

impl ParsedTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Parse and validate a template.
///
/// Fails with `MalformedTemplate` on unterminated or unknown placeholders,
/// on a declared placeholder list that disagrees with the text, and when any
/// stage placeholder is missing.
pub fn parse_template(template: &Template) -> Result<ParsedTemplate> {
    let malformed = |reason: String| OutreachError::malformed_template(&template.name, reason);

    let mut segments = Vec::new();
    let mut found: Vec<String> = Vec::new();
    let mut rest = template.text.as_str();

    while let Some(open) = rest.find("{{") {
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_string()));
        }
        let after = &rest[open + 2..];
        let close = after
            .find("}}")
            .ok_or_else(|| malformed("unterminated placeholder".into()))?;
        let name = after[..close].trim();
        if name.contains("{{") {
            return Err(malformed(format!("nested placeholder near {{{{{name}")));
        }

        let slot = StageKind::from_placeholder(name)
            .map(Slot::Stage)
            .or_else(|| Variable::from_name(name).map(Slot::Var))
            .ok_or_else(|| malformed(format!("unknown placeholder {{{{{name}}}}}")))?;
        segments.push(Segment::Slot(slot));
        if !found.iter().any(|f| f == name) {
            found.push(name.to_string());
        }
        rest = &after[close + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }

    for kind in StageKind::ALL {
        if !found.iter().any(|f| f == kind.as_str()) {
            return Err(malformed(format!("missing {{{{{}}}}}", kind.as_str())));
        }
    }

    if !template.placeholders.is_empty() {
        let mut declared: Vec<&str> = template.placeholders.iter().map(|p| p.trim()).collect();
        let mut actual: Vec<&str> = found.iter().map(String::as_str).collect();
        declared.sort_unstable();
        declared.dedup();
        actual.sort_unstable();
        if declared != actual {
            return Err(malformed(format!(
                "declared placeholders [{}] do not match text [{}]",
                declared.join(", "),
                actual.join(", ")
            )));
        }
    }

    Ok(ParsedTemplate {
        name: template.name.clone(),
        segments,
    })
}

// ---------------------------------------------------------------------------
// Proper nouns
// ---------------------------------------------------------------------------

/// Words and phrases that keep their capital letter after a placeholder.
#[derive(Debug, Clone, Default)]
pub struct ProperNouns(Vec<String>);

impl ProperNouns {
    pub fn new<I, S>(nouns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = nouns
            .into_iter()
            .map(Into::into)
            .filter(|n| !n.trim().is_empty())
            .collect();
        // Longest first, so "New York" wins over "New".
        list.sort_by_key(|n| std::cmp::Reverse(n.len()));
        Self(list)
    }

    /// Add the names known for one run.
    pub fn with_run(&self, contact: &Contact, context: &ClientContext) -> Self {
        let mut names = self.0.clone();
        names.push(contact.company.clone());
        names.push(context.company_name.clone());
        names.push(context.sender_name.clone());
        names.extend(contact.recipient_name.clone());
        for study in &context.case_studies {
            names.push(study.customer.clone());
        }
        Self::new(names)
    }

    /// Whether `text` starts with a known proper noun at a word boundary.
    pub(crate) fn leads(&self, text: &str) -> bool {
        self.0.iter().any(|noun| {
            text.starts_with(noun.as_str())
                && text[noun.len()..]
                    .chars()
                    .next()
                    .is_none_or(|c| !c.is_alphanumeric())
        })
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize text containing `{{placeholder}}` markers. Idempotent.
pub fn normalize(text: &str, nouns: &ProperNouns) -> String {
    let result = collapse_terminal_runs(text);
    let result = fold_case_after_placeholders(&result, nouns);
    result.trim().to_string()
}

/// Collapse runs of 2+ terminal punctuation marks to the first mark.
fn collapse_terminal_runs(text: &str) -> String {
    static RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[.!?…]{2,}").expect("valid regex"));

    RUN_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            caps[0].chars().next().map(String::from).unwrap_or_default()
        })
        .into_owned()
}

/// Lower-case the first letter following each `}}` on the same line.
fn fold_case_after_placeholders(text: &str, nouns: &ProperNouns) -> String {
    static AFTER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\}\}[ \t,;:]*").expect("valid regex"));

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in AFTER_RE.find_iter(text) {
        out.push_str(&text[last..m.end()]);
        last = m.end();
        if let Some((folded, consumed)) = fold_leading(&text[m.end()..], nouns) {
            out.push_str(&folded);
            last += consumed;
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Lower-cased first letter of `rest` and its byte length, when it should fold.
fn fold_leading(rest: &str, nouns: &ProperNouns) -> Option<(String, usize)> {
    let first = rest.chars().next()?;
    if !first.is_uppercase() || keeps_capital(rest, nouns) {
        return None;
    }
    Some((first.to_lowercase().collect(), first.len_utf8()))
}

/// Whether the leading word of `text` is written capitalized mid-sentence.
pub(crate) fn keeps_capital(text: &str, nouns: &ProperNouns) -> bool {
    nouns.leads(text) || is_acronym(text) || is_pronoun_i(text)
}

/// The first-person pronoun "I", alone or contracted ("I'm", "I'd").
fn is_pronoun_i(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next() == Some('I') && chars.next().is_none_or(|c| !c.is_alphanumeric())
}

/// The leading word has two or more letters and no lower-case letter.
fn is_acronym(text: &str) -> bool {
    let word: &str = text
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or_default();
    word.chars().filter(|c| c.is_alphabetic()).count() >= 2 && !word.chars().any(char::is_lowercase)
}

fn ends_sentence(text: &str) -> bool {
    text.trim_end().ends_with(TERMINAL_MARKS)
}

/// Whether an insertion at the end of `before` opens a sentence.
fn opens_sentence(before: &str) -> bool {
    let trimmed = before.trim_end_matches([' ', '\t']);
    trimmed.is_empty() || trimmed.ends_with('\n') || ends_sentence(trimmed)
}

fn strip_braces(value: &str) -> String {
    value.replace(['{', '}'], "").trim().to_string()
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Substitutes stage results into parsed templates.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    proper_nouns: ProperNouns,
}

impl Assembler {
    pub fn new(proper_nouns: ProperNouns) -> Self {
        Self { proper_nouns }
    }

    /// Assemble a draft. Every slot is filled; the result has no placeholders.
    #[instrument(skip_all, fields(template = %template.name, attempt = attempt))]
    pub fn assemble(
        &self,
        template: &ParsedTemplate,
        stages: StageOutputs,
        contact: &Contact,
        context: &ClientContext,
        attempt: u32,
        effort_tier: EffortTier,
    ) -> Draft {
        let nouns = self.proper_nouns.with_run(contact, context);
        let mut text = String::new();
        let mut previous_value: Option<String> = None;

        for segment in &template.segments {
            match segment {
                Segment::Slot(slot) => {
                    let raw = match slot {
                        Slot::Stage(kind) => stages.get(*kind).value().to_string(),
                        Slot::Var(var) => var.resolve(contact, context),
                    };
                    let mut value = strip_braces(&raw);
                    if opens_sentence(&text) {
                        value = capitalize_first(&value);
                    }
                    text.push_str(&value);
                    previous_value = Some(value);
                }
                Segment::Text(chunk) => {
                    // Case folding touches letters only and collapsing touches
                    // punctuation only, so folding before the collapse pass is
                    // equivalent to folding after it.
                    let fold = previous_value
                        .take()
                        .is_some_and(|v| !ends_sentence(&v));
                    let prefix_len = chunk.len() - chunk.trim_start_matches([' ', '\t', ',', ';', ':']).len();
                    match fold
                        .then(|| fold_leading(&chunk[prefix_len..], &nouns))
                        .flatten()
                    {
                        Some((folded, consumed)) => {
                            text.push_str(&chunk[..prefix_len]);
                            text.push_str(&folded);
                            text.push_str(&chunk[prefix_len + consumed..]);
                        }
                        None => text.push_str(chunk),
                    }
                }
            }
        }

        let text = collapse_terminal_runs(&text).trim().to_string();
        let content_hash = {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            format!("{:x}", hasher.finalize())
        };
        debug!(chars = text.len(), %content_hash, "assembled draft");

        Draft {
            attempt,
            effort_tier,
            template_name: template.name.clone(),
            text,
            content_hash,
            stages,
        }
    }
}
