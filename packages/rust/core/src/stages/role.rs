//! Target role: the persona at the company the email is addressed to.

use outreach_shared::StageKind;

use super::{Extraction, Lookup, StageInput};

/// Longest job title accepted, in words.
const MAX_TITLE_WORDS: usize = 8;

pub struct RoleLookup;

impl Lookup for RoleLookup {
    fn kind(&self) -> StageKind {
        StageKind::Role
    }

    fn search_query(&self, input: &StageInput<'_>) -> Option<String> {
        let persona = input
            .context
            .target_roles
            .first()
            .map(String::as_str)
            .unwrap_or("leadership team");
        Some(format!("\"{}\" {persona}", input.contact.company))
    }

    fn site_path(&self) -> Option<&'static str> {
        Some("/about")
    }

    fn task(&self, input: &StageInput<'_>) -> String {
        let mut task = format!(
            "Identify the job title of the person at {} most likely responsible for {}.",
            input.contact.company, input.context.domain
        );
        if !input.context.target_roles.is_empty() {
            task.push_str(&format!(
                " Preferred personas, best first: {}.",
                input.context.target_roles.join(", ")
            ));
        }
        task.push_str(" Answer with the job title only, never a person's name.");
        task
    }

    fn accept(&self, extraction: &Extraction, _input: &StageInput<'_>) -> bool {
        let words = extraction.value.split_whitespace().count();
        (1..=MAX_TITLE_WORDS).contains(&words)
    }

    fn infer(&self, input: &StageInput<'_>) -> Option<String> {
        input.context.target_roles.first().cloned()
    }

    fn generic(&self, input: &StageInput<'_>) -> String {
        format!("the team responsible for {}", input.context.domain)
    }
}
