//! Relevant tooling: a tool the company uses in one of the sponsor's tool
//! categories. Runs after the signal stage and folds its result into the
//! query and prompt.

use outreach_shared::StageKind;

use super::{Extraction, Lookup, StageInput};

pub struct ToolingLookup;

impl Lookup for ToolingLookup {
    fn kind(&self) -> StageKind {
        StageKind::Tooling
    }

    fn search_query(&self, input: &StageInput<'_>) -> Option<String> {
        let mut query = input.contact.company.clone();
        for category in input.context.tool_categories.iter().take(3) {
            query.push(' ');
            query.push_str(category);
        }
        // Only observed signals are specific enough to narrow the search.
        if let Some(signal) = input.signal.filter(|s| s.fallback_level() <= 1) {
            query.push(' ');
            query.push_str(signal.value());
        }
        Some(query)
    }

    fn site_path(&self) -> Option<&'static str> {
        Some("/careers")
    }

    fn task(&self, input: &StageInput<'_>) -> String {
        format!(
            "Identify one tool or platform {} uses in one of these categories: {}. \
             Add a \"category\" field to the JSON naming which category it belongs to.",
            input.contact.company,
            input.context.tool_categories.join(", ")
        )
    }

    fn accept(&self, extraction: &Extraction, input: &StageInput<'_>) -> bool {
        extraction
            .category
            .as_deref()
            .and_then(|c| input.context.tool_category(c))
            .is_some()
    }

    fn infer(&self, input: &StageInput<'_>) -> Option<String> {
        let category = input.context.tool_categories.first()?;
        Some(format!("your {category} stack"))
    }

    fn generic(&self, _input: &StageInput<'_>) -> String {
        "your current tools".into()
    }
}

#[cfg(test)]
mod tests {
    use outreach_shared::StageResult;

    use super::*;
    use crate::testing::{acme_context, contact, provider_config};

    #[test]
    fn observed_signal_narrows_the_query() {
        let ctx = acme_context();
        let contact = contact(None);
        let cfg = provider_config();
        let observed = StageResult::new(
            StageKind::Signal,
            "opened a Rotterdam hub",
            outreach_shared::Source::WebSearch,
            outreach_shared::Confidence::High,
        );
        let guessed = StageResult::generic(StageKind::Signal, "the priorities on your roadmap");

        let with_observed = StageInput {
            contact: &contact,
            context: &ctx,
            hints: &[],
            provider: &cfg,
            live_lookup: true,
            signal: Some(&observed),
        };
        let query = ToolingLookup.search_query(&with_observed).expect("query");
        assert!(query.contains("Rotterdam"));

        let with_guess = StageInput {
            signal: Some(&guessed),
            ..with_observed
        };
        let query = ToolingLookup.search_query(&with_guess).expect("query");
        assert!(!query.contains("roadmap"));
    }

    #[test]
    fn category_must_be_relevant() {
        let ctx = acme_context();
        let contact = contact(None);
        let cfg = provider_config();
        let input = StageInput {
            contact: &contact,
            context: &ctx,
            hints: &[],
            provider: &cfg,
            live_lookup: true,
            signal: None,
        };
        let relevant = Extraction {
            value: "Salesforce".into(),
            quote: "we run on Salesforce".into(),
            category: Some("crm".into()),
        };
        assert!(ToolingLookup.accept(&relevant, &input));

        let irrelevant = Extraction {
            category: Some("video editing".into()),
            ..relevant.clone()
        };
        assert!(!ToolingLookup.accept(&irrelevant, &input));

        let missing = Extraction {
            category: None,
            ..relevant
        };
        assert!(!ToolingLookup.accept(&missing, &input));
    }
}
