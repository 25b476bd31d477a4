//! Timely signal: a recent event at the company worth referencing.

use outreach_shared::StageKind;

use super::{Extraction, Lookup, StageInput};

/// Signals longer than this read like paragraphs, not clauses.
const MAX_SIGNAL_CHARS: usize = 160;

pub struct SignalLookup;

impl Lookup for SignalLookup {
    fn kind(&self) -> StageKind {
        StageKind::Signal
    }

    fn search_query(&self, input: &StageInput<'_>) -> Option<String> {
        Some(format!("{} news", input.contact.company))
    }

    fn site_path(&self) -> Option<&'static str> {
        Some("/news")
    }

    fn task(&self, input: &StageInput<'_>) -> String {
        format!(
            "Find one recent, specific event at {} (funding, launch, key hire, expansion, \
             acquisition) and phrase it as a short clause such as 'raised a Series B'.",
            input.contact.company
        )
    }

    fn accept(&self, extraction: &Extraction, _input: &StageInput<'_>) -> bool {
        extraction.value.chars().count() <= MAX_SIGNAL_CHARS
    }

    fn infer(&self, input: &StageInput<'_>) -> Option<String> {
        let industry = input.contact.industry.trim();
        (!industry.is_empty()).then(|| format!("the pace of change in {industry}"))
    }

    fn generic(&self, _input: &StageInput<'_>) -> String {
        "the priorities on your roadmap this year".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{acme_context, contact, provider_config};

    #[test]
    fn generic_signal_names_nothing_specific() {
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
        let generic = SignalLookup.generic(&input);
        assert!(!generic.chars().any(|c| c.is_ascii_digit()));
        assert!(!generic.contains(&contact.company));
        assert_eq!(
            SignalLookup.infer(&input).as_deref(),
            Some("the pace of change in logistics")
        );
    }
}
