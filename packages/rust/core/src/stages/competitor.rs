//! Competitor: a company the prospect competes with, never one the sponsor
//! excludes.

use outreach_shared::StageKind;

use super::{Extraction, Lookup, StageInput};

pub struct CompetitorLookup;

impl Lookup for CompetitorLookup {
    fn kind(&self) -> StageKind {
        StageKind::Competitor
    }

    fn search_query(&self, input: &StageInput<'_>) -> Option<String> {
        Some(format!("{} competitors", input.contact.company))
    }

    fn task(&self, input: &StageInput<'_>) -> String {
        let mut excluded: Vec<&str> = vec![input.context.company_name.as_str()];
        excluded.extend(input.context.competitor_exclusions.iter().map(String::as_str));
        format!(
            "Name one direct competitor of {} in {}. Never name {} or any of: {}.",
            input.contact.company,
            input.contact.industry,
            input.contact.company,
            excluded.join(", ")
        )
    }

    fn accept(&self, extraction: &Extraction, input: &StageInput<'_>) -> bool {
        let name = extraction.value.trim();
        !input.context.excludes_competitor(name)
            && !name.eq_ignore_ascii_case(input.contact.company.trim())
    }

    fn infer(&self, input: &StageInput<'_>) -> Option<String> {
        let industry = input.contact.industry.trim();
        (!industry.is_empty()).then(|| format!("other {industry} companies"))
    }

    fn generic(&self, _input: &StageInput<'_>) -> String {
        "others in your market".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{acme_context, contact, provider_config};

    fn named(value: &str) -> Extraction {
        Extraction {
            value: value.into(),
            quote: "competitors include".into(),
            category: None,
        }
    }

    #[test]
    fn filters_excluded_sponsor_and_self() {
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

        assert!(CompetitorLookup.accept(&named("Contoso Freight"), &input));
        assert!(!CompetitorLookup.accept(&named(&ctx.company_name), &input));
        assert!(!CompetitorLookup.accept(&named(&ctx.competitor_exclusions[0]), &input));
        assert!(!CompetitorLookup.accept(&named("northwind logistics"), &input));
    }

    #[test]
    fn infers_from_industry() {
        let ctx = acme_context();
        let contact_a = contact(None);
        let cfg = provider_config();
        let input = StageInput {
            contact: &contact_a,
            context: &ctx,
            hints: &[],
            provider: &cfg,
            live_lookup: true,
            signal: None,
        };
        assert_eq!(
            CompetitorLookup.infer(&input).as_deref(),
            Some("other logistics companies")
        );

        let mut contact_b = contact_a.clone();
        contact_b.industry.clear();
        let input = StageInput {
            contact: &contact_b,
            ..input
        };
        assert_eq!(CompetitorLookup.infer(&input), None);
    }
}
