//! Pain point: a problem the prospect likely has that the sponsor solves.

use outreach_shared::StageKind;

use super::{Extraction, Lookup, StageInput};

pub struct PainPointLookup;

impl Lookup for PainPointLookup {
    fn kind(&self) -> StageKind {
        StageKind::PainPoint
    }

    fn search_query(&self, input: &StageInput<'_>) -> Option<String> {
        let themes = input.context.pain_themes.iter().take(2).cloned();
        let query = std::iter::once(input.contact.company.clone())
            .chain(themes)
            .collect::<Vec<_>>()
            .join(" ");
        Some(query)
    }

    fn site_path(&self) -> Option<&'static str> {
        Some("/")
    }

    fn task(&self, input: &StageInput<'_>) -> String {
        format!(
            "Describe in under 15 words a challenge {company} is visibly facing that relates \
             to: {themes}. It must be a problem of {company}, not a feature of {sponsor}.",
            company = input.contact.company,
            themes = input.context.pain_themes.join("; "),
            sponsor = input.context.company_name,
        )
    }

    fn accept(&self, extraction: &Extraction, input: &StageInput<'_>) -> bool {
        let value = extraction.value.to_lowercase();
        !value.contains(&input.context.company_name.to_lowercase())
    }

    fn infer(&self, input: &StageInput<'_>) -> Option<String> {
        let theme = input.context.pain_themes.first()?;
        let industry = input.contact.industry.trim();
        // Themes are only framed per industry for the sponsor's own targets.
        if industry.is_empty() || !input.context.serves_industry(industry) {
            Some(theme.clone())
        } else {
            Some(format!("{theme} in {industry}"))
        }
    }

    fn generic(&self, input: &StageInput<'_>) -> String {
        format!("keeping {} efficient as you grow", input.context.domain)
    }
}
