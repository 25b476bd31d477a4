//! Proof point: a sponsor outcome relevant to the prospect's industry.

use outreach_shared::StageKind;

use super::{Lookup, StageInput};

pub struct ProofPointLookup;

impl Lookup for ProofPointLookup {
    fn kind(&self) -> StageKind {
        StageKind::ProofPoint
    }

    fn search_query(&self, input: &StageInput<'_>) -> Option<String> {
        Some(format!(
            "{} case study {}",
            input.context.company_name, input.contact.industry
        ))
    }

    fn task(&self, input: &StageInput<'_>) -> String {
        format!(
            "Find a published customer outcome achieved with {} that is relevant to {}. \
             Phrase it as 'helped <customer> <outcome>'.",
            input.context.company_name, input.contact.industry
        )
    }

    fn infer(&self, input: &StageInput<'_>) -> Option<String> {
        let study = input.context.case_study_for(&input.contact.industry)?;
        Some(format!("helped {} {}", study.customer, study.outcome))
    }

    fn generic(&self, _input: &StageInput<'_>) -> String {
        "teams similar to yours".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{acme_context, contact, provider_config};

    #[test]
    fn inference_uses_matching_case_study() {
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
        let inferred = ProofPointLookup.infer(&input).expect("case study");
        assert!(inferred.starts_with("helped Fabrikam"));

        let mut bare = ctx.clone();
        bare.case_studies.clear();
        let input = StageInput {
            context: &bare,
            ..input
        };
        assert_eq!(ProofPointLookup.infer(&input), None);
        assert_eq!(ProofPointLookup.generic(&input), "teams similar to yours");
    }
}
