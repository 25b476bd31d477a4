//! End-to-end drafting run: context -> stages -> assemble -> validate/retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument};

use outreach_shared::{
    ClientContext, ClientId, Contact, ContextStore, Draft, EffortTiersConfig, GenerationConfig,
    Result, RunId, RunRecord, RunState, StageKind, StageOutputs, StageResult, Template,
    TemplateSource, Usage,
};

use crate::assembler::{Assembler, ParsedTemplate, parse_template};
use crate::audit::{AuditEvent, AuditSink, SilentAudit};
use crate::cache::{CompanyKey, StageCache};
use crate::cancel::CancellationToken;
use crate::retry::{
    AttemptPlan, AttemptRunner, GeneratedDraft, RetryController, RetryOutcome, RetryState, race,
};
use crate::stages::{Stage, StageInput, StageOutcome, StageSet, StageTrace};
use crate::validator::{ValidationInput, ValidationOutcome, Validator};

/// One drafting request.
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub client_id: ClientId,
    pub contact: Contact,
    /// Template override; the client's default template otherwise.
    pub template: Option<String>,
}

/// Wires collaborators, stages, validator and cache into drafting runs.
pub struct Orchestrator {
    contexts: Arc<dyn ContextStore>,
    templates: Arc<dyn TemplateSource>,
    stages: StageSet,
    validator: Arc<dyn Validator>,
    cache: Option<Arc<StageCache>>,
    audit: Arc<dyn AuditSink>,
    assembler: Assembler,
    controller: RetryController,
    live_lookup: bool,
}

impl Orchestrator {
    pub fn new(
        contexts: Arc<dyn ContextStore>,
        templates: Arc<dyn TemplateSource>,
        stages: StageSet,
        validator: Arc<dyn Validator>,
    ) -> Self {
        let generation = GenerationConfig::default();
        Self {
            contexts,
            templates,
            stages,
            validator,
            cache: None,
            audit: Arc::new(SilentAudit),
            assembler: Assembler::default(),
            controller: RetryController::new(EffortTiersConfig::default(), &generation),
            live_lookup: generation.live_lookup,
        }
    }

    pub fn with_cache(mut self, cache: Arc<StageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_assembler(mut self, assembler: Assembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// Effort tier table plus retry and lookup settings.
    pub fn with_generation(mut self, tiers: EffortTiersConfig, generation: &GenerationConfig) -> Self {
        self.controller = RetryController::new(tiers, generation);
        self.live_lookup = generation.live_lookup;
        self
    }

    /// Run one request to a [`RunRecord`].
    ///
    /// Fails only when the client context or template cannot be resolved.
    /// Stage failures degrade results; a draft below the gate is returned
    /// with `passed = false`.
    #[instrument(skip_all, fields(client = %request.client_id, company = %request.contact.company))]
    pub async fn run(&self, request: &DraftRequest, cancel: &CancellationToken) -> Result<RunRecord> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = RunId::new();

        info!(%run_id, "starting drafting run");
        self.audit.record(&AuditEvent::RunStarted {
            run_id,
            client_id: request.client_id.clone(),
            company: request.contact.company.clone(),
            at: started_at,
        });

        // --- Phase 1: Context & template (fatal) ---
        let deadline = self.controller.deadline();
        let (context, template, parsed) =
            match race(self.prepare(request, run_id), cancel, deadline).await {
                Ok(loaded) => loaded?,
                Err(interrupt) => {
                    info!(%run_id, ?interrupt, "run interrupted before generation");
                    let outcome = RetryOutcome {
                        attempts: Vec::new(),
                        chosen_attempt: None,
                        passed: false,
                        state: RunState::Cancelled,
                        usage: Usage::default(),
                        transitions: vec![RetryState::Pending, RetryState::Cancelled],
                    };
                    return Ok(self.finish(request, run_id, started_at, start, outcome));
                }
            };

        // --- Phase 2: Generate / validate / retry ---
        let runner = RunAttempts {
            orchestrator: self,
            run_id,
            contact: &request.contact,
            context: &context,
            template: &parsed,
            template_text: &template.text,
        };
        let outcome = self
            .controller
            .run_until(&runner, cancel, self.audit.as_ref(), run_id, deadline)
            .await;

        Ok(self.finish(request, run_id, started_at, start, outcome))
    }

    /// Resolve the client context and parse the template.
    async fn prepare(
        &self,
        request: &DraftRequest,
        run_id: RunId,
    ) -> Result<(ClientContext, Template, ParsedTemplate)> {
        let context = self
            .contexts
            .load_context(&request.client_id)
            .await
            .inspect_err(|e| error!(%run_id, error = %e, "context lookup failed"))?;
        let template_name = request
            .template
            .clone()
            .unwrap_or_else(|| context.default_template.clone());
        let template = self
            .templates
            .get_template(&template_name)
            .await
            .inspect_err(|e| error!(%run_id, error = %e, "template lookup failed"))?;
        let parsed = parse_template(&template)
            .inspect_err(|e| error!(%run_id, error = %e, "template rejected"))?;
        debug!(template = %template_name, "template ready");
        Ok((context, template, parsed))
    }

    /// Build the record and emit the completion event.
    fn finish(
        &self,
        request: &DraftRequest,
        run_id: RunId,
        started_at: DateTime<Utc>,
        start: Instant,
        outcome: RetryOutcome,
    ) -> RunRecord {
        let record = RunRecord {
            run_id,
            client_id: request.client_id.clone(),
            contact: request.contact.clone(),
            attempts: outcome.attempts,
            chosen_attempt: outcome.chosen_attempt,
            passed: outcome.passed,
            state: outcome.state,
            usage: outcome.usage,
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        self.audit.record(&AuditEvent::RunCompleted {
            run_id,
            state: record.state,
            attempts: record.attempts.len(),
            chosen_attempt: record.chosen_attempt,
            score: record.final_report().map(|r| r.score),
            passed: record.passed,
            usage: record.usage.clone(),
            elapsed_ms: record.elapsed_ms,
            at: Utc::now(),
        });
        info!(
            %run_id,
            state = ?record.state,
            attempts = record.attempts.len(),
            passed = record.passed,
            elapsed_ms = record.elapsed_ms,
            "drafting run complete"
        );

        record
    }
}

/// Attempt runner bound to one request.
struct RunAttempts<'a> {
    orchestrator: &'a Orchestrator,
    run_id: RunId,
    contact: &'a Contact,
    context: &'a ClientContext,
    template: &'a ParsedTemplate,
    template_text: &'a str,
}

impl RunAttempts<'_> {
    /// Run a stage unless the cache already seeded its slot.
    async fn produce(
        &self,
        stage: &dyn Stage,
        seeded: &HashMap<StageKind, StageResult>,
        input: &StageInput<'_>,
    ) -> StageOutcome {
        match seeded.get(&stage.kind()) {
            Some(result) => StageOutcome {
                result: result.clone(),
                trace: StageTrace::from_cache(),
            },
            None => stage.produce(input).await,
        }
    }

    fn record_stage(&self, plan: &AttemptPlan<'_>, outcome: &StageOutcome) {
        let r = &outcome.result;
        let t = &outcome.trace;
        self.orchestrator.audit.record(&AuditEvent::StageCompleted {
            run_id: self.run_id,
            attempt: plan.attempt,
            stage: r.stage(),
            hints: plan.hints.len(),
            signal_given: r.stage() == StageKind::Tooling,
            value: r.value().to_string(),
            source: r.source(),
            confidence: r.confidence(),
            fallback_level: r.fallback_level(),
            cached: t.cached,
            searches: t.searches,
            fetches: t.fetches,
            completion_calls: t.completion_calls,
            errors: t.errors.clone(),
            elapsed_ms: t.elapsed_ms,
            at: Utc::now(),
        });
    }
}

#[async_trait::async_trait]
impl AttemptRunner for RunAttempts<'_> {
    #[instrument(skip_all, fields(attempt = plan.attempt, tier = %plan.effort_tier))]
    async fn generate(&self, plan: &AttemptPlan<'_>) -> GeneratedDraft {
        let o = self.orchestrator;
        // Retries regenerate everything with hints and bypass the cache.
        let use_cache = plan.hints.is_empty();
        let key = CompanyKey::for_contact(self.contact);

        let seeded = match (&o.cache, use_cache) {
            (Some(cache), true) => cache.get_all(&key).await,
            _ => HashMap::new(),
        };
        if !seeded.is_empty() {
            debug!(cached = seeded.len(), "seeded stage results from cache");
        }

        let input = StageInput {
            contact: self.contact,
            context: self.context,
            hints: plan.hints,
            provider: plan.provider,
            live_lookup: o.live_lookup,
            signal: None,
        };

        // Independent batch, awaited as a whole.
        let (role, competitor, pain_point, proof_point) = tokio::join!(
            self.produce(o.stages.role.as_ref(), &seeded, &input),
            self.produce(o.stages.competitor.as_ref(), &seeded, &input),
            self.produce(o.stages.pain_point.as_ref(), &seeded, &input),
            self.produce(o.stages.proof_point.as_ref(), &seeded, &input),
        );

        // Dependent batch: tooling consumes signal.
        let signal = self.produce(o.stages.signal.as_ref(), &seeded, &input).await;
        let tooling_input = StageInput {
            signal: Some(&signal.result),
            ..input
        };
        let tooling = self
            .produce(o.stages.tooling.as_ref(), &seeded, &tooling_input)
            .await;

        let outcomes = [&role, &competitor, &pain_point, &signal, &tooling, &proof_point];
        let mut usage = Usage::default();
        for outcome in outcomes {
            usage += &outcome.trace.usage();
            self.record_stage(plan, outcome);
        }

        if let (Some(cache), true) = (&o.cache, use_cache) {
            for outcome in outcomes {
                if !outcome.trace.cached && !outcome.trace.has_provider_errors() {
                    cache.put(&key, outcome.result.clone()).await;
                }
            }
        }

        let stages = StageOutputs {
            role: role.result,
            competitor: competitor.result,
            pain_point: pain_point.result,
            signal: signal.result,
            tooling: tooling.result,
            proof_point: proof_point.result,
        };
        let draft = o.assembler.assemble(
            self.template,
            stages,
            self.contact,
            self.context,
            plan.attempt,
            plan.effort_tier,
        );
        GeneratedDraft { draft, usage }
    }

    async fn validate(&self, draft: &Draft, plan: &AttemptPlan<'_>) -> ValidationOutcome {
        let o = self.orchestrator;
        o.validator
            .validate(&ValidationInput {
                draft,
                contact: self.contact,
                context: self.context,
                template_text: self.template_text,
                quality_gate: o.controller.quality_gate(),
                provider: plan.provider,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use outreach_shared::{
        Confidence, Criterion, Issue, OutreachError, ProviderError, RunState, SearchHit, Source,
        ValidationConfig, ValidationReport,
    };

    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::stages::Toolkit;
    use crate::testing::{
        FakeFetcher, FakeSearch, MemoryContexts, MemoryTemplates, ScriptedCompletion,
        acme_context, contact, intro_template,
    };
    use crate::validator::RubricValidator;

    fn toolkit(search: Arc<FakeSearch>, completion: Arc<ScriptedCompletion>) -> Toolkit {
        Toolkit {
            completion,
            search: Some(search),
            fetcher: Some(Arc::new(FakeFetcher::empty())),
        }
    }

    fn orchestrator(stages: StageSet) -> Orchestrator {
        Orchestrator::new(
            Arc::new(MemoryContexts::with(acme_context())),
            Arc::new(MemoryTemplates::with(intro_template())),
            stages,
            Arc::new(RubricValidator::new(ValidationConfig::default())),
        )
    }

    fn request() -> DraftRequest {
        DraftRequest {
            client_id: ClientId::new("acme"),
            contact: contact(None),
            template: None,
        }
    }

    #[tokio::test]
    async fn scenario_a_everything_generic_without_lookups() {
        let search = Arc::new(FakeSearch::with_hits(Vec::new()));
        let completion = Arc::new(ScriptedCompletion::new(Vec::<&str>::new()));
        let mut ctx = acme_context();
        ctx.target_roles.clear();
        ctx.pain_themes.clear();
        ctx.tool_categories.clear();
        ctx.case_studies.clear();
        let mut contact = contact(None);
        contact.industry.clear();

        let orch = Orchestrator::new(
            Arc::new(MemoryContexts::with(ctx)),
            Arc::new(MemoryTemplates::with(intro_template())),
            StageSet::standard(&toolkit(search.clone(), completion.clone())),
            Arc::new(RubricValidator::new(ValidationConfig::default())),
        );
        let req = DraftRequest {
            contact,
            ..request()
        };

        let record = orch.run(&req, &CancellationToken::new()).await.expect("run");
        let draft = record.final_draft().expect("draft");
        for result in draft.stages.iter() {
            assert_eq!(result.fallback_level(), 3, "{:?}", result.stage());
            assert_eq!(result.source(), Source::Generic);
        }
        assert!(!draft.text.contains("{{"));
        assert!(!draft.text.contains("}}"));
        assert_eq!(completion.calls(), 0);
        assert!(record.attempts.len() <= 3);
    }

    #[tokio::test]
    async fn missing_context_is_fatal() {
        let orch = orchestrator(StageSet::standard(&toolkit(
            Arc::new(FakeSearch::with_hits(Vec::new())),
            Arc::new(ScriptedCompletion::new(Vec::<&str>::new())),
        )));
        let req = DraftRequest {
            client_id: ClientId::new("unknown"),
            ..request()
        };
        let err = orch.run(&req, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OutreachError::ContextNotFound { .. }));
        assert!(err.is_fatal_to_run());
    }

    #[tokio::test]
    async fn missing_and_malformed_templates_are_fatal() {
        let stages = StageSet::standard(&toolkit(
            Arc::new(FakeSearch::with_hits(Vec::new())),
            Arc::new(ScriptedCompletion::new(Vec::<&str>::new())),
        ));
        let orch = orchestrator(stages.clone());
        let req = DraftRequest {
            template: Some("nope".into()),
            ..request()
        };
        let err = orch.run(&req, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OutreachError::TemplateNotFound { .. }));

        let mut broken = intro_template();
        broken.text = "Hi {{role}}".into();
        let orch = Orchestrator::new(
            Arc::new(MemoryContexts::with(acme_context())),
            Arc::new(MemoryTemplates::with(broken)),
            stages,
            Arc::new(RubricValidator::new(ValidationConfig::default())),
        );
        let err = orch.run(&request(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OutreachError::MalformedTemplate { .. }));
    }

    /// Records start/finish order and whether a signal was provided.
    struct RecordingStage {
        kind: StageKind,
        log: Arc<Mutex<Vec<String>>>,
        delay: Duration,
    }

    #[async_trait]
    impl Stage for RecordingStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn produce(&self, input: &StageInput<'_>) -> StageOutcome {
            self.log.lock().expect("lock").push(format!("start {}", self.kind));
            tokio::time::sleep(self.delay).await;
            if self.kind == StageKind::Tooling {
                let signal = input.signal.map(|s| s.value().to_string());
                self.log
                    .lock()
                    .expect("lock")
                    .push(format!("tooling saw {}", signal.unwrap_or_default()));
            }
            self.log.lock().expect("lock").push(format!("end {}", self.kind));
            StageOutcome {
                result: StageResult::inferred(self.kind, format!("{} value", self.kind)),
                trace: StageTrace::default(),
            }
        }
    }

    fn recording_stages(log: &Arc<Mutex<Vec<String>>>) -> StageSet {
        let make = |kind, ms| -> Arc<dyn Stage> {
            Arc::new(RecordingStage {
                kind,
                log: log.clone(),
                delay: Duration::from_millis(ms),
            })
        };
        StageSet {
            role: make(StageKind::Role, 30),
            competitor: make(StageKind::Competitor, 10),
            pain_point: make(StageKind::PainPoint, 20),
            signal: make(StageKind::Signal, 5),
            tooling: make(StageKind::Tooling, 1),
            proof_point: make(StageKind::ProofPoint, 15),
        }
    }

    #[tokio::test]
    async fn scenario_e_tooling_runs_after_signal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let orch = orchestrator(recording_stages(&log)).with_generation(
            EffortTiersConfig::default(),
            &GenerationConfig {
                retry_budget: 1,
                ..GenerationConfig::default()
            },
        );
        orch.run(&request(), &CancellationToken::new()).await.expect("run");

        let log = log.lock().expect("lock").clone();
        let pos = |entry: &str| log.iter().position(|l| l == entry).expect(entry);
        assert!(pos("end signal") < pos("start tooling"));
        assert!(log.contains(&"tooling saw signal value".to_string()));
        // The independent batch finishes before the dependent batch starts.
        for kind in ["role", "competitor", "pain_point", "proof_point"] {
            assert!(pos(&format!("end {kind}")) < pos("start signal"));
        }
        // And it actually overlapped.
        assert!(pos("start proof_point") < pos("end competitor"));
    }

    #[tokio::test]
    async fn second_run_is_served_from_cache() {
        let search = Arc::new(FakeSearch::with_hits(vec![SearchHit {
            title: "Northwind".into(),
            url: "https://news.example.com/n".into(),
            snippet: "Northwind Logistics named Dana Lee VP of Sales.".into(),
        }]));
        let completion = Arc::new(ScriptedCompletion::routed(|prompt| {
            if prompt.user.contains("job title") {
                Ok(r#"{"value": "VP of Sales", "quote": "named Dana Lee VP of Sales"}"#.into())
            } else {
                Ok("NONE".into())
            }
        }));
        let cache = Arc::new(StageCache::new(10));
        let orch = orchestrator(StageSet::standard(&toolkit(search.clone(), completion.clone())))
            .with_cache(cache.clone())
            .with_generation(
                EffortTiersConfig::default(),
                &GenerationConfig {
                    retry_budget: 1,
                    ..GenerationConfig::default()
                },
            );

        let first = orch.run(&request(), &CancellationToken::new()).await.expect("first");
        let searches_after_first = search.calls();
        let completions_after_first = completion.calls();
        assert!(searches_after_first > 0);

        let second = orch.run(&request(), &CancellationToken::new()).await.expect("second");
        assert_eq!(search.calls(), searches_after_first);
        assert_eq!(completion.calls(), completions_after_first);

        let a = &first.final_draft().expect("draft").stages;
        let b = &second.final_draft().expect("draft").stages;
        assert_eq!(a, b);
        assert_eq!(b.role.source(), Source::WebSearch);
        assert_eq!(b.role.confidence(), Confidence::VeryHigh);
        assert_eq!(second.usage.searches, 0);
    }

    #[tokio::test]
    async fn provider_errors_are_not_cached() {
        let search = Arc::new(FakeSearch::failing(ProviderError::Timeout));
        let completion = Arc::new(ScriptedCompletion::new(Vec::<&str>::new()));
        let cache = Arc::new(StageCache::new(10));
        let orch = orchestrator(StageSet::standard(&toolkit(search.clone(), completion)))
            .with_cache(cache.clone())
            .with_generation(
                EffortTiersConfig::default(),
                &GenerationConfig {
                    retry_budget: 1,
                    ..GenerationConfig::default()
                },
            );

        orch.run(&request(), &CancellationToken::new()).await.expect("run");
        let key = CompanyKey::for_contact(&request().contact);
        assert!(cache.get_all(&key).await.is_empty());

        orch.run(&request(), &CancellationToken::new()).await.expect("run");
        assert_eq!(search.calls(), 12);
    }

    #[tokio::test]
    async fn audit_trail_covers_stages_attempts_and_completion() {
        let audit = Arc::new(MemoryAuditSink::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let orch = orchestrator(recording_stages(&log))
            .with_audit(audit.clone())
            .with_generation(
                EffortTiersConfig::default(),
                &GenerationConfig {
                    retry_budget: 1,
                    ..GenerationConfig::default()
                },
            );
        let record = orch.run(&request(), &CancellationToken::new()).await.expect("run");

        let events = audit.events();
        assert!(matches!(events.first(), Some(AuditEvent::RunStarted { .. })));
        assert!(matches!(events.last(), Some(AuditEvent::RunCompleted { .. })));
        let stages: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AuditEvent::StageCompleted {
                    stage,
                    hints,
                    signal_given,
                    ..
                } => Some((*stage, *hints, *signal_given)),
                _ => None,
            })
            .collect();
        assert_eq!(stages.len(), 6);
        assert!(stages.iter().all(|(_, hints, _)| *hints == 0));
        let with_signal: Vec<_> = stages.iter().filter(|(_, _, s)| *s).map(|(k, _, _)| *k).collect();
        assert_eq!(with_signal, vec![StageKind::Tooling]);
        assert!(events.iter().all(|e| e.run_id() == record.run_id));
        assert_eq!(record.attempts.len(), 1);
        assert_eq!(record.attempts[0].draft.attempt, 1);
    }

    /// Fails every draft with a single correctable issue.
    struct RejectingValidator;

    #[async_trait]
    impl Validator for RejectingValidator {
        async fn validate(&self, _input: &ValidationInput<'_>) -> ValidationOutcome {
            ValidationOutcome {
                report: ValidationReport {
                    score: 50,
                    passed: false,
                    breakdown: Vec::new(),
                    issues: vec![Issue {
                        criterion: Criterion::Punctuation,
                        message: "repeated punctuation '!!'".into(),
                        penalty: 5,
                    }],
                    suggestions: vec!["Use a single terminal punctuation mark".into()],
                },
                usage: Usage::default(),
            }
        }
    }

    #[tokio::test]
    async fn retried_stages_are_audited_with_their_hints() {
        let audit = Arc::new(MemoryAuditSink::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let orch = Orchestrator::new(
            Arc::new(MemoryContexts::with(acme_context())),
            Arc::new(MemoryTemplates::with(intro_template())),
            recording_stages(&log),
            Arc::new(RejectingValidator),
        )
        .with_audit(audit.clone())
        .with_generation(
            EffortTiersConfig::default(),
            &GenerationConfig {
                retry_budget: 2,
                ..GenerationConfig::default()
            },
        );
        let record = orch.run(&request(), &CancellationToken::new()).await.expect("run");
        assert_eq!(record.attempts.len(), 2);

        let hints_per_attempt: Vec<(u32, usize)> = audit
            .events()
            .iter()
            .filter_map(|e| match e {
                AuditEvent::StageCompleted { attempt, hints, .. } => Some((*attempt, *hints)),
                _ => None,
            })
            .collect();
        assert_eq!(hints_per_attempt.len(), 12);
        for (attempt, hints) in hints_per_attempt {
            assert_eq!(hints, if attempt == 1 { 0 } else { 1 }, "attempt {attempt}");
        }
    }

    #[tokio::test]
    async fn cancelled_run_returns_partial_record() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut stages = recording_stages(&log);
        stages.role = Arc::new(RecordingStage {
            kind: StageKind::Role,
            log: log.clone(),
            delay: Duration::from_secs(10),
        });
        let orch = orchestrator(stages);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let record = tokio::time::timeout(Duration::from_secs(5), orch.run(&request(), &cancel))
            .await
            .expect("cancellation is prompt")
            .expect("run");
        assert_eq!(record.state, RunState::Cancelled);
        assert!(record.attempts.is_empty());
        assert!(record.final_draft().is_none());
        assert!(!record.passed);
    }

    /// A context store that never answers.
    struct StalledContexts;

    #[async_trait]
    impl ContextStore for StalledContexts {
        async fn load_context(&self, _client_id: &ClientId) -> Result<ClientContext> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_stalled_context_load() {
        let completion = Arc::new(ScriptedCompletion::new(Vec::<&str>::new()));
        let audit = Arc::new(MemoryAuditSink::new());
        let orch = Orchestrator::new(
            Arc::new(StalledContexts),
            Arc::new(MemoryTemplates::with(intro_template())),
            StageSet::standard(&toolkit(
                Arc::new(FakeSearch::with_hits(Vec::new())),
                completion.clone(),
            )),
            Arc::new(RubricValidator::new(ValidationConfig::default())),
        )
        .with_audit(audit.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let record = tokio::time::timeout(Duration::from_secs(5), orch.run(&request(), &cancel))
            .await
            .expect("cancellation is prompt")
            .expect("run");
        assert_eq!(record.state, RunState::Cancelled);
        assert!(record.attempts.is_empty());
        assert_eq!(completion.calls(), 0);
        assert!(matches!(
            audit.events().last(),
            Some(AuditEvent::RunCompleted {
                state: RunState::Cancelled,
                ..
            })
        ));
    }
}
