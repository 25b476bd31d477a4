//! Validate-and-retry controller.
//!
//! ```text
//! Pending -> Generating -> Validating -> Done
//!                ^             |
//!                |             v
//!                +-------- Escalate          (budget left, below gate)
//!
//! Validating -> Done       (passed, or last attempt is the best)
//! Validating -> Exhausted  (budget spent, an earlier attempt is better)
//! any        -> Cancelled  (token cancelled or run timeout elapsed)
//! ```
//!
//! The controller owns the `EffortTier -> ProviderConfig` table. Each attempt
//! after the first moves one tier up and carries the previous report's issues
//! and suggestions as correction hints.

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use outreach_shared::{
    AttemptRecord, Draft, EffortTier, EffortTiersConfig, GenerationConfig, ProviderConfig,
    RunId, RunState, Usage,
};

use crate::audit::{AuditEvent, AuditSink};
use crate::cancel::CancellationToken;
use crate::validator::ValidationOutcome;

/// Parameters of one attempt.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPlan<'a> {
    /// 1-based attempt number.
    pub attempt: u32,
    pub effort_tier: EffortTier,
    pub provider: &'a ProviderConfig,
    /// Correction hints from the previous attempt; empty on attempt 1.
    pub hints: &'a [String],
}

/// A generated draft plus what it cost.
#[derive(Debug, Clone)]
pub struct GeneratedDraft {
    pub draft: Draft,
    pub usage: Usage,
}

/// The generate and validate halves of an attempt.
#[async_trait]
pub trait AttemptRunner: Send + Sync {
    async fn generate(&self, plan: &AttemptPlan<'_>) -> GeneratedDraft;

    async fn validate(&self, draft: &Draft, plan: &AttemptPlan<'_>) -> ValidationOutcome;
}

/// Controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Pending,
    Generating { attempt: u32 },
    Validating { attempt: u32 },
    Escalate { attempt: u32 },
    Done,
    Exhausted,
    Cancelled,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Exhausted | Self::Cancelled)
    }
}

/// Result of a controller run.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub attempts: Vec<AttemptRecord>,
    /// Attempt number of the best draft.
    pub chosen_attempt: Option<u32>,
    pub passed: bool,
    pub state: RunState,
    pub usage: Usage,
    /// Every state visited, in order.
    pub transitions: Vec<RetryState>,
}

/// Why an in-flight step was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interrupt {
    Cancelled,
    TimedOut,
}

pub struct RetryController {
    tiers: EffortTiersConfig,
    initial_tier: EffortTier,
    retry_budget: u32,
    quality_gate: u8,
    run_timeout: Option<std::time::Duration>,
}

impl RetryController {
    pub fn new(tiers: EffortTiersConfig, generation: &GenerationConfig) -> Self {
        Self {
            tiers,
            initial_tier: generation.initial_tier,
            retry_budget: generation.retry_budget.max(1),
            quality_gate: generation.quality_gate,
            run_timeout: generation.run_timeout(),
        }
    }

    pub fn quality_gate(&self) -> u8 {
        self.quality_gate
    }

    /// When a run starting now must stop, if a run timeout is configured.
    pub fn deadline(&self) -> Option<tokio::time::Instant> {
        self.run_timeout.map(|t| tokio::time::Instant::now() + t)
    }

    /// Drive attempts until a terminal state.
    pub async fn run(
        &self,
        runner: &dyn AttemptRunner,
        cancel: &CancellationToken,
        audit: &dyn AuditSink,
        run_id: RunId,
    ) -> RetryOutcome {
        self.run_until(runner, cancel, audit, run_id, self.deadline())
            .await
    }

    /// Drive attempts until a terminal state or `deadline`.
    #[instrument(skip_all, fields(%run_id, budget = self.retry_budget, gate = self.quality_gate))]
    pub async fn run_until(
        &self,
        runner: &dyn AttemptRunner,
        cancel: &CancellationToken,
        audit: &dyn AuditSink,
        run_id: RunId,
        deadline: Option<tokio::time::Instant>,
    ) -> RetryOutcome {
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut usage = Usage::default();
        let mut transitions = vec![RetryState::Pending];
        let mut tier = self.initial_tier;
        let mut hints: Vec<String> = Vec::new();
        let mut pending: Option<(GeneratedDraft, Instant)> = None;
        let mut state = RetryState::Pending;

        while !state.is_terminal() {
            state = match state {
                RetryState::Pending => RetryState::Generating { attempt: 1 },

                RetryState::Generating { attempt } => {
                    let provider = self.tiers.resolve(tier);
                    let plan = AttemptPlan {
                        attempt,
                        effort_tier: tier,
                        provider,
                        hints: &hints,
                    };
                    debug!(attempt, %tier, model = %provider.model, "generating");
                    let started = Instant::now();
                    match race(runner.generate(&plan), cancel, deadline).await {
                        Ok(generated) => {
                            usage += &generated.usage;
                            pending = Some((generated, started));
                            RetryState::Validating { attempt }
                        }
                        Err(interrupt) => interrupted(interrupt, attempt),
                    }
                }

                RetryState::Validating { attempt } => {
                    let Some((generated, started)) = pending.take() else {
                        warn!(attempt, "validating without a draft");
                        break;
                    };
                    let provider = self.tiers.resolve(tier);
                    let plan = AttemptPlan {
                        attempt,
                        effort_tier: tier,
                        provider,
                        hints: &hints,
                    };
                    match race(runner.validate(&generated.draft, &plan), cancel, deadline).await {
                        Ok(validated) => {
                            usage += &validated.usage;
                            let report = validated.report;
                            audit.record(&AuditEvent::AttemptValidated {
                                run_id,
                                attempt,
                                effort_tier: tier,
                                content_hash: generated.draft.content_hash.clone(),
                                score: report.score,
                                passed: report.passed,
                                issues: report.issues.iter().map(|i| i.message.clone()).collect(),
                                at: Utc::now(),
                            });
                            info!(attempt, score = report.score, passed = report.passed, "attempt validated");

                            let passed = report.passed;
                            attempts.push(AttemptRecord {
                                draft: generated.draft,
                                report,
                                elapsed_ms: started.elapsed().as_millis() as u64,
                            });

                            if passed {
                                RetryState::Done
                            } else if attempt >= self.retry_budget {
                                if best_attempt(&attempts) == Some(attempt) {
                                    RetryState::Done
                                } else {
                                    RetryState::Exhausted
                                }
                            } else {
                                RetryState::Escalate { attempt }
                            }
                        }
                        Err(interrupt) => interrupted(interrupt, attempt),
                    }
                }

                RetryState::Escalate { attempt } => {
                    let next = tier.escalate();
                    hints = attempts
                        .last()
                        .map(|a| a.report.correction_hints())
                        .unwrap_or_default();
                    audit.record(&AuditEvent::Escalated {
                        run_id,
                        attempt,
                        from: tier,
                        to: next,
                        hints: hints.len(),
                        at: Utc::now(),
                    });
                    tier = next;
                    RetryState::Generating {
                        attempt: attempt + 1,
                    }
                }

                terminal => terminal,
            };
            transitions.push(state);
        }

        let chosen_attempt = best_attempt(&attempts);
        let passed = chosen_attempt
            .and_then(|n| attempts.get(n as usize - 1))
            .is_some_and(|a| a.report.passed);
        let run_state = match state {
            RetryState::Done => RunState::Done,
            RetryState::Cancelled => RunState::Cancelled,
            _ => RunState::Exhausted,
        };

        RetryOutcome {
            attempts,
            chosen_attempt,
            passed,
            state: run_state,
            usage,
            transitions,
        }
    }
}

fn interrupted(interrupt: Interrupt, attempt: u32) -> RetryState {
    match interrupt {
        Interrupt::Cancelled => info!(attempt, "run cancelled"),
        Interrupt::TimedOut => warn!(attempt, "run timeout elapsed"),
    }
    RetryState::Cancelled
}

/// Race a step against cancellation and the run deadline. Losing drops the
/// step's future, which aborts its in-flight calls.
pub(crate) async fn race<F: Future>(
    step: F,
    cancel: &CancellationToken,
    deadline: Option<tokio::time::Instant>,
) -> Result<F::Output, Interrupt> {
    let timeout = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Interrupt::Cancelled),
        _ = timeout => Err(Interrupt::TimedOut),
        out = step => Ok(out),
    }
}

/// Highest-scoring attempt number; the earliest wins ties.
fn best_attempt(attempts: &[AttemptRecord]) -> Option<u32> {
    attempts
        .iter()
        .fold(None::<&AttemptRecord>, |best, a| match best {
            Some(b) if b.report.score >= a.report.score => Some(b),
            _ => Some(a),
        })
        .map(|a| a.draft.attempt)
}
