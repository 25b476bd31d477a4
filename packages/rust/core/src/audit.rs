//! Structured audit events.
//!
//! The engine emits one event per stage invocation, per validated attempt,
//! per escalation and per run boundary. Sinks decide where they go; the core
//! never persists them.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use outreach_shared::{
    ClientId, Confidence, EffortTier, RunId, RunState, Source, StageKind, Usage,
};

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    RunStarted {
        run_id: RunId,
        client_id: ClientId,
        company: String,
        at: DateTime<Utc>,
    },
    StageCompleted {
        run_id: RunId,
        attempt: u32,
        stage: StageKind,
        /// Correction hints the stage was given.
        hints: usize,
        /// Whether the signal result was passed in.
        signal_given: bool,
        value: String,
        source: Source,
        confidence: Confidence,
        fallback_level: u8,
        cached: bool,
        searches: u32,
        fetches: u32,
        completion_calls: u32,
        errors: Vec<String>,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
    AttemptValidated {
        run_id: RunId,
        attempt: u32,
        effort_tier: EffortTier,
        content_hash: String,
        score: u8,
        passed: bool,
        issues: Vec<String>,
        at: DateTime<Utc>,
    },
    Escalated {
        run_id: RunId,
        attempt: u32,
        from: EffortTier,
        to: EffortTier,
        hints: usize,
        at: DateTime<Utc>,
    },
    RunCompleted {
        run_id: RunId,
        state: RunState,
        attempts: usize,
        chosen_attempt: Option<u32>,
        score: Option<u8>,
        passed: bool,
        usage: Usage,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StageCompleted { run_id, .. }
            | Self::AttemptValidated { run_id, .. }
            | Self::Escalated { run_id, .. }
            | Self::RunCompleted { run_id, .. } => *run_id,
        }
    }
}

/// Receives audit events. Implementations must not block for long.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Discards every event.
pub struct SilentAudit;

impl AuditSink for SilentAudit {
    fn record(&self, _event: &AuditEvent) {}
}

/// Mirrors events into the `tracing` log.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match event {
            AuditEvent::RunStarted { run_id, company, .. } => {
                info!(%run_id, %company, "run started");
            }
            AuditEvent::StageCompleted {
                run_id,
                attempt,
                stage,
                hints,
                source,
                fallback_level,
                cached,
                ..
            } => {
                info!(%run_id, attempt, %stage, hints, source = source.as_str(), fallback_level, cached, "stage completed");
            }
            AuditEvent::AttemptValidated {
                run_id,
                attempt,
                effort_tier,
                score,
                passed,
                ..
            } => {
                info!(%run_id, attempt, %effort_tier, score, passed, "attempt validated");
            }
            AuditEvent::Escalated {
                run_id, from, to, ..
            } => {
                info!(%run_id, %from, %to, "escalating effort");
            }
            AuditEvent::RunCompleted {
                run_id,
                state,
                attempts,
                score,
                passed,
                ..
            } => {
                info!(%run_id, ?state, attempts, ?score, passed, "run completed");
            }
        }
    }
}

/// Keeps events in memory, for tests and embedding callers.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Forwards every event to each inner sink, in order.
pub struct AuditFanout(Vec<Arc<dyn AuditSink>>);

impl AuditFanout {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self(sinks)
    }
}

impl AuditSink for AuditFanout {
    fn record(&self, event: &AuditEvent) {
        for sink in &self.0 {
            sink.record(event);
        }
    }
}
