//! Drafting engine for personalized outreach emails.
//!
//! This crate ties together the generation stages, template assembly,
//! rubric validation and the retry controller into end-to-end drafting runs
//! (see [`Orchestrator::run`]). External collaborators are reached only
//! through the ports declared in `outreach-shared`.

pub mod assembler;
pub mod audit;
pub mod cache;
pub mod cancel;
pub mod orchestrator;
pub mod retry;
pub mod stages;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use assembler::{Assembler, ParsedTemplate, ProperNouns, normalize, parse_template};
pub use audit::{AuditEvent, AuditFanout, AuditSink, MemoryAuditSink, SilentAudit, TracingAuditSink};
pub use cache::{CompanyKey, StageCache};
pub use cancel::CancellationToken;
pub use orchestrator::{DraftRequest, Orchestrator};
pub use retry::{RetryController, RetryOutcome, RetryState};
pub use stages::{Stage, StageInput, StageOutcome, StageSet, StageTrace, Toolkit};
pub use validator::{RubricValidator, ValidationInput, ValidationOutcome, Validator};
