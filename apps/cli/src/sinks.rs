//! Audit sinks used by the CLI: a progress spinner and a JSON Lines file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use color_eyre::eyre::{Result, WrapErr};
use indicatif::{ProgressBar, ProgressStyle};
use outreach_core::{AuditEvent, AuditSink};
use tracing::warn;

/// Shows run progress on a spinner.
pub(crate) struct SpinnerAudit {
    spinner: ProgressBar,
}

impl SpinnerAudit {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    pub(crate) fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl AuditSink for SpinnerAudit {
    fn record(&self, event: &AuditEvent) {
        let msg = match event {
            AuditEvent::RunStarted { company, .. } => format!("Researching {company}"),
            AuditEvent::StageCompleted {
                attempt,
                stage,
                source,
                ..
            } => format!("[attempt {attempt}] {stage}: {}", source.as_str()),
            AuditEvent::AttemptValidated { attempt, score, .. } => {
                format!("[attempt {attempt}] scored {score}")
            }
            AuditEvent::Escalated { to, .. } => format!("Retrying with {to} effort"),
            AuditEvent::RunCompleted { .. } => "Done".to_string(),
        };
        self.spinner.set_message(msg);
    }
}

/// Appends every event as one JSON line.
pub(crate) struct JsonlAudit {
    out: Mutex<BufWriter<File>>,
}

impl JsonlAudit {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("cannot open audit log {}", path.display()))?;
        Ok(Self {
            out: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl AuditSink for JsonlAudit {
    fn record(&self, event: &AuditEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize audit event");
                return;
            }
        };
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(error = %e, "failed to write audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use outreach_shared::{ClientId, RunId};

    use super::*;

    #[test]
    fn jsonl_sink_appends_one_line_per_event() {
        let path =
            std::env::temp_dir().join(format!("outreach-audit-{}.jsonl", uuid::Uuid::now_v7()));
        let sink = JsonlAudit::open(&path).unwrap();
        let event = AuditEvent::RunStarted {
            run_id: RunId::new(),
            client_id: ClientId::new("acme"),
            company: "Northwind Logistics".into(),
            at: chrono::Utc::now(),
        };
        sink.record(&event);
        sink.record(&event);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["event"], "run_started");

        let _ = std::fs::remove_file(&path);
    }
}
