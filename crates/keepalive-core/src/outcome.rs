use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of one sampling iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TickOutcome {
    Changed { previous: u64, current: u64 },
    Unchanged { counter: u64, elapsed_secs: u64 },
    Recovered(RecoveryReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub counter: u64,
    pub stalled_secs: u64,
    pub last_change_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStep {
    PreRestart,
    Restart,
    PostRestart,
}

impl RecoveryStep {
    pub fn label(self) -> &'static str {
        match self {
            RecoveryStep::PreRestart => "pre-restart",
            RecoveryStep::Restart => "restart",
            RecoveryStep::PostRestart => "post-restart",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: RecoveryStep,
    pub command: String,
    /// `None` if the command could not be spawned or was killed by a signal.
    pub exit_code: Option<i32>,
}
