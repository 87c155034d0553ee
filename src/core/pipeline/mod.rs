//! Query-orchestration pipeline: the phase machine, the per-run state
//! record, and the runner that drives collaborators through it.

mod runner;

pub use runner::QueryPipeline;

use super::collaborators::ChatTurn;
use super::plan::{ChartSpec, Insight, Intent, Plan, PlanFingerprint, TableRows};

/// Pipeline phases. Every run starts at `Start` and ends at exactly one of
/// the terminal phases: `Explained`, `Responded`, or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Classified,
    Explained,
    Planned,
    CacheChecked,
    Validated,
    Executed,
    Rendered,
    Summarized,
    Cached,
    Responded,
    Failed,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::Classified => "classified",
            Phase::Explained => "explained",
            Phase::Planned => "planned",
            Phase::CacheChecked => "cache_checked",
            Phase::Validated => "validated",
            Phase::Executed => "executed",
            Phase::Rendered => "rendered",
            Phase::Summarized => "summarized",
            Phase::Cached => "cached",
            Phase::Responded => "responded",
            Phase::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Explained | Phase::Responded | Phase::Failed)
    }
}

pub fn can_transition(from: Phase, to: Phase) -> bool {
    match from {
        Phase::Start => matches!(to, Phase::Classified),
        // Explain questions jump straight to narrative production; planner
        // failure is fatal to the attempt.
        Phase::Classified => matches!(to, Phase::Explained | Phase::Planned | Phase::Failed),
        Phase::Planned => matches!(to, Phase::CacheChecked),
        // A cache hit responds immediately; a miss goes on to validation.
        Phase::CacheChecked => matches!(to, Phase::Responded | Phase::Validated),
        // Rejection or executor failure both terminate here.
        Phase::Validated => matches!(to, Phase::Executed | Phase::Failed),
        Phase::Executed => matches!(to, Phase::Rendered),
        Phase::Rendered => matches!(to, Phase::Summarized),
        Phase::Summarized => matches!(to, Phase::Cached),
        Phase::Cached => matches!(to, Phase::Responded),
        Phase::Explained | Phase::Responded | Phase::Failed => false,
    }
}

/// Typed stage failure recorded on the run state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("{stage} failed: {message}")]
    Collaborator { stage: &'static str, message: String },

    #[error("{reason}")]
    Rejected { reason: String, security_event: bool },
}

impl StageError {
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            StageError::Rejected {
                security_event: true,
                ..
            }
        )
    }
}

/// The single mutable record threaded through one pipeline run. Created
/// fresh per question, mutated only by the runner, discarded once the
/// outcome is built.
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub query: String,
    pub history: Vec<ChatTurn>,
    pub phase: Phase,
    pub intent: Option<Intent>,
    pub plan: Option<Plan>,
    pub fingerprint: Option<PlanFingerprint>,
    pub sql: Option<String>,
    pub rows: Option<TableRows>,
    pub chart: Option<ChartSpec>,
    pub insight: Option<Insight>,
    pub error: Option<StageError>,
    pub cache_hit: bool,
}

impl PipelineState {
    pub fn new(query: &str, history: &[ChatTurn]) -> Self {
        Self {
            query: query.to_string(),
            history: history.to_vec(),
            phase: Phase::Start,
            intent: None,
            plan: None,
            fingerprint: None,
            sql: None,
            rows: None,
            chart: None,
            insight: None,
            error: None,
            cache_hit: false,
        }
    }
}

/// What the host gets back from [`QueryPipeline::run`]: always well-formed,
/// never a panic or stray error.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct QueryOutcome {
    pub plan: Option<Plan>,
    pub fingerprint: Option<String>,
    pub chart: Option<ChartSpec>,
    pub insight: Option<Insight>,
    pub error: Option<String>,
    pub cache_hit: bool,
}

#[cfg(test)]
mod tests;
