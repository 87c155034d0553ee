//! Trait surface for the external collaborators the pipeline drives.
//!
//! Implementations live with the host (LLM-backed classifier/planner, a SQL
//! executor, a chart renderer, a narrative writer). The pipeline only
//! depends on these contracts; tests script them.

use anyhow::Result;
use async_trait::async_trait;

use super::plan::{ChartSpec, Insight, Intent, Plan, TableRows};

/// One prior conversation turn, oldest-to-newest in a history slice.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Classifies a question into an [`Intent`]. Internal failure is not fatal:
/// the pipeline substitutes [`Intent::FALLBACK`].
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str, history: &[ChatTurn]) -> Result<Intent>;
}

/// Turns a question plus its classified intent into a structured [`Plan`].
/// Failure is fatal to the current attempt.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    async fn plan(&self, query: &str, intent: Intent, history: &[ChatTurn]) -> Result<Plan>;
}

/// Renders and executes a plan against the data layer.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Render the query text for a plan. Cheap and synchronous; the
    /// guardrail scans this text before `execute` is allowed to run.
    fn render_sql(&self, plan: &Plan) -> String;

    /// Execute the plan. Failure is fatal to the current attempt.
    async fn execute(&self, plan: &Plan) -> Result<TableRows>;
}

/// Builds a visualization artifact. Failure is tolerated; the pipeline
/// continues without a chart.
#[async_trait]
pub trait ChartBuilder: Send + Sync {
    async fn build(&self, plan: &Plan, rows: &TableRows) -> Result<ChartSpec>;
}

/// Produces narrative artifacts: result summaries for analytical runs and
/// standalone explanations for explain-intent questions. Failure is
/// tolerated on both paths.
#[async_trait]
pub trait InsightWriter: Send + Sync {
    async fn summarize(&self, plan: &Plan, rows: &TableRows) -> Result<Insight>;

    async fn explain(&self, query: &str) -> Result<Insight>;
}
