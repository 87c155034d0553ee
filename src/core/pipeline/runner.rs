//! Drives one question through the pipeline phases and owns whole-run
//! retry. Collaborator failures are converted to typed state errors at the
//! stage boundary; nothing escapes to the host.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PipelineSettings;
use crate::core::cache::{CachedBundle, ResultCache};
use crate::core::collaborators::{
    ChartBuilder, ChatTurn, InsightWriter, IntentClassifier, QueryExecutor, QueryPlanner,
};
use crate::core::guardrail;
use crate::core::plan::{Insight, Intent};

use super::{Phase, PipelineState, QueryOutcome, StageError, can_transition};

/// The orchestrator. One instance serves many concurrent queries; each call
/// to [`run`](QueryPipeline::run) owns its own [`PipelineState`]. The cache
/// is the only shared resource, and no collaborator call happens while its
/// lock is held.
pub struct QueryPipeline {
    classifier: Arc<dyn IntentClassifier>,
    planner: Arc<dyn QueryPlanner>,
    executor: Arc<dyn QueryExecutor>,
    charts: Arc<dyn ChartBuilder>,
    insights: Arc<dyn InsightWriter>,
    cache: Arc<ResultCache>,
    settings: PipelineSettings,
}

impl QueryPipeline {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        planner: Arc<dyn QueryPlanner>,
        executor: Arc<dyn QueryExecutor>,
        charts: Arc<dyn ChartBuilder>,
        insights: Arc<dyn InsightWriter>,
        cache: Arc<ResultCache>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            classifier,
            planner,
            executor,
            charts,
            insights,
            cache,
            settings,
        }
    }

    /// Answer a question, retrying the whole pipeline up to the configured
    /// attempt count while the terminal state carries an error.
    pub async fn run(&self, query: &str, history: &[ChatTurn]) -> QueryOutcome {
        self.run_with_attempts(query, history, self.settings.max_attempts)
            .await
    }

    pub async fn run_with_attempts(
        &self,
        query: &str,
        history: &[ChatTurn],
        max_attempts: usize,
    ) -> QueryOutcome {
        let run_id = Uuid::new_v4();
        let max_attempts = max_attempts.max(1);
        info!(run_id = %run_id, query, "running query");

        let mut state = self.run_once(query, history).await;
        let mut attempt = 1;
        while attempt < max_attempts {
            let Some(error) = state.error.as_ref() else {
                break;
            };
            warn!(run_id = %run_id, attempt, "attempt failed: {}; retrying", error);
            attempt += 1;
            state = self.run_once(query, history).await;
        }

        info!(
            run_id = %run_id,
            phase = state.phase.as_str(),
            cache_hit = state.cache_hit,
            attempts = attempt,
            "query completed"
        );
        QueryOutcome {
            plan: state.plan,
            fingerprint: state.fingerprint.map(|f| f.as_hex()),
            chart: state.chart,
            insight: state.insight,
            error: state.error.map(|e| e.to_string()),
            cache_hit: state.cache_hit,
        }
    }

    /// One attempt, classification through caching, from a fresh state.
    pub(crate) async fn run_once(&self, query: &str, history: &[ChatTurn]) -> PipelineState {
        let mut state = PipelineState::new(query, history);

        // Classification. Failure substitutes the fallback intent so the
        // pipeline can still proceed.
        let intent = match self.classifier.classify(&state.query, &state.history).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(
                    "intent classification failed, falling back to '{}': {}",
                    Intent::FALLBACK.as_str(),
                    e
                );
                Intent::FALLBACK
            }
        };
        state.intent = Some(intent);
        advance(&mut state, Phase::Classified);

        // Explain questions want a definition, not data: produce the
        // narrative and stop. No planning, no execution, no caching.
        if intent == Intent::Explain {
            let insight = match self.insights.explain(&state.query).await {
                Ok(insight) => insight,
                Err(e) => {
                    warn!("explanation failed, substituting degraded narrative: {}", e);
                    degraded_explanation()
                }
            };
            state.insight = Some(insight);
            advance(&mut state, Phase::Explained);
            return state;
        }

        // Planning. Fatal to the attempt.
        let plan = match self.planner.plan(&state.query, intent, &state.history).await {
            Ok(plan) => plan,
            Err(e) => {
                state.error = Some(StageError::Collaborator {
                    stage: "planning",
                    message: e.to_string(),
                });
                advance(&mut state, Phase::Failed);
                return state;
            }
        };
        let fingerprint = plan.fingerprint();
        state.plan = Some(plan.clone());
        state.fingerprint = Some(fingerprint);
        advance(&mut state, Phase::Planned);

        // Cache lookup. A hit serves the stored bundle as-is.
        let cached = self.cache.get(&fingerprint);
        advance(&mut state, Phase::CacheChecked);
        if let Some(bundle) = cached {
            info!(fingerprint = %fingerprint, "cache hit");
            state.cache_hit = true;
            state.rows = Some(bundle.rows);
            state.chart = bundle.chart;
            state.insight = bundle.insight;
            advance(&mut state, Phase::Responded);
            return state;
        }

        // Guardrail. Rejection terminates without executing; security
        // rejections are audit-logged inside the guardrail.
        let sql = self.executor.render_sql(&plan);
        let verdict = guardrail::validate(&plan, &sql);
        state.sql = Some(sql);
        advance(&mut state, Phase::Validated);
        if !verdict.is_valid {
            state.error = Some(StageError::Rejected {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "query rejected by guardrail".to_string()),
                security_event: verdict.security_event,
            });
            advance(&mut state, Phase::Failed);
            return state;
        }

        // Execution. Fatal to the attempt.
        let rows = match self.executor.execute(&plan).await {
            Ok(rows) => rows,
            Err(e) => {
                state.error = Some(StageError::Collaborator {
                    stage: "execution",
                    message: e.to_string(),
                });
                advance(&mut state, Phase::Failed);
                return state;
            }
        };
        info!(rows = rows.len(), "query executed");
        state.rows = Some(rows.clone());
        advance(&mut state, Phase::Executed);

        // Chart and narrative are best-effort: a failure leaves the
        // artifact absent and the run still completes.
        match self.charts.build(&plan, &rows).await {
            Ok(chart) => state.chart = Some(chart),
            Err(e) => warn!("chart rendering failed, continuing without a chart: {}", e),
        }
        advance(&mut state, Phase::Rendered);

        match self.insights.summarize(&plan, &rows).await {
            Ok(insight) => state.insight = Some(insight),
            Err(e) => warn!("insight generation failed, continuing without a narrative: {}", e),
        }
        advance(&mut state, Phase::Summarized);

        // Store only complete, useful results: no error, data present, and
        // at least one artifact worth serving again.
        if state.error.is_none()
            && !rows.is_empty()
            && (state.chart.is_some() || state.insight.is_some())
        {
            self.cache.set(
                fingerprint,
                CachedBundle {
                    rows,
                    chart: state.chart.clone(),
                    insight: state.insight.clone(),
                },
            );
        }
        advance(&mut state, Phase::Cached);

        advance(&mut state, Phase::Responded);
        state
    }
}

fn advance(state: &mut PipelineState, to: Phase) {
    debug_assert!(
        can_transition(state.phase, to),
        "illegal phase transition {} -> {}",
        state.phase.as_str(),
        to.as_str()
    );
    state.phase = to;
}

fn degraded_explanation() -> Insight {
    Insight {
        title: "Explanation".to_string(),
        summary: "Unable to retrieve an explanation right now. Try rephrasing the question."
            .to_string(),
        bullets: Vec::new(),
        drivers: Vec::new(),
    }
}
