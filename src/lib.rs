pub mod config;
pub mod core;
pub mod logging;

pub use crate::config::{CacheSettings, PipelineSettings, ToplineConfig};
pub use crate::core::cache::{CacheStats, CachedBundle, ResultCache};
pub use crate::core::collaborators::{
    ChartBuilder, ChatTurn, InsightWriter, IntentClassifier, QueryExecutor, QueryPlanner,
};
pub use crate::core::guardrail::GuardrailVerdict;
pub use crate::core::pipeline::{Phase, PipelineState, QueryOutcome, QueryPipeline, StageError};
pub use crate::core::plan::{
    ChartKind, ChartSpec, Driver, Granularity, Insight, Intent, Plan, PlanFingerprint, Row,
    SegmentField, SegmentValue, TableRows, TimeWindow,
};
