mod fingerprint;

pub use fingerprint::PlanFingerprint;

use std::collections::BTreeMap;

/// One classified question category. The planner and executor key their
/// behavior off this, so the set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Trend,
    Variance,
    ForecastVsActual,
    ForecastGapAnalysis,
    Funnel,
    Distribution,
    Relationship,
    MultiMetric,
    Explain,
}

impl Intent {
    /// Substituted when the classifier fails.
    pub const FALLBACK: Intent = Intent::Trend;

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Trend => "trend",
            Intent::Variance => "variance",
            Intent::ForecastVsActual => "forecast_vs_actual",
            Intent::ForecastGapAnalysis => "forecast_gap_analysis",
            Intent::Funnel => "funnel",
            Intent::Distribution => "distribution",
            Intent::Relationship => "relationship",
            Intent::MultiMetric => "multi_metric",
            Intent::Explain => "explain",
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "trend" => Some(Intent::Trend),
            "variance" => Some(Intent::Variance),
            "forecast_vs_actual" => Some(Intent::ForecastVsActual),
            "forecast_gap_analysis" => Some(Intent::ForecastGapAnalysis),
            "funnel" => Some(Intent::Funnel),
            "distribution" => Some(Intent::Distribution),
            "relationship" => Some(Intent::Relationship),
            "multi_metric" => Some(Intent::MultiMetric),
            "explain" => Some(Intent::Explain),
            _ => None,
        }
    }

    fn hash_tag(self) -> u8 {
        match self {
            Intent::Trend => 0x01,
            Intent::Variance => 0x02,
            Intent::ForecastVsActual => 0x03,
            Intent::ForecastGapAnalysis => 0x04,
            Intent::Funnel => 0x05,
            Intent::Distribution => 0x06,
            Intent::Relationship => 0x07,
            Intent::MultiMetric => 0x08,
            Intent::Explain => 0x09,
        }
    }
}

/// Reporting window codes. Each maps to an approximate day count for the
/// guardrail's window ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    #[serde(rename = "last_7d")]
    Last7d,
    LastFullWeek,
    #[serde(rename = "last_30d")]
    Last30d,
    LastFullMonth,
    #[serde(rename = "last_3_full_months")]
    Last3FullMonths,
    LastFullQuarter,
    LastFullYear,
    Qtd,
    Mtd,
    Ytd,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeWindow::Last7d => "last_7d",
            TimeWindow::LastFullWeek => "last_full_week",
            TimeWindow::Last30d => "last_30d",
            TimeWindow::LastFullMonth => "last_full_month",
            TimeWindow::Last3FullMonths => "last_3_full_months",
            TimeWindow::LastFullQuarter => "last_full_quarter",
            TimeWindow::LastFullYear => "last_full_year",
            TimeWindow::Qtd => "qtd",
            TimeWindow::Mtd => "mtd",
            TimeWindow::Ytd => "ytd",
        }
    }

    /// Approximate span in days, worst case within the window.
    pub fn approx_days(self) -> u32 {
        match self {
            TimeWindow::Last7d | TimeWindow::LastFullWeek => 7,
            TimeWindow::Last30d => 30,
            TimeWindow::LastFullMonth | TimeWindow::Mtd => 31,
            TimeWindow::Last3FullMonths => 93,
            TimeWindow::LastFullQuarter | TimeWindow::Qtd => 92,
            TimeWindow::LastFullYear | TimeWindow::Ytd => 365,
        }
    }

    fn hash_tag(self) -> u8 {
        match self {
            TimeWindow::Last7d => 0x01,
            TimeWindow::LastFullWeek => 0x02,
            TimeWindow::Last30d => 0x03,
            TimeWindow::LastFullMonth => 0x04,
            TimeWindow::Last3FullMonths => 0x05,
            TimeWindow::LastFullQuarter => 0x06,
            TimeWindow::LastFullYear => 0x07,
            TimeWindow::Qtd => 0x08,
            TimeWindow::Mtd => 0x09,
            TimeWindow::Ytd => 0x0a,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
        }
    }

    /// Default bucketing for a window when the question does not ask for one:
    /// up to a month daily, up to a quarter weekly, a year monthly.
    pub fn default_for(window: TimeWindow) -> Self {
        match window {
            TimeWindow::Last7d
            | TimeWindow::LastFullWeek
            | TimeWindow::Last30d
            | TimeWindow::LastFullMonth
            | TimeWindow::Mtd => Granularity::Daily,
            TimeWindow::Last3FullMonths | TimeWindow::LastFullQuarter | TimeWindow::Qtd => {
                Granularity::Weekly
            }
            TimeWindow::LastFullYear | TimeWindow::Ytd => Granularity::Monthly,
        }
    }

    fn hash_tag(self) -> u8 {
        match self {
            Granularity::Daily => 0x01,
            Granularity::Weekly => 0x02,
            Granularity::Monthly => 0x03,
        }
    }
}

/// Visualization hint carried on the plan. Opaque to the orchestrator; the
/// chart builder decides what to do with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    GroupedBar,
    Funnel,
    Donut,
    Scatter,
}

impl ChartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::GroupedBar => "grouped_bar",
            ChartKind::Funnel => "funnel",
            ChartKind::Donut => "donut",
            ChartKind::Scatter => "scatter",
        }
    }

    /// Chart hint a planner should pick for an intent when the question does
    /// not ask for a specific one.
    pub fn default_for(intent: Intent) -> Self {
        match intent {
            Intent::Trend | Intent::MultiMetric | Intent::Explain => ChartKind::Line,
            Intent::Variance => ChartKind::Bar,
            Intent::ForecastVsActual | Intent::ForecastGapAnalysis => ChartKind::GroupedBar,
            Intent::Funnel => ChartKind::Funnel,
            Intent::Distribution => ChartKind::Donut,
            Intent::Relationship => ChartKind::Scatter,
        }
    }

    fn hash_tag(self) -> u8 {
        match self {
            ChartKind::Line => 0x01,
            ChartKind::Bar => 0x02,
            ChartKind::GroupedBar => 0x03,
            ChartKind::Funnel => 0x04,
            ChartKind::Donut => 0x05,
            ChartKind::Scatter => 0x06,
        }
    }
}

/// Filterable dimensions, each with a fixed vocabulary the guardrail
/// enforces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SegmentField {
    Channel,
    Grade,
    ProdType,
    RepeatType,
    Term,
    #[serde(rename = "cr_fico_band")]
    FicoBand,
    Purpose,
}

impl SegmentField {
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentField::Channel => "channel",
            SegmentField::Grade => "grade",
            SegmentField::ProdType => "prod_type",
            SegmentField::RepeatType => "repeat_type",
            SegmentField::Term => "term",
            SegmentField::FicoBand => "cr_fico_band",
            SegmentField::Purpose => "purpose",
        }
    }

    pub fn allowed_values(self) -> &'static [&'static str] {
        match self {
            SegmentField::Channel => &[
                "OMB",
                "Email",
                "Search",
                "D2LC",
                "DM",
                "LT",
                "Experian",
                "Karma",
                "Small Partners",
            ],
            SegmentField::Grade => &["P1", "P2", "P3", "P4", "P5", "P6"],
            SegmentField::ProdType => &["Prime", "NP", "D2P"],
            SegmentField::RepeatType => &["Repeat", "New"],
            SegmentField::Term => &["36", "48", "60", "72", "84"],
            SegmentField::FicoBand => &["<640", "640-699", "700-759", "760+"],
            SegmentField::Purpose => &[
                "debt_consolidation",
                "home_improvement",
                "major_purchase",
                "medical",
                "car",
                "other",
            ],
        }
    }

    fn hash_tag(self) -> u8 {
        match self {
            SegmentField::Channel => 0x01,
            SegmentField::Grade => 0x02,
            SegmentField::ProdType => 0x03,
            SegmentField::RepeatType => 0x04,
            SegmentField::Term => 0x05,
            SegmentField::FicoBand => 0x06,
            SegmentField::Purpose => 0x07,
        }
    }
}

/// A segment filter value: either one member of the field's vocabulary, or
/// the "ALL" sentinel meaning "group by this dimension".
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SegmentValue {
    All,
    Member(String),
}

impl SegmentValue {
    pub fn is_all(&self) -> bool {
        matches!(self, SegmentValue::All)
    }
}

impl From<String> for SegmentValue {
    fn from(value: String) -> Self {
        if value == "ALL" {
            SegmentValue::All
        } else {
            SegmentValue::Member(value)
        }
    }
}

impl From<SegmentValue> for String {
    fn from(value: SegmentValue) -> Self {
        match value {
            SegmentValue::All => "ALL".to_string(),
            SegmentValue::Member(v) => v,
        }
    }
}

/// Structured description of what to query and how to present it, produced
/// by the planner from a natural-language question. Immutable once built;
/// [`Plan::fingerprint`] is the cache key.
///
/// Segments live in a `BTreeMap` so iteration is key-ordered regardless of
/// how the planner inserted them.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Plan {
    pub intent: Intent,
    pub dataset: String,
    pub metric: String,
    pub date_field: String,
    pub window: TimeWindow,
    pub granularity: Granularity,
    #[serde(default)]
    pub segments: BTreeMap<SegmentField, SegmentValue>,
    pub chart: ChartKind,
}

pub type Row = serde_json::Map<String, serde_json::Value>;

/// Ordered homogeneous result records. The orchestrator only ever looks at
/// the row count; everything else is the chart builder's and insight
/// writer's business.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TableRows(pub Vec<Row>);

impl TableRows {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Rendered visualization artifact. Opaque result blob.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChartSpec(pub serde_json::Value);

/// One segment-level driver called out in a narrative.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Driver {
    pub segment: String,
    pub value: f64,
    pub delta: f64,
    pub delta_pct: f64,
}

/// Narrative artifact produced by the insight writer.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Insight {
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
}
