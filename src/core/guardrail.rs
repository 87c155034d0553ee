//! Policy guardrail: rejects unsafe or out-of-policy plans before anything
//! touches the data layer.
//!
//! Rules run in order and short-circuit on the first failure:
//! 1. forbidden keyword scan over the rendered query text (security event)
//! 2. single-statement scan (security event)
//! 3. segment filter values against each field's allowed set
//! 4. time window ceiling

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use super::plan::{Plan, SegmentValue, TimeWindow};

/// Keywords that indicate write or DDL operations. Matched as whole words,
/// case-insensitively, so a column like `last_insert_date` stays clean.
pub const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "TRUNCATE", "REPLACE", "MERGE",
];

/// Hard ceiling on the reporting window. All predefined window codes fit;
/// the bound matters once custom date ranges exist.
pub const MAX_TIME_WINDOW_DAYS: u32 = 365;

/// Audit-log preview length for rejected query text.
const QUERY_PREVIEW_CHARS: usize = 200;

static FORBIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b({})\b", FORBIDDEN_KEYWORDS.join("|"));
    Regex::new(&pattern).unwrap()
});

/// Outcome of guardrail validation. `security_event` distinguishes
/// malicious-looking input from ordinary business-rule violations; security
/// rejections are audit-logged before being returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailVerdict {
    pub is_valid: bool,
    pub reason: Option<String>,
    pub security_event: bool,
}

impl GuardrailVerdict {
    fn pass() -> Self {
        Self {
            is_valid: true,
            reason: None,
            security_event: false,
        }
    }

    fn reject(reason: String) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason),
            security_event: false,
        }
    }

    fn reject_security(reason: String) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason),
            security_event: true,
        }
    }
}

/// Validate a plan together with the query text rendered for it.
pub fn validate(plan: &Plan, query_text: &str) -> GuardrailVerdict {
    let keyword_check = check_forbidden_keywords(query_text);
    if !keyword_check.is_valid {
        log_security_event(plan, query_text, &keyword_check);
        return keyword_check;
    }

    let statement_check = check_single_statement(query_text);
    if !statement_check.is_valid {
        log_security_event(plan, query_text, &statement_check);
        return statement_check;
    }

    let segment_check = check_segment_values(plan);
    if !segment_check.is_valid {
        return segment_check;
    }

    let window_check = check_time_window(plan.window);
    if !window_check.is_valid {
        return window_check;
    }

    GuardrailVerdict::pass()
}

fn check_forbidden_keywords(query_text: &str) -> GuardrailVerdict {
    match FORBIDDEN_RE.find(query_text) {
        Some(found) => GuardrailVerdict::reject_security(format!(
            "query text contains forbidden keyword: {}",
            found.as_str().to_uppercase()
        )),
        None => GuardrailVerdict::pass(),
    }
}

fn check_single_statement(query_text: &str) -> GuardrailVerdict {
    // One trailing terminator is tolerated; anything else means multiple
    // statements.
    let stripped = query_text.trim().trim_end_matches(';');
    let trailing = query_text.trim().len() - stripped.len();
    if trailing > 1 || stripped.contains(';') {
        return GuardrailVerdict::reject_security(
            "query text contains multiple statements (statement separators not allowed)"
                .to_string(),
        );
    }
    GuardrailVerdict::pass()
}

fn check_segment_values(plan: &Plan) -> GuardrailVerdict {
    for (field, value) in &plan.segments {
        let SegmentValue::Member(member) = value else {
            continue; // "ALL" requests grouping, always fine
        };
        let allowed = field.allowed_values();
        if !allowed.contains(&member.as_str()) {
            return GuardrailVerdict::reject(format!(
                "invalid {} value: '{}'. Allowed values: {} or 'ALL' for grouping",
                field.as_str(),
                member,
                allowed.join(", ")
            ));
        }
    }
    GuardrailVerdict::pass()
}

fn check_time_window(window: TimeWindow) -> GuardrailVerdict {
    let days = window.approx_days();
    if exceeds_window_ceiling(days) {
        return GuardrailVerdict::reject(format!(
            "time window exceeds maximum allowed ({} days): {} (~{} days)",
            MAX_TIME_WINDOW_DAYS,
            window.as_str(),
            days
        ));
    }
    GuardrailVerdict::pass()
}

fn exceeds_window_ceiling(days: u32) -> bool {
    days > MAX_TIME_WINDOW_DAYS
}

fn log_security_event(plan: &Plan, query_text: &str, verdict: &GuardrailVerdict) {
    let preview: String = query_text.chars().take(QUERY_PREVIEW_CHARS).collect();
    warn!(
        event_type = "query_rejected",
        intent = plan.intent.as_str(),
        dataset = %plan.dataset,
        metric = %plan.metric,
        window = plan.window.as_str(),
        query_preview = %preview,
        reason = verdict.reason.as_deref().unwrap_or(""),
        "SECURITY EVENT: query rejected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::{ChartKind, Granularity, Intent, SegmentField};
    use std::collections::BTreeMap;

    fn plan() -> Plan {
        Plan {
            intent: Intent::Trend,
            dataset: "cps_tb".to_string(),
            metric: "issued_amnt".to_string(),
            date_field: "issue_date".to_string(),
            window: TimeWindow::Last30d,
            granularity: Granularity::Daily,
            segments: BTreeMap::new(),
            chart: ChartKind::Line,
        }
    }

    #[test]
    fn forbidden_keyword_is_a_security_event() {
        let verdict = validate(&plan(), "DROP TABLE cps_tb");
        assert!(!verdict.is_valid);
        assert!(verdict.security_event);
        assert!(verdict.reason.unwrap().contains("DROP"));
    }

    #[test]
    fn forbidden_keyword_matches_case_insensitively() {
        let verdict = validate(&plan(), "select 1; delete from cps_tb");
        assert!(!verdict.is_valid);
        assert!(verdict.security_event);
    }

    #[test]
    fn keyword_inside_identifier_is_benign() {
        let sql = "SELECT last_insert_date, created_at FROM cps_tb WHERE deleted_flag = 0";
        let verdict = validate(&plan(), sql);
        assert!(verdict.is_valid, "{:?}", verdict.reason);
    }

    #[test]
    fn embedded_separator_is_a_security_event() {
        let verdict = validate(&plan(), "SELECT 1; SELECT 2");
        assert!(!verdict.is_valid);
        assert!(verdict.security_event);
    }

    #[test]
    fn single_trailing_separator_is_fine() {
        let verdict = validate(&plan(), "SELECT week, SUM(issued_amnt) FROM cps_tb;");
        assert!(verdict.is_valid);
    }

    #[test]
    fn doubled_trailing_separator_is_rejected() {
        let verdict = validate(&plan(), "SELECT 1;;");
        assert!(!verdict.is_valid);
        assert!(verdict.security_event);
    }

    #[test]
    fn out_of_set_segment_value_is_rejected_without_security_flag() {
        let mut p = plan();
        p.segments.insert(
            SegmentField::Channel,
            SegmentValue::Member("Smail".to_string()),
        );
        let verdict = validate(&p, "SELECT 1");
        assert!(!verdict.is_valid);
        assert!(!verdict.security_event);
        let reason = verdict.reason.unwrap();
        assert!(reason.contains("channel"));
        assert!(reason.contains("Email"), "allowed set listed: {reason}");
    }

    #[test]
    fn all_sentinel_and_literal_members_pass() {
        let mut p = plan();
        p.segments.insert(SegmentField::Channel, SegmentValue::All);
        p.segments.insert(
            SegmentField::Grade,
            SegmentValue::Member("P3".to_string()),
        );
        p.segments
            .insert(SegmentField::Term, SegmentValue::Member("60".to_string()));
        let verdict = validate(&p, "SELECT 1");
        assert!(verdict.is_valid, "{:?}", verdict.reason);
    }

    #[test]
    fn predefined_windows_all_pass_the_ceiling() {
        for window in [
            TimeWindow::Last7d,
            TimeWindow::Last3FullMonths,
            TimeWindow::LastFullYear,
            TimeWindow::Ytd,
        ] {
            let mut p = plan();
            p.window = window;
            assert!(validate(&p, "SELECT 1").is_valid);
        }
    }

    #[test]
    fn window_ceiling_boundary() {
        assert!(!exceeds_window_ceiling(MAX_TIME_WINDOW_DAYS));
        assert!(exceeds_window_ceiling(MAX_TIME_WINDOW_DAYS + 1));
    }

    #[test]
    fn clean_query_passes_with_no_reason() {
        let verdict = validate(&plan(), "SELECT week, SUM(issued_amnt) FROM cps_tb GROUP BY week");
        assert!(verdict.is_valid);
        assert!(verdict.reason.is_none());
        assert!(!verdict.security_event);
    }
}
