//! Deterministic plan fingerprinting; the fingerprint is the cache key.

use sha2::{Digest, Sha256};

use super::Plan;

///
/// PlanFingerprint
///
/// Stable, deterministic fingerprint for query plans. Two plans with
/// identical field values produce the same fingerprint regardless of how
/// their segment maps were populated.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlanFingerprint([u8; 32]);

impl PlanFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for PlanFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

impl Plan {
    /// Compute a stable fingerprint for this plan.
    ///
    /// The hash stream is tagged per section and strings are length-prefixed,
    /// so field values can never collide across section boundaries. Segments
    /// are hashed in `BTreeMap` key order.
    #[must_use]
    pub fn fingerprint(&self) -> PlanFingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"planfp:v1");

        write_tag(&mut hasher, 0x01);
        write_tag(&mut hasher, self.intent.hash_tag());

        write_tag(&mut hasher, 0x02);
        write_str(&mut hasher, &self.dataset);

        write_tag(&mut hasher, 0x03);
        write_str(&mut hasher, &self.metric);

        write_tag(&mut hasher, 0x04);
        write_str(&mut hasher, &self.date_field);

        write_tag(&mut hasher, 0x05);
        write_tag(&mut hasher, self.window.hash_tag());

        write_tag(&mut hasher, 0x06);
        write_tag(&mut hasher, self.granularity.hash_tag());

        write_tag(&mut hasher, 0x07);
        write_u32(&mut hasher, self.segments.len() as u32);
        for (field, value) in &self.segments {
            write_tag(&mut hasher, field.hash_tag());
            match value {
                super::SegmentValue::All => write_tag(&mut hasher, 0x00),
                super::SegmentValue::Member(v) => {
                    write_tag(&mut hasher, 0x01);
                    write_str(&mut hasher, v);
                }
            }
        }

        write_tag(&mut hasher, 0x08);
        write_tag(&mut hasher, self.chart.hash_tag());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        PlanFingerprint(out)
    }
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}

#[cfg(test)]
mod tests {
    use crate::core::plan::{
        ChartKind, Granularity, Intent, Plan, SegmentField, SegmentValue, TimeWindow,
    };
    use std::collections::BTreeMap;

    fn base_plan() -> Plan {
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
    fn fingerprint_ignores_segment_insertion_order() {
        let mut plan_a = base_plan();
        plan_a
            .segments
            .insert(SegmentField::Channel, SegmentValue::Member("Email".into()));
        plan_a.segments.insert(SegmentField::Grade, SegmentValue::All);

        let mut plan_b = base_plan();
        plan_b.segments.insert(SegmentField::Grade, SegmentValue::All);
        plan_b
            .segments
            .insert(SegmentField::Channel, SegmentValue::Member("Email".into()));

        assert_eq!(plan_a.fingerprint(), plan_b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_each_field() {
        let base = base_plan();
        let reference = base.fingerprint();

        let mut changed = base.clone();
        changed.intent = Intent::Variance;
        assert_ne!(changed.fingerprint(), reference);

        let mut changed = base.clone();
        changed.dataset = "forecast_df".to_string();
        assert_ne!(changed.fingerprint(), reference);

        let mut changed = base.clone();
        changed.metric = "app_submit_count".to_string();
        assert_ne!(changed.fingerprint(), reference);

        let mut changed = base.clone();
        changed.date_field = "app_date".to_string();
        assert_ne!(changed.fingerprint(), reference);

        let mut changed = base.clone();
        changed.window = TimeWindow::Last7d;
        assert_ne!(changed.fingerprint(), reference);

        let mut changed = base.clone();
        changed.granularity = Granularity::Weekly;
        assert_ne!(changed.fingerprint(), reference);

        let mut changed = base.clone();
        changed
            .segments
            .insert(SegmentField::Channel, SegmentValue::Member("Email".into()));
        assert_ne!(changed.fingerprint(), reference);

        let mut changed = base.clone();
        changed.chart = ChartKind::Bar;
        assert_ne!(changed.fingerprint(), reference);
    }

    #[test]
    fn all_sentinel_differs_from_member_value() {
        let mut plan_all = base_plan();
        plan_all.segments.insert(SegmentField::Channel, SegmentValue::All);

        let mut plan_member = base_plan();
        plan_member
            .segments
            .insert(SegmentField::Channel, SegmentValue::Member("ALL2".into()));

        assert_ne!(plan_all.fingerprint(), plan_member.fingerprint());
    }

    #[test]
    fn hex_rendering_is_64_chars() {
        let fp = base_plan().fingerprint();
        let hex = fp.as_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(fp.to_string(), hex);
    }
}
