//! Migration blocker detectors - pure functions over collected metadata
//! Each detector walks its input in order, so output order follows the scan.

use crate::types::{
    BlockerKind, MigrationBlocker, ObjectMetadata, ProfileMetadata, ScanOutput, Severity,
    TriggerMetadata, ValidationRuleMetadata, FlowMetadata,
};
use std::collections::{HashMap, HashSet};

pub const AUTOMATION_DENSITY_THRESHOLD: usize = 10;
pub const AUTOMATION_DENSITY_HIGH: usize = 20;
pub const LARGE_OBJECT_THRESHOLD: u64 = 100_000;
pub const LARGE_OBJECT_HIGH: u64 = 1_000_000;
pub const LICENSE_TYPE_THRESHOLD: usize = 3;

/// Run every detector against a collected scan.
pub fn detect_all(scan: &ScanOutput) -> Vec<MigrationBlocker> {
    let mut blockers = detect_autonumber(&scan.objects);
    blockers.extend(detect_automation_density(&scan.flows, &scan.triggers, &scan.validation_rules));
    blockers.extend(detect_large_objects(&scan.objects));
    blockers.extend(detect_profile_mismatch(&scan.profiles));
    blockers
}

/// Objects with autonumber fields and existing records.
pub fn detect_autonumber(objects: &[ObjectMetadata]) -> Vec<MigrationBlocker> {
    objects
        .iter()
        .filter(|obj| obj.record_count > 0)
        .filter_map(|obj| {
            let autonumber_fields = obj
                .fields
                .iter()
                .filter(|field| field.field_type == "autonumber")
                .count();
            if autonumber_fields == 0 {
                return None;
            }
            Some(MigrationBlocker {
                kind: BlockerKind::Autonumber,
                severity: Severity::High,
                object: Some(obj.name.clone()),
                message: format!(
                    "Object {} has {} autonumber field(s) with {} existing records. Autonumber sequences cannot be preserved during migration.",
                    obj.label, autonumber_fields, obj.record_count
                ),
                recommendation: "Consider using external ID fields or custom numbering logic. Plan for data migration strategy that handles autonumber field values.".to_string(),
            })
        })
        .collect()
}

#[derive(Default)]
struct AutomationCounts {
    triggers: usize,
    rules: usize,
}

/// Objects carrying more than ten triggers plus validation rules.
///
/// Flows are accepted but not attributed to any object, so they never
/// contribute to the count.
pub fn detect_automation_density(
    _flows: &[FlowMetadata],
    triggers: &[TriggerMetadata],
    validation_rules: &[ValidationRuleMetadata],
) -> Vec<MigrationBlocker> {
    // First-seen order, so output is stable across runs.
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, AutomationCounts> = HashMap::new();

    let tagged = triggers
        .iter()
        .map(|t| (t.object.as_str(), true))
        .chain(validation_rules.iter().map(|r| (r.object.as_str(), false)));
    for (object, is_trigger) in tagged {
        let entry = counts.entry(object).or_insert_with(|| {
            order.push(object);
            AutomationCounts::default()
        });
        if is_trigger {
            entry.triggers += 1;
        } else {
            entry.rules += 1;
        }
    }

    order
        .into_iter()
        .filter_map(|object| {
            let c = &counts[object];
            let total = c.triggers + c.rules;
            if total <= AUTOMATION_DENSITY_THRESHOLD {
                return None;
            }
            Some(MigrationBlocker {
                kind: BlockerKind::AutomationDensity,
                severity: if total > AUTOMATION_DENSITY_HIGH { Severity::High } else { Severity::Medium },
                object: Some(object.to_string()),
                message: format!(
                    "Object {} has high automation density: {} triggers, {} validation rules.",
                    object, c.triggers, c.rules
                ),
                recommendation: "Review automation logic for consolidation opportunities. High automation density can cause performance issues and maintenance challenges.".to_string(),
            })
        })
        .collect()
}

/// Objects holding more than 100,000 records.
pub fn detect_large_objects(objects: &[ObjectMetadata]) -> Vec<MigrationBlocker> {
    objects
        .iter()
        .filter(|obj| obj.record_count > LARGE_OBJECT_THRESHOLD)
        .map(|obj| MigrationBlocker {
            kind: BlockerKind::LargeObject,
            severity: if obj.record_count > LARGE_OBJECT_HIGH { Severity::High } else { Severity::Medium },
            object: Some(obj.name.clone()),
            message: format!(
                "Object {} contains {} records, exceeding migration threshold.",
                obj.label,
                group_thousands(obj.record_count)
            ),
            recommendation: "Plan for data migration strategy including data extraction, transformation, and loading. Consider data archiving or purging strategies. Estimate migration time and resource requirements.".to_string(),
        })
        .collect()
}

/// One org-level blocker when profiles span more than three license types.
pub fn detect_profile_mismatch(profiles: &[ProfileMetadata]) -> Vec<MigrationBlocker> {
    let license_types: HashSet<&str> = profiles.iter().map(|p| p.user_license.as_str()).collect();
    if license_types.len() <= LICENSE_TYPE_THRESHOLD {
        return Vec::new();
    }

    vec![MigrationBlocker {
        kind: BlockerKind::ProfileMismatch,
        severity: Severity::Medium,
        object: None,
        message: format!(
            "Organization uses {} different license types. Profile migration may require mapping and validation.",
            license_types.len()
        ),
        recommendation: "Document license type mappings. Ensure target org has equivalent licenses. Plan for profile consolidation or splitting strategy.".to_string(),
    }]
}

/// 1234567 -> "1,234,567"
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
