//! Scan-to-scan comparison

use crate::types::{ObjectMetadata, ScanOutput, Severity};
use serde::Serialize;
use std::collections::HashMap;

/// Objects listed in `topObjects` at most.
pub const TOP_OBJECTS_LIMIT: usize = 20;
/// Unchanged objects above this many records are still listed.
pub const LARGE_UNCHANGED_THRESHOLD: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanComparison {
    pub org_info: OrgInfoComparison,
    pub objects: CountDelta,
    pub flows: CountDelta,
    pub triggers: CountDelta,
    pub blockers: BlockerComparison,
    pub record_counts: RecordCountComparison,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgSnapshot {
    pub edition: String,
    pub user_count: u64,
    pub instance_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgChanges {
    pub user_count_delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrgInfoComparison {
    pub scan1: OrgSnapshot,
    pub scan2: OrgSnapshot,
    pub changes: OrgChanges,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountDelta {
    pub scan1: usize,
    pub scan2: usize,
    pub delta: i64,
}

impl CountDelta {
    fn of(scan1: usize, scan2: usize) -> Self {
        Self {
            scan1,
            scan2,
            delta: scan2 as i64 - scan1 as i64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub scan1: usize,
    pub scan2: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockerComparison {
    pub scan1: usize,
    pub scan2: usize,
    pub delta: i64,
    pub high_severity: SeverityCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectDelta {
    pub object: String,
    pub scan1: u64,
    pub scan2: u64,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCountComparison {
    pub top_objects: Vec<ObjectDelta>,
}

/// Compare an earlier scan (`first`) against a later one (`second`).
pub fn compare_scans(first: &ScanOutput, second: &ScanOutput) -> ScanComparison {
    let snapshot = |scan: &ScanOutput| OrgSnapshot {
        edition: scan.org_info.edition.clone(),
        user_count: scan.org_info.user_count,
        instance_name: scan.org_info.instance_name.clone(),
    };
    let high = |scan: &ScanOutput| scan.blockers.iter().filter(|b| b.severity == Severity::High).count();
    let blockers = CountDelta::of(first.blockers.len(), second.blockers.len());

    ScanComparison {
        org_info: OrgInfoComparison {
            scan1: snapshot(first),
            scan2: snapshot(second),
            changes: OrgChanges {
                user_count_delta: second.org_info.user_count as i64 - first.org_info.user_count as i64,
            },
        },
        objects: CountDelta::of(first.objects.len(), second.objects.len()),
        flows: CountDelta::of(first.flows.len(), second.flows.len()),
        triggers: CountDelta::of(first.triggers.len(), second.triggers.len()),
        blockers: BlockerComparison {
            scan1: blockers.scan1,
            scan2: blockers.scan2,
            delta: blockers.delta,
            high_severity: SeverityCounts {
                scan1: high(first),
                scan2: high(second),
            },
        },
        record_counts: RecordCountComparison {
            top_objects: compare_top_objects(&first.objects, &second.objects),
        },
    }
}

/// Objects whose record count changed, or that are large either way,
/// ordered by the size of the change.
fn compare_top_objects(first: &[ObjectMetadata], second: &[ObjectMetadata]) -> Vec<ObjectDelta> {
    let counts1: HashMap<&str, u64> = first.iter().map(|o| (o.name.as_str(), o.record_count)).collect();
    let counts2: HashMap<&str, u64> = second.iter().map(|o| (o.name.as_str(), o.record_count)).collect();

    let mut names: Vec<&str> = Vec::new();
    for name in first.iter().chain(second).map(|o| o.name.as_str()) {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    let mut changes: Vec<ObjectDelta> = names
        .into_iter()
        .filter_map(|name| {
            let scan1 = counts1.get(name).copied().unwrap_or(0);
            let scan2 = counts2.get(name).copied().unwrap_or(0);
            let delta = scan2 as i64 - scan1 as i64;
            (delta != 0 || scan1 > LARGE_UNCHANGED_THRESHOLD).then(|| ObjectDelta {
                object: name.to_string(),
                scan1,
                scan2,
                delta,
            })
        })
        .collect();

    // Stable, so ties keep first-seen order.
    changes.sort_by_key(|c| std::cmp::Reverse(c.delta.unsigned_abs()));
    changes.truncate(TOP_OBJECTS_LIMIT);
    changes
}
