//! Security overview - the access-control slice of a stored scan

use crate::types::{
    BlockerKind, MigrationBlocker, PermissionSetMetadata, ProfileMetadata, QueueMetadata, RoleMetadata,
    ScanOutput, SharingRuleMetadata,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityOverview {
    pub profiles: Vec<ProfileMetadata>,
    pub roles: Vec<RoleMetadata>,
    pub queues: Vec<QueueMetadata>,
    pub sharing_rules: Vec<SharingRuleMetadata>,
    pub permission_sets: Vec<PermissionSetMetadata>,
    /// Profile mismatch and automation density blockers only.
    pub blockers: Vec<MigrationBlocker>,
    pub stats: SecurityStats,
    pub scanned_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStats {
    pub total_profiles: usize,
    pub total_roles: usize,
    pub total_queues: usize,
    pub total_sharing_rules: usize,
    pub total_permission_sets: usize,
    pub total_users: u64,
    pub security_blockers: usize,
}

impl SecurityOverview {
    pub fn from_scan(scan: &ScanOutput) -> Self {
        let blockers: Vec<MigrationBlocker> = scan
            .blockers
            .iter()
            .filter(|b| matches!(b.kind, BlockerKind::ProfileMismatch | BlockerKind::AutomationDensity))
            .cloned()
            .collect();

        let stats = SecurityStats {
            total_profiles: scan.profiles.len(),
            total_roles: scan.roles.len(),
            total_queues: scan.queues.len(),
            total_sharing_rules: scan.sharing_rules.len(),
            total_permission_sets: scan.permission_sets.len(),
            total_users: scan.org_info.user_count,
            security_blockers: blockers.iter().filter(|b| b.kind == BlockerKind::ProfileMismatch).count(),
        };

        Self {
            profiles: scan.profiles.clone(),
            roles: scan.roles.clone(),
            queues: scan.queues.clone(),
            sharing_rules: scan.sharing_rules.clone(),
            permission_sets: scan.permission_sets.clone(),
            blockers,
            stats,
            scanned_at: scan.scanned_at.clone(),
        }
    }
}
