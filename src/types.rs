//! Shared org metadata types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Keyed by `Object.field` and sObject type respectively; sorted for stable JSON.
pub type PicklistMap = BTreeMap<String, Vec<String>>;
pub type RecordTypeMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LimitUsage {
    pub max: i64,
    pub remaining: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LicenseUsage {
    pub total: i64,
    pub used: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgInfo {
    pub id: String,
    pub organization_type: String,
    pub edition: String,
    pub instance_name: String,
    pub limits: BTreeMap<String, LimitUsage>,
    pub licenses: BTreeMap<String, LicenseUsage>,
    pub user_count: u64,
}

// ============================================
// SCHEMA
// ============================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub name: String,
    pub label: String,
    pub key_prefix: String,
    pub record_count: u64,
    pub fields: Vec<FieldMetadata>,
    pub relationships: Vec<RelationshipMetadata>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picklist_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub child_object: String,
    pub field: String,
}

// ============================================
// AUTOMATION
// ============================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowMetadata {
    pub id: String,
    pub name: String,
    pub label: String,
    pub status: String,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMetadata {
    pub name: String,
    pub object: String,
    pub status: String,
    pub body_length: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRuleMetadata {
    pub name: String,
    pub object: String,
    pub active: bool,
    pub error_message: String,
}

// ============================================
// OWNERSHIP
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObjectPermission {
    pub read: bool,
    pub create: bool,
    pub edit: bool,
    pub delete: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub id: String,
    pub name: String,
    pub user_license: String,
    pub object_permissions: BTreeMap<String, ObjectPermission>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleMetadata {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_role: Option<String>,
    pub user_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetadata {
    pub id: String,
    pub name: String,
    pub object_type: String,
    pub member_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SharingRuleMetadata {
    pub name: String,
    pub object: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSetMetadata {
    pub id: String,
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub user_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
}

// ============================================
// REPORTING
// ============================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub id: String,
    pub name: String,
    pub folder: String,
    #[serde(rename = "type")]
    pub report_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardMetadata {
    pub id: String,
    pub name: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetadata {
    pub name: String,
    pub object: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_type: Option<String>,
}

// ============================================
// BLOCKERS
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    Autonumber,
    AutomationDensity,
    LargeObject,
    ProfileMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationBlocker {
    #[serde(rename = "type")]
    pub kind: BlockerKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    pub message: String,
    pub recommendation: String,
}

// ============================================
// SCAN
// ============================================

/// One progress report from a running scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub step: String,
    pub percent: u8,
    pub current_process: String,
}

/// The terminal aggregate of one scan. Every field is always present;
/// collectors that failed contribute their empty value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutput {
    pub org_info: OrgInfo,
    pub objects: Vec<ObjectMetadata>,
    pub picklists: PicklistMap,
    pub record_types: RecordTypeMap,
    pub flows: Vec<FlowMetadata>,
    pub triggers: Vec<TriggerMetadata>,
    pub validation_rules: Vec<ValidationRuleMetadata>,
    pub profiles: Vec<ProfileMetadata>,
    pub permission_sets: Vec<PermissionSetMetadata>,
    pub roles: Vec<RoleMetadata>,
    pub queues: Vec<QueueMetadata>,
    pub sharing_rules: Vec<SharingRuleMetadata>,
    pub reports: Vec<ReportMetadata>,
    pub dashboards: Vec<DashboardMetadata>,
    pub layouts: Vec<LayoutMetadata>,
    pub blockers: Vec<MigrationBlocker>,
    pub scanned_at: String,
    pub scan_duration: u64,
}
