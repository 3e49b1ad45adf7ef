//! Profiles, permission sets, roles, queues and sharing rules

use super::{fail_soft, isolate, soql_literal, text, text_at, text_or, CollectorContext};
use crate::error::{ApiError, ApiResult, ScanResult};
use crate::types::{
    PermissionSetMetadata, ProfileMetadata, QueueMetadata, RoleMetadata, SharingRuleMetadata,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

const PROFILES_SOQL: &str =
    "SELECT Id, Name, UserLicenseId, UserLicense.Name FROM Profile WHERE UserType = 'Standard'";
const PERMISSION_SETS_SOQL: &str =
    "SELECT Id, Name, Label, Description, License.Name FROM PermissionSet WHERE IsOwnedByProfile = false";
const PERMISSION_SET_ASSIGNMENTS_SOQL: &str =
    "SELECT PermissionSetId, COUNT(Id) total FROM PermissionSetAssignment GROUP BY PermissionSetId";
const ROLES_SOQL: &str = "SELECT Id, Name, ParentRoleId FROM UserRole";
const QUEUES_SOQL: &str = "SELECT Id, Name, SObjectType FROM Group WHERE Type = 'Queue'";

/// Metadata types listed for sharing rules, with the rule type they map to.
const SHARING_RULE_TYPES: [(&str, &str); 2] = [
    ("SharingCriteriaRule", "criteria"),
    ("SharingOwnerRule", "owner"),
];

pub async fn scan_profiles(ctx: &CollectorContext<'_>) -> ScanResult<Vec<ProfileMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning profiles...");
    fail_soft("profiles", collect_profiles(ctx).await)
}

async fn collect_profiles(ctx: &CollectorContext<'_>) -> ApiResult<Vec<ProfileMetadata>> {
    let rows = ctx.client.query(PROFILES_SOQL, ctx.cancel).await?;
    Ok(rows
        .iter()
        .map(|row| ProfileMetadata {
            id: text_or(row, &["Id"], ""),
            name: text_or(row, &["Name"], ""),
            user_license: text_at(row, "/UserLicense/Name")
                .or_else(|| text(row, "UserLicenseId"))
                .unwrap_or_else(|| "Unknown".to_string()),
            object_permissions: BTreeMap::new(),
        })
        .collect())
}

pub async fn scan_permission_sets(ctx: &CollectorContext<'_>) -> ScanResult<Vec<PermissionSetMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning permission sets...");
    fail_soft("permission_sets", collect_permission_sets(ctx).await)
}

async fn collect_permission_sets(ctx: &CollectorContext<'_>) -> ApiResult<Vec<PermissionSetMetadata>> {
    let rows = ctx.client.query(PERMISSION_SETS_SOQL, ctx.cancel).await?;

    ctx.ensure_active()?;
    let assignments = isolate(
        ctx.client.query(PERMISSION_SET_ASSIGNMENTS_SOQL, ctx.cancel).await,
        "permission_sets",
        "assignments",
    )?
    .unwrap_or_default();

    let counts: HashMap<String, u64> = assignments
        .iter()
        .filter_map(|row| {
            let id = text(row, "PermissionSetId")?;
            let total = row.get("total").or_else(|| row.get("expr0")).and_then(Value::as_u64)?;
            Some((id, total))
        })
        .collect();

    Ok(rows
        .iter()
        .map(|row| {
            let id = text_or(row, &["Id"], "");
            PermissionSetMetadata {
                user_count: counts.get(&id).copied().unwrap_or(0),
                name: text_or(row, &["Name"], ""),
                label: text_or(row, &["Label", "Name"], ""),
                description: text(row, "Description"),
                license: text_at(row, "/License/Name"),
                id,
            }
        })
        .collect())
}

/// Roles with the number of active users assigned to each.
pub async fn scan_roles(ctx: &CollectorContext<'_>) -> ScanResult<Vec<RoleMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning roles...");
    fail_soft("roles", collect_roles(ctx).await)
}

async fn collect_roles(ctx: &CollectorContext<'_>) -> ApiResult<Vec<RoleMetadata>> {
    let rows = ctx.client.query(ROLES_SOQL, ctx.cancel).await?;
    let mut roles = Vec::with_capacity(rows.len());

    for row in &rows {
        let Some(id) = text(row, "Id") else { continue };
        let name = text_or(row, &["Name"], "");

        ctx.ensure_active()?;
        ctx.report(&format!("Counting users in role {}", name));
        let soql = format!(
            "SELECT COUNT() FROM User WHERE UserRoleId = '{}' AND IsActive = true",
            soql_literal(&id)
        );
        let Some(user_count) = isolate(ctx.client.count(&soql, ctx.cancel).await, "roles", &name)? else {
            continue;
        };

        roles.push(RoleMetadata {
            id,
            name,
            parent_role: text(row, "ParentRoleId"),
            user_count,
        });
    }

    Ok(roles)
}

/// Queues with their member counts.
pub async fn scan_queues(ctx: &CollectorContext<'_>) -> ScanResult<Vec<QueueMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning queues...");
    fail_soft("queues", collect_queues(ctx).await)
}

async fn collect_queues(ctx: &CollectorContext<'_>) -> ApiResult<Vec<QueueMetadata>> {
    let rows = ctx.client.query(QUEUES_SOQL, ctx.cancel).await?;
    let mut queues = Vec::with_capacity(rows.len());

    for row in &rows {
        let Some(id) = text(row, "Id") else { continue };
        let name = text_or(row, &["Name"], "");

        ctx.ensure_active()?;
        let soql = format!("SELECT COUNT() FROM GroupMember WHERE GroupId = '{}'", soql_literal(&id));
        let Some(member_count) = isolate(ctx.client.count(&soql, ctx.cancel).await, "queues", &name)? else {
            continue;
        };

        queues.push(QueueMetadata {
            id,
            name,
            object_type: text_or(row, &["SObjectType"], "All"),
            member_count,
        });
    }

    Ok(queues)
}

/// Criteria and owner sharing rules from the metadata listing.
pub async fn scan_sharing_rules(ctx: &CollectorContext<'_>) -> ScanResult<Vec<SharingRuleMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning sharing rules...");
    fail_soft("sharing_rules", collect_sharing_rules(ctx).await)
}

async fn collect_sharing_rules(ctx: &CollectorContext<'_>) -> ApiResult<Vec<SharingRuleMetadata>> {
    let mut rules = Vec::new();

    for (metadata_type, rule_type) in SHARING_RULE_TYPES {
        ctx.ensure_active()?;
        let listed = match ctx.client.list_metadata(metadata_type, ctx.cancel).await {
            Ok(listed) => listed,
            Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
            Err(error) => {
                tracing::warn!(metadata_type, error = %error, "Metadata listing failed");
                continue;
            }
        };
        rules.extend(listed.iter().filter_map(|item| sharing_rule_from_listing(item, rule_type)));
    }

    Ok(rules)
}

/// Listing entries are named `Object.RuleName`.
fn sharing_rule_from_listing(item: &Value, rule_type: &str) -> Option<SharingRuleMetadata> {
    let full_name = text(item, "fullName").or_else(|| text(item, "FullName"))?;
    let (object, name) = full_name.split_once('.')?;
    Some(SharingRuleMetadata {
        name: name.to_string(),
        object: object.to_string(),
        rule_type: rule_type.to_string(),
        criteria: text(item, "criteria"),
    })
}
