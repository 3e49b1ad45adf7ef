//! Org identity, limits, licenses and user count

use super::{int_or, text, text_or, CollectorContext};
use crate::error::{ApiError, ApiResult, ScanError, ScanResult};
use crate::types::{LicenseUsage, LimitUsage, OrgInfo};
use serde_json::Value;
use std::collections::BTreeMap;

const ORGANIZATION_SOQL: &str = "SELECT Id, Name, OrganizationType, InstanceName FROM Organization LIMIT 1";
const ORG_ID_SOQL: &str = "SELECT Id FROM Organization LIMIT 1";
const ACTIVE_USERS_SOQL: &str = "SELECT COUNT() FROM User WHERE IsActive = true";
const LICENSES_SOQL: &str =
    "SELECT Id, Name, Status, UsedLicenses, TotalLicenses FROM UserLicense WHERE Status = 'Active'";

/// Collect org-level information.
///
/// Unlike every other collector this one can fail the scan: without the
/// Organization record there is nothing to attach the inventory to.
pub async fn scan_org_info(ctx: &CollectorContext<'_>) -> ScanResult<OrgInfo> {
    ctx.checkpoint()?;
    ctx.report("Retrieving organization information...");

    match collect(ctx).await {
        Ok(info) => Ok(info),
        Err(ApiError::Cancelled) => Err(ScanError::Cancelled),
        Err(error) => {
            tracing::error!(error = %error, "Failed to scan org info");
            Err(ScanError::NonRecoverable(error.to_string()))
        }
    }
}

async fn collect(ctx: &CollectorContext<'_>) -> ApiResult<OrgInfo> {
    let mut org_id = identity_org_id(ctx).await?;

    let rows = ctx.client.query(ORGANIZATION_SOQL, ctx.cancel).await?;
    let org = rows
        .first()
        .ok_or_else(|| ApiError::Malformed("Organization query returned no rows".into()))?;

    if org_id.is_none() {
        org_id = text(org, "Id");
    }
    let org_name = text(org, "Name");
    let organization_type = text_or(org, &["OrganizationType"], "Unknown");
    let instance_name = text(org, "InstanceName")
        .or_else(|| org_name.clone())
        .unwrap_or_else(|| "Unknown".to_string());

    tracing::info!(
        org_id = org_id.as_deref().unwrap_or(""),
        organization_type = %organization_type,
        instance_name = %instance_name,
        "Organization details retrieved"
    );

    let (limits, edition) = limits_and_edition(ctx).await?;
    let direct_count = active_user_count(ctx).await?;
    let licenses = licenses(ctx).await?;
    let user_count = if direct_count > 0 {
        direct_count
    } else {
        licensed_user_estimate(&licenses)
    };

    if org_id.is_none() {
        tracing::warn!("No organization ID found from any source");
    }

    Ok(OrgInfo {
        id: org_id.unwrap_or_else(|| "Unknown".to_string()),
        organization_type,
        edition,
        instance_name,
        limits,
        licenses,
        user_count,
    })
}

/// Org id from the identity endpoint, falling back to a plain query.
async fn identity_org_id(ctx: &CollectorContext<'_>) -> ApiResult<Option<String>> {
    match ctx.client.user_info(ctx.cancel).await {
        Ok(identity) => {
            if let Some(id) = text(&identity, "organization_id").or_else(|| text(&identity, "organizationId")) {
                tracing::info!(org_id = %id, "Got org ID from identity endpoint");
                return Ok(Some(id));
            }
        }
        Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
        Err(error) => tracing::warn!(error = %error, "Failed to get org ID from identity endpoint"),
    }

    match ctx.client.query(ORG_ID_SOQL, ctx.cancel).await {
        Ok(rows) => Ok(rows.first().and_then(|row| text(row, "Id"))),
        Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
        Err(error) => {
            tracing::warn!(error = %error, "Failed to get org ID from query");
            Ok(None)
        }
    }
}

async fn limits_and_edition(ctx: &CollectorContext<'_>) -> ApiResult<(BTreeMap<String, LimitUsage>, String)> {
    let response = match ctx.client.get("/limits", ctx.cancel).await {
        Ok(response) => response,
        Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
        Err(error) => {
            tracing::warn!(error = %error, "Failed to retrieve limits");
            Value::Null
        }
    };
    Ok((normalize_limits(&response), infer_edition(&response)))
}

/// Edition is not queryable; guess it from which limits the org exposes.
fn infer_edition(limits: &Value) -> String {
    if limits.get("DailyWorkflowEmails").is_some() {
        "Enterprise or Higher".to_string()
    } else if limits.get("DailyApiRequests").is_some() {
        "Professional or Higher".to_string()
    } else {
        "Unknown".to_string()
    }
}

fn normalize_limits(response: &Value) -> BTreeMap<String, LimitUsage> {
    let Some(entries) = response.as_object() else {
        return BTreeMap::new();
    };
    entries
        .iter()
        .filter(|(_, value)| value.is_object())
        .map(|(name, value)| {
            let usage = LimitUsage {
                max: int_or(value, "Max", int_or(value, "max", 0)),
                remaining: int_or(value, "Remaining", int_or(value, "remaining", 0)),
            };
            (name.clone(), usage)
        })
        .collect()
}

async fn active_user_count(ctx: &CollectorContext<'_>) -> ApiResult<u64> {
    match ctx.client.count(ACTIVE_USERS_SOQL, ctx.cancel).await {
        Ok(count) => Ok(count),
        Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
        Err(error) => {
            tracing::warn!(error = %error, "Failed to retrieve user count");
            Ok(0)
        }
    }
}

async fn licenses(ctx: &CollectorContext<'_>) -> ApiResult<BTreeMap<String, LicenseUsage>> {
    let rows = match ctx.client.query(LICENSES_SOQL, ctx.cancel).await {
        Ok(rows) => rows,
        Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
        Err(error) => {
            tracing::warn!(error = %error, "Failed to retrieve license information");
            return Ok(BTreeMap::new());
        }
    };

    let mut licenses = BTreeMap::new();
    for row in &rows {
        // Unnamed licenses are keyed by a short id prefix.
        let name = text(row, "Name").or_else(|| {
            text(row, "Id").map(|id| format!("License-{}", id.chars().take(8).collect::<String>()))
        });
        if let Some(name) = name {
            licenses.insert(
                name,
                LicenseUsage {
                    total: int_or(row, "TotalLicenses", 0),
                    used: int_or(row, "UsedLicenses", 0),
                },
            );
        }
    }
    Ok(licenses)
}

/// Best-effort user count when the direct count comes back empty.
/// Users holding several licenses are counted once per license.
fn licensed_user_estimate(licenses: &BTreeMap<String, LicenseUsage>) -> u64 {
    licenses
        .values()
        .map(|license| license.used.max(0) as u64)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanLimits;
    use crate::salesforce::testing::{count_page, healthy_org, records_page, FakeTransport};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    async fn run(fake: FakeTransport) -> ScanResult<OrgInfo> {
        let fake = Arc::new(fake);
        let client = fake.client();
        let cancel = CancellationToken::new();
        let ctx = CollectorContext::new(&client, &cancel, ScanLimits::default());
        scan_org_info(&ctx).await
    }

    #[tokio::test]
    async fn collects_identity_limits_and_licenses() {
        let info = run(healthy_org()).await.unwrap();
        assert_eq!(info.id, "00D000000000001");
        assert_eq!(info.organization_type, "Enterprise Edition");
        assert_eq!(info.instance_name, "NA42");
        assert_eq!(info.edition, "Enterprise or Higher");
        assert_eq!(info.limits["DailyApiRequests"], LimitUsage { max: 5000, remaining: 4500 });
        assert_eq!(info.licenses["Salesforce"], LicenseUsage { total: 20, used: 10 });
        assert_eq!(info.user_count, 12);
    }

    #[tokio::test]
    async fn falls_back_to_query_id_and_license_sum() {
        let fake = FakeTransport::new()
            .fail("/services/oauth2/userinfo", 401, "expired")
            .respond(
                "FROM Organization LIMIT 1",
                records_page(vec![json!({"Id": "00DQUERY", "Name": "Acme"})]),
            )
            .respond("COUNT() FROM User", count_page(0))
            .respond(
                "FROM UserLicense",
                records_page(vec![
                    json!({"Name": "Salesforce", "UsedLicenses": 7, "TotalLicenses": 10}),
                    json!({"Id": "100000000XYZ", "UsedLicenses": 2, "TotalLicenses": 5}),
                ]),
            );

        let info = run(fake).await.unwrap();
        assert_eq!(info.id, "00DQUERY");
        assert_eq!(info.instance_name, "Acme");
        assert_eq!(info.organization_type, "Unknown");
        assert_eq!(info.edition, "Unknown");
        assert!(info.limits.is_empty());
        assert!(info.licenses.contains_key("License-10000000"));
        assert_eq!(info.user_count, 9);
    }

    #[tokio::test]
    async fn missing_organization_is_non_recoverable() {
        let fake = FakeTransport::new().fail("FROM Organization", 500, "down");
        let err = run(fake).await.unwrap_err();
        assert!(matches!(err, ScanError::NonRecoverable(_)));
    }

    #[tokio::test]
    async fn cancelled_before_entry() {
        let fake = Arc::new(healthy_org());
        let client = fake.client();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = CollectorContext::new(&client, &cancel, ScanLimits::default());

        assert_eq!(scan_org_info(&ctx).await, Err(ScanError::Cancelled));
        assert!(fake.calls().is_empty());
    }
}
