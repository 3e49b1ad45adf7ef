//! Reports, dashboards and page layouts

use super::{fail_soft, text, text_or, CollectorContext};
use crate::error::{ApiResult, ScanResult};
use crate::types::{DashboardMetadata, LayoutMetadata, ReportMetadata};

const REPORTS_SOQL: &str = "SELECT Id, Name, FolderName, Type FROM Report WHERE IsDeleted = false";
const DASHBOARDS_SOQL: &str = "SELECT Id, Title, FolderName FROM Dashboard WHERE IsDeleted = false";
const LAYOUTS_SOQL: &str = "SELECT FullName FROM Layout LIMIT 1000";

pub async fn scan_reports(ctx: &CollectorContext<'_>) -> ScanResult<Vec<ReportMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning reports...");
    fail_soft("reports", collect_reports(ctx).await)
}

async fn collect_reports(ctx: &CollectorContext<'_>) -> ApiResult<Vec<ReportMetadata>> {
    let rows = ctx.client.query(REPORTS_SOQL, ctx.cancel).await?;
    Ok(rows
        .iter()
        .map(|row| ReportMetadata {
            id: text_or(row, &["Id"], ""),
            name: text_or(row, &["Name"], ""),
            folder: text_or(row, &["FolderName"], "Unfiled Public Reports"),
            report_type: text_or(row, &["Type"], "Unknown"),
        })
        .collect())
}

pub async fn scan_dashboards(ctx: &CollectorContext<'_>) -> ScanResult<Vec<DashboardMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning dashboards...");
    fail_soft("dashboards", collect_dashboards(ctx).await)
}

async fn collect_dashboards(ctx: &CollectorContext<'_>) -> ApiResult<Vec<DashboardMetadata>> {
    let rows = ctx.client.query(DASHBOARDS_SOQL, ctx.cancel).await?;
    Ok(rows
        .iter()
        .map(|row| DashboardMetadata {
            id: text_or(row, &["Id"], ""),
            name: text_or(row, &["Title"], ""),
            folder: text_or(row, &["FolderName"], "Unfiled Public Dashboards"),
        })
        .collect())
}

pub async fn scan_layouts(ctx: &CollectorContext<'_>) -> ScanResult<Vec<LayoutMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning page layouts...");
    fail_soft("layouts", collect_layouts(ctx).await)
}

async fn collect_layouts(ctx: &CollectorContext<'_>) -> ApiResult<Vec<LayoutMetadata>> {
    let rows = ctx.client.tooling_query(LAYOUTS_SOQL, ctx.cancel).await?;
    Ok(rows
        .iter()
        .filter_map(|row| text(row, "FullName"))
        .filter_map(|full_name| parse_layout_name(&full_name))
        .collect())
}

/// `Object-Layout Name`, or `Object-RecordType-...-Layout Name` when a
/// record type is part of the name. Names without a dash are skipped.
fn parse_layout_name(full_name: &str) -> Option<LayoutMetadata> {
    let parts: Vec<&str> = full_name.split('-').collect();
    if parts.len() < 2 {
        tracing::debug!(layout = full_name, "Unrecognised layout name");
        return None;
    }

    let record_type = if parts.len() > 2 {
        Some(parts[1..parts.len() - 1].join("-"))
    } else {
        None
    };

    Some(LayoutMetadata {
        name: full_name.to_string(),
        object: parts[0].to_string(),
        record_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanLimits;
    use crate::salesforce::testing::{healthy_org, FakeTransport};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn layout_names_split_on_dashes() {
        let plain = parse_layout_name("Account-Account Layout").unwrap();
        assert_eq!(plain.object, "Account");
        assert_eq!(plain.record_type, None);

        let typed = parse_layout_name("Case-Support-Tier-2-Case Layout").unwrap();
        assert_eq!(typed.object, "Case");
        assert_eq!(typed.record_type.as_deref(), Some("Support-Tier-2"));

        assert!(parse_layout_name("NoDash").is_none());
    }

    #[tokio::test]
    async fn maps_reporting_records() {
        let fake = Arc::new(healthy_org());
        let client = fake.client();
        let cancel = CancellationToken::new();
        let ctx = CollectorContext::new(&client, &cancel, ScanLimits::default());

        let reports = scan_reports(&ctx).await.unwrap();
        assert_eq!(reports[0].folder, "Sales");
        assert_eq!(reports[0].report_type, "Opportunity");

        let dashboards = scan_dashboards(&ctx).await.unwrap();
        assert_eq!(dashboards[0].name, "Exec");
        assert_eq!(dashboards[0].folder, "Unfiled Public Dashboards");

        let layouts = scan_layouts(&ctx).await.unwrap();
        assert_eq!(layouts[0].object, "Account");
    }

    #[tokio::test]
    async fn failures_yield_empty_lists() {
        let fake = Arc::new(FakeTransport::new());
        let client = fake.client();
        let cancel = CancellationToken::new();
        let ctx = CollectorContext::new(&client, &cancel, ScanLimits::default());

        assert_eq!(scan_reports(&ctx).await, Ok(Vec::new()));
        assert_eq!(scan_dashboards(&ctx).await, Ok(Vec::new()));
        assert_eq!(scan_layouts(&ctx).await, Ok(Vec::new()));
    }
}
