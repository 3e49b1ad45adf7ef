//! Flows, Apex triggers and validation rules (Tooling API)

use super::{fail_soft, int_or, text, text_at, text_or, CollectorContext};
use crate::error::{ApiResult, ScanResult};
use crate::types::{FlowMetadata, TriggerMetadata, ValidationRuleMetadata};
use serde_json::Value;

const FLOWS_SOQL: &str =
    "SELECT Id, MasterLabel, DeveloperName, Status, VersionNumber FROM Flow WHERE IsActive = true";
const TRIGGERS_SOQL: &str =
    "SELECT Name, TableEnumOrId, Status, BodyLength FROM ApexTrigger WHERE Status = 'Active'";
const VALIDATION_RULES_SOQL: &str = "SELECT DeveloperName, EntityDefinition.QualifiedApiName, ValidationName, Active, ErrorMessage FROM ValidationRule WHERE Active = true";

pub async fn scan_flows(ctx: &CollectorContext<'_>) -> ScanResult<Vec<FlowMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning flows...");
    fail_soft("flows", collect(ctx, FLOWS_SOQL, flow_from_record).await)
}

pub async fn scan_triggers(ctx: &CollectorContext<'_>) -> ScanResult<Vec<TriggerMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning Apex triggers...");
    fail_soft("triggers", collect(ctx, TRIGGERS_SOQL, trigger_from_record).await)
}

pub async fn scan_validation_rules(ctx: &CollectorContext<'_>) -> ScanResult<Vec<ValidationRuleMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Scanning validation rules...");
    fail_soft(
        "validation_rules",
        collect(ctx, VALIDATION_RULES_SOQL, validation_rule_from_record).await,
    )
}

async fn collect<T>(ctx: &CollectorContext<'_>, soql: &str, map: impl Fn(&Value) -> T) -> ApiResult<Vec<T>> {
    let rows = ctx.client.tooling_query(soql, ctx.cancel).await?;
    Ok(rows.iter().map(map).collect())
}

fn flow_from_record(record: &Value) -> FlowMetadata {
    FlowMetadata {
        id: text_or(record, &["Id"], ""),
        name: text_or(record, &["DeveloperName", "MasterLabel"], ""),
        label: text_or(record, &["MasterLabel", "DeveloperName"], ""),
        status: text_or(record, &["Status"], "Unknown"),
        version: int_or(record, "VersionNumber", 1),
    }
}

fn trigger_from_record(record: &Value) -> TriggerMetadata {
    TriggerMetadata {
        name: text_or(record, &["Name"], ""),
        object: text_or(record, &["TableEnumOrId"], ""),
        status: text_or(record, &["Status"], "Active"),
        body_length: int_or(record, "BodyLength", 0),
    }
}

fn validation_rule_from_record(record: &Value) -> ValidationRuleMetadata {
    ValidationRuleMetadata {
        name: text_or(record, &["DeveloperName", "ValidationName"], ""),
        object: text_at(record, "/EntityDefinition/QualifiedApiName").unwrap_or_else(|| "Unknown".to_string()),
        active: record.get("Active").and_then(Value::as_bool) != Some(false),
        error_message: text(record, "ErrorMessage").unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanLimits;
    use crate::salesforce::testing::{healthy_org, records_page, FakeTransport};
    use serde_json::json;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn maps_automation_records() {
        let fake = Arc::new(healthy_org());
        let client = fake.client();
        let cancel = CancellationToken::new();
        let ctx = CollectorContext::new(&client, &cancel, ScanLimits::default());

        let flows = scan_flows(&ctx).await.unwrap();
        assert_eq!(flows[0].name, "Lead_Router");
        assert_eq!(flows[0].version, 3);

        let triggers = scan_triggers(&ctx).await.unwrap();
        assert_eq!(triggers[0].object, "Account");

        let rules = scan_validation_rules(&ctx).await.unwrap();
        assert_eq!(rules[0].object, "Account");
        assert!(rules[0].active);

        assert!(fake.calls().iter().all(|c| c.contains("/tooling/query")));
    }

    #[tokio::test]
    async fn missing_fields_fall_back() {
        let fake = Arc::new(
            FakeTransport::new()
                .respond("FROM Flow", records_page(vec![json!({"Id": "301", "MasterLabel": "Only Label"})]))
                .respond("FROM ValidationRule", records_page(vec![json!({"ValidationName": "Legacy"})])),
        );
        let client = fake.client();
        let cancel = CancellationToken::new();
        let ctx = CollectorContext::new(&client, &cancel, ScanLimits::default());

        let flows = scan_flows(&ctx).await.unwrap();
        let flow = &flows[0];
        assert_eq!(flow.name, "Only Label");
        assert_eq!(flow.status, "Unknown");
        assert_eq!(flow.version, 1);

        let rules = scan_validation_rules(&ctx).await.unwrap();
        let rule = &rules[0];
        assert_eq!(rule.name, "Legacy");
        assert_eq!(rule.object, "Unknown");
        assert!(rule.active);
    }

    #[tokio::test]
    async fn failures_yield_empty_lists() {
        let fake = Arc::new(FakeTransport::new().fail("FROM", 500, "boom"));
        let client = fake.client();
        let cancel = CancellationToken::new();
        let ctx = CollectorContext::new(&client, &cancel, ScanLimits::default());

        assert_eq!(scan_flows(&ctx).await, Ok(Vec::new()));
        assert_eq!(scan_triggers(&ctx).await, Ok(Vec::new()));
        assert_eq!(scan_validation_rules(&ctx).await, Ok(Vec::new()));
    }
}
