//! Objects, fields, relationships, picklists and record types

use super::{fail_soft, flag, isolate, text, text_or, CollectorContext};
use crate::error::{ApiError, ApiResult, ScanResult};
use crate::types::{FieldMetadata, ObjectMetadata, PicklistMap, RecordTypeMap, RelationshipMetadata};
use serde_json::Value;

const RECORD_TYPES_SOQL: &str = "SELECT SobjectType, DeveloperName FROM RecordType WHERE IsActive = true";

/// Describe every discovered object (up to the configured limit) and count its records.
///
/// An object that cannot be described is skipped; an object that cannot be
/// counted keeps a record count of zero.
pub async fn scan_schema(ctx: &CollectorContext<'_>) -> ScanResult<Vec<ObjectMetadata>> {
    ctx.checkpoint()?;
    ctx.report("Discovering objects...");
    fail_soft("schema", collect_objects(ctx).await)
}

async fn collect_objects(ctx: &CollectorContext<'_>) -> ApiResult<Vec<ObjectMetadata>> {
    let names = ctx.client.describe_global(ctx.cancel).await?;
    let total = names.len().min(ctx.limits.schema_objects);
    let mut objects = Vec::with_capacity(total);

    for (i, name) in names.iter().take(total).enumerate() {
        ctx.ensure_active()?;
        ctx.report(&format!("Describing {} ({}/{})", name, i + 1, total));

        if let Some(object) = isolate(describe_object(ctx, name).await, "schema", name)? {
            objects.push(object);
        }
    }

    tracing::debug!(discovered = names.len(), described = objects.len(), "Schema scan finished");
    Ok(objects)
}

async fn describe_object(ctx: &CollectorContext<'_>, name: &str) -> ApiResult<ObjectMetadata> {
    let describe = ctx.client.describe_sobject(name, ctx.cancel).await?;

    ctx.ensure_active()?;
    let soql = format!("SELECT COUNT() FROM {}", name);
    let record_count = match ctx.client.count(&soql, ctx.cancel).await {
        Ok(count) => count,
        Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
        Err(error) => {
            // Some objects are not queryable.
            tracing::debug!(object = name, error = %error, "Could not count records");
            0
        }
    };

    Ok(object_from_describe(name, &describe, record_count))
}

pub(crate) fn object_from_describe(name: &str, describe: &Value, record_count: u64) -> ObjectMetadata {
    let fields = describe
        .get("fields")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().map(field_from_describe).collect())
        .unwrap_or_default();

    let relationships = describe
        .get("childRelationships")
        .and_then(Value::as_array)
        .map(|rels| {
            rels.iter()
                .map(|rel| RelationshipMetadata {
                    name: text_or(rel, &["relationshipName"], ""),
                    relationship_type: "child".to_string(),
                    child_object: text_or(rel, &["childSObject"], ""),
                    field: text_or(rel, &["field"], ""),
                })
                .collect()
        })
        .unwrap_or_default();

    ObjectMetadata {
        name: name.to_string(),
        label: text_or(describe, &["label"], name),
        key_prefix: text_or(describe, &["keyPrefix"], ""),
        record_count,
        fields,
        relationships,
    }
}

fn field_from_describe(field: &Value) -> FieldMetadata {
    // `nillable` missing means the API did not say, which is not "required".
    let nillable = field.get("nillable").and_then(Value::as_bool).unwrap_or(true);
    let defaulted = field.get("defaultedOnCreate").and_then(Value::as_bool);

    FieldMetadata {
        name: text_or(field, &["name"], ""),
        label: text_or(field, &["label"], ""),
        field_type: text_or(field, &["type"], ""),
        required: !nillable && defaulted == Some(false),
        unique: flag(field, "unique") || flag(field, "externalId"),
        lookup_target: field
            .get("referenceTo")
            .and_then(Value::as_array)
            .and_then(|targets| targets.first())
            .and_then(Value::as_str)
            .map(str::to_string),
        picklist_values: picklist_values(field),
    }
}

fn picklist_values(field: &Value) -> Option<Vec<String>> {
    field.get("picklistValues").and_then(Value::as_array).map(|values| {
        values
            .iter()
            .filter_map(|pv| text(pv, "value"))
            .collect()
    })
}

/// `Object.field` -> values for every picklist field of the first objects.
pub async fn scan_picklists(ctx: &CollectorContext<'_>) -> ScanResult<PicklistMap> {
    ctx.checkpoint()?;
    ctx.report("Scanning picklists...");
    fail_soft("picklists", collect_picklists(ctx).await)
}

async fn collect_picklists(ctx: &CollectorContext<'_>) -> ApiResult<PicklistMap> {
    let names = ctx.client.describe_global(ctx.cancel).await?;
    let mut picklists = PicklistMap::new();

    for name in names.iter().take(ctx.limits.picklist_objects) {
        ctx.ensure_active()?;
        ctx.report(&format!("Reading picklists on {}", name));

        let Some(describe) = isolate(ctx.client.describe_sobject(name, ctx.cancel).await, "picklists", name)? else {
            continue;
        };
        let fields = describe.get("fields").and_then(Value::as_array);
        for field in fields.into_iter().flatten() {
            if field.get("type").and_then(Value::as_str) != Some("picklist") {
                continue;
            }
            if let (Some(field_name), Some(values)) = (text(field, "name"), picklist_values(field)) {
                picklists.insert(format!("{}.{}", name, field_name), values);
            }
        }
    }

    Ok(picklists)
}

/// sObject type -> active record type developer names.
pub async fn scan_record_types(ctx: &CollectorContext<'_>) -> ScanResult<RecordTypeMap> {
    ctx.checkpoint()?;
    ctx.report("Scanning record types...");
    fail_soft("record_types", collect_record_types(ctx).await)
}

async fn collect_record_types(ctx: &CollectorContext<'_>) -> ApiResult<RecordTypeMap> {
    let rows = ctx.client.query(RECORD_TYPES_SOQL, ctx.cancel).await?;
    let mut record_types = RecordTypeMap::new();
    for row in &rows {
        let (Some(object), Some(name)) = (text(row, "SobjectType"), text(row, "DeveloperName")) else {
            continue;
        };
        record_types.entry(object).or_default().push(name);
    }
    Ok(record_types)
}
