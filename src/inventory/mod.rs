//! Collectors - one per category of org metadata
//!
//! Every collector checks cancellation on entry and before each remote call.
//! Cancellation is the only error that leaves a collector; anything else is
//! logged and replaced by the collector's empty value.

pub mod automation;
pub mod org;
pub mod ownership;
pub mod reporting;
pub mod schema;

use crate::config::ScanLimits;
use crate::error::{ApiError, ApiResult, ScanError, ScanResult};
use crate::salesforce::SalesforceClient;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Callback receiving a human-readable description of the current item.
pub type ItemCallback<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Everything a collector needs for one run.
#[derive(Clone, Copy)]
pub struct CollectorContext<'a> {
    pub client: &'a SalesforceClient,
    pub cancel: &'a CancellationToken,
    pub limits: ScanLimits,
    on_item: Option<&'a ItemCallback<'a>>,
}

impl<'a> CollectorContext<'a> {
    pub fn new(client: &'a SalesforceClient, cancel: &'a CancellationToken, limits: ScanLimits) -> Self {
        Self {
            client,
            cancel,
            limits,
            on_item: None,
        }
    }

    pub fn with_item_callback(mut self, on_item: &'a ItemCallback<'a>) -> Self {
        self.on_item = Some(on_item);
        self
    }

    pub fn report(&self, item: &str) {
        if let Some(on_item) = self.on_item {
            on_item(item);
        }
    }

    /// Collector entry check.
    pub fn checkpoint(&self) -> ScanResult<()> {
        if self.cancel.is_cancelled() {
            Err(ScanError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// In-loop check, before each per-item remote call.
    pub fn ensure_active(&self) -> ApiResult<()> {
        crate::salesforce::ensure_active(self.cancel)
    }
}

/// Turn a collector body's outcome into the collector's result.
pub(crate) fn fail_soft<T: Default>(collector: &'static str, result: ApiResult<T>) -> ScanResult<T> {
    match result {
        Ok(value) => Ok(value),
        Err(ApiError::Cancelled) => Err(ScanError::Cancelled),
        Err(error) => {
            tracing::warn!(collector, error = %error, "Collector failed, using empty result");
            Ok(T::default())
        }
    }
}

/// Keep a per-item failure local to that item.
pub(crate) fn isolate<T>(result: ApiResult<T>, collector: &'static str, item: &str) -> ApiResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
        Err(error) => {
            tracing::debug!(collector, item, error = %error, "Item failed, skipping");
            Ok(None)
        }
    }
}

// ============================================
// RECORD FIELD ACCESS
// ============================================

/// Non-empty string at `key`.
pub(crate) fn text(record: &Value, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First non-empty string among `keys`, else `default`.
pub(crate) fn text_or(record: &Value, keys: &[&str], default: &str) -> String {
    keys.iter()
        .find_map(|key| text(record, key))
        .unwrap_or_else(|| default.to_string())
}

/// Non-empty string at a JSON pointer such as `/EntityDefinition/QualifiedApiName`.
pub(crate) fn text_at(record: &Value, pointer: &str) -> Option<String> {
    record
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn int_or(record: &Value, key: &str, default: i64) -> i64 {
    record
        .get(key)
        .and_then(Value::as_i64)
        .filter(|n| *n != 0)
        .unwrap_or(default)
}

pub(crate) fn flag(record: &Value, key: &str) -> bool {
    record.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Quote a record id for use inside a SOQL literal.
pub(crate) fn soql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fail_soft_absorbs_everything_but_cancellation() {
        let absorbed: ScanResult<Vec<u8>> = fail_soft(
            "test",
            Err(ApiError::Remote {
                status: 500,
                body: "boom".into(),
            }),
        );
        assert_eq!(absorbed, Ok(Vec::new()));

        let cancelled: ScanResult<Vec<u8>> = fail_soft("test", Err(ApiError::Cancelled));
        assert_eq!(cancelled, Err(ScanError::Cancelled));
    }

    #[test]
    fn isolate_skips_failed_items() {
        let skipped = isolate::<u64>(Err(ApiError::Malformed("x".into())), "test", "Account").unwrap();
        assert_eq!(skipped, None);
        assert!(isolate::<u64>(Err(ApiError::Cancelled), "test", "Account").is_err());
    }

    #[test]
    fn field_helpers_apply_fallbacks() {
        let record = json!({"Name": "", "Label": "Shown", "Version": 0, "Nested": {"Api": "Obj"}});
        assert_eq!(text_or(&record, &["Name", "Label"], "x"), "Shown");
        assert_eq!(int_or(&record, "Version", 1), 1);
        assert_eq!(text_at(&record, "/Nested/Api").as_deref(), Some("Obj"));
        assert_eq!(soql_literal("O'Brien"), "O\\'Brien");
    }
}
