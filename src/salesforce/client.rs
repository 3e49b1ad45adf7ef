//! Typed calls on top of a transport: queries, describes, listings

use super::transport::{ApiRequest, HttpTransport, Transport};
use super::SalesforceAuth;
use crate::error::{ApiError, ApiResult};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fail fast when the scan has been cancelled.
pub fn ensure_active(cancel: &CancellationToken) -> ApiResult<()> {
    if cancel.is_cancelled() {
        Err(ApiError::Cancelled)
    } else {
        Ok(())
    }
}

/// Client for one org session. Cheap to clone.
///
/// No call is retried here: a failure is returned to the collector, which
/// decides what an empty result looks like.
#[derive(Clone)]
pub struct SalesforceClient {
    transport: Arc<dyn Transport>,
    api_version: String,
}

impl SalesforceClient {
    pub fn new(transport: Arc<dyn Transport>, api_version: impl Into<String>) -> Self {
        Self {
            transport,
            api_version: api_version.into(),
        }
    }

    /// Build a client that talks HTTP to the org described by `auth`.
    pub fn connect(auth: SalesforceAuth, api_version: &str, timeout: Duration) -> ApiResult<Self> {
        let transport = HttpTransport::new(auth, timeout)?;
        Ok(Self::new(Arc::new(transport), api_version))
    }

    fn data_path(&self, endpoint: &str) -> String {
        format!("/services/data/{}{}", self.api_version, endpoint)
    }

    async fn send(&self, request: ApiRequest, cancel: &CancellationToken) -> ApiResult<Value> {
        ensure_active(cancel)?;
        self.transport.send(request, cancel).await
    }

    /// GET an endpoint under `/services/data/<version>`.
    pub async fn get(&self, endpoint: &str, cancel: &CancellationToken) -> ApiResult<Value> {
        self.send(ApiRequest::get(self.data_path(endpoint)), cancel).await
    }

    /// POST a JSON body to an endpoint under `/services/data/<version>`.
    pub async fn post(&self, endpoint: &str, body: Value, cancel: &CancellationToken) -> ApiResult<Value> {
        self.send(ApiRequest::post(self.data_path(endpoint), body), cancel).await
    }

    /// Run a SOQL query and return every record across all pages, in order.
    pub async fn query(&self, soql: &str, cancel: &CancellationToken) -> ApiResult<Vec<Value>> {
        let first = ApiRequest::get(self.data_path("/query")).param("q", soql);
        self.paginate(first, cancel).await
    }

    /// Same as [`query`](Self::query) against the Tooling API.
    pub async fn tooling_query(&self, soql: &str, cancel: &CancellationToken) -> ApiResult<Vec<Value>> {
        let first = ApiRequest::get(self.data_path("/tooling/query")).param("q", soql);
        self.paginate(first, cancel).await
    }

    /// Run a `SELECT COUNT() ...` query and return `totalSize`.
    pub async fn count(&self, soql: &str, cancel: &CancellationToken) -> ApiResult<u64> {
        let request = ApiRequest::get(self.data_path("/query")).param("q", soql);
        let page = self.send(request, cancel).await?;
        page.get("totalSize")
            .and_then(Value::as_u64)
            .ok_or_else(|| ApiError::Malformed("count query response has no totalSize".into()))
    }

    /// Names of every sObject visible to the session.
    pub async fn describe_global(&self, cancel: &CancellationToken) -> ApiResult<Vec<String>> {
        let data = self.get("/sobjects/", cancel).await?;
        let names = data
            .get("sobjects")
            .and_then(Value::as_array)
            .map(|objects| {
                objects
                    .iter()
                    .filter_map(|obj| obj.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    pub async fn describe_sobject(&self, sobject: &str, cancel: &CancellationToken) -> ApiResult<Value> {
        self.get(&format!("/sobjects/{}/describe/", sobject), cancel).await
    }

    /// Identity of the session's user, including `organization_id`.
    pub async fn user_info(&self, cancel: &CancellationToken) -> ApiResult<Value> {
        self.send(ApiRequest::get("/services/oauth2/userinfo"), cancel).await
    }

    /// List metadata components of one type through the Tooling API.
    pub async fn list_metadata(&self, metadata_type: &str, cancel: &CancellationToken) -> ApiResult<Vec<Value>> {
        let body = json!({
            "method": "listMetadata",
            "type": metadata_type,
        });
        let response = self
            .post("/tooling/sobjects/MetadataContainer/", body, cancel)
            .await?;
        Ok(match response {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => other
                .get("records")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn paginate(&self, first: ApiRequest, cancel: &CancellationToken) -> ApiResult<Vec<Value>> {
        let mut records = Vec::new();
        let mut page = self.send(first, cancel).await?;

        loop {
            if let Some(Value::Array(batch)) = page.get_mut("records").map(Value::take) {
                records.extend(batch);
            }

            let done = page.get("done").and_then(Value::as_bool).unwrap_or(true);
            let next = page
                .get("nextRecordsUrl")
                .and_then(Value::as_str)
                .map(str::to_string);

            match next {
                Some(next) if !done => {
                    page = self.send(ApiRequest::get(next), cancel).await?;
                }
                _ => break,
            }
        }

        Ok(records)
    }
}
