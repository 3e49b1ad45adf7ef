//! One authenticated HTTP exchange against the org

use super::SalesforceAuth;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request relative to the instance base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            params: Vec::new(),
            body: Some(body),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }

    /// Human-readable form used in logs, e.g. `GET /services/data/v60.0/query?q=SELECT ...`.
    pub fn describe(&self) -> String {
        let verb = match self.method {
            Method::Get => "GET",
            Method::Post => "POST",
        };
        let mut out = format!("{} {}", verb, self.path);
        for (i, (key, value)) in self.params.iter().enumerate() {
            out.push(if i == 0 { '?' } else { '&' });
            out.push_str(key);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request and return the parsed JSON body.
    ///
    /// Implementations must resolve to `ApiError::Cancelled` once `cancel`
    /// fires, whether before or while the request is in flight.
    async fn send(&self, request: ApiRequest, cancel: &CancellationToken) -> ApiResult<Value>;
}

/// reqwest-backed transport bound to one org session.
pub struct HttpTransport {
    client: reqwest::Client,
    auth: SalesforceAuth,
}

impl HttpTransport {
    pub fn new(auth: SalesforceAuth, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, auth })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest, cancel: &CancellationToken) -> ApiResult<Value> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let url = format!("{}{}", self.auth.instance_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        builder = builder
            .bearer_auth(&self.auth.access_token)
            .header(CONTENT_TYPE, "application/json");
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ApiError::Cancelled),
            result = exchange(builder) => {
                if let Err(ApiError::Remote { status, body }) = &result {
                    tracing::error!(
                        request = %request.describe(),
                        status,
                        error = %body,
                        "Salesforce REST API error"
                    );
                }
                result
            }
        }
    }
}

async fn exchange(builder: reqwest::RequestBuilder) -> ApiResult<Value> {
    let response = builder.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::Remote {
            status: status.as_u16(),
            body: text,
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}
