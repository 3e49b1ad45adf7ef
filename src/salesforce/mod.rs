//! Remote metadata client for the org's REST API

mod client;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ensure_active, SalesforceClient};
pub use transport::{ApiRequest, HttpTransport, Method, Transport};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credentials for one org session, supplied by the auth collaborator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesforceAuth {
    pub access_token: String,
    pub instance_url: String,
}

impl SalesforceAuth {
    pub fn new(access_token: impl Into<String>, instance_url: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl fmt::Debug for SalesforceAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SalesforceAuth")
            .field("access_token", &"<redacted>")
            .field("instance_url", &self.instance_url)
            .finish()
    }
}
