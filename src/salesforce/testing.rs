//! Scripted in-memory transport for tests

use super::{ApiRequest, SalesforceClient, Transport};
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

enum Matcher {
    Contains(String),
    EndsWith(String),
}

impl Matcher {
    fn matches(&self, key: &str) -> bool {
        match self {
            Matcher::Contains(needle) => key.contains(needle.as_str()),
            Matcher::EndsWith(suffix) => key.ends_with(suffix.as_str()),
        }
    }
}

enum Reply {
    Json(Value),
    Status(u16, String),
}

type CallHook = Box<dyn Fn(&str) + Send + Sync>;

/// Routes are tried in registration order; the first match answers.
/// Unmatched requests fail with a 404 `Remote` error.
pub struct FakeTransport {
    routes: Vec<(Matcher, Reply)>,
    calls: Mutex<Vec<String>>,
    hook: Option<CallHook>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            calls: Mutex::new(Vec::new()),
            hook: None,
        }
    }

    /// Answer any request whose description contains `needle`.
    pub fn respond(mut self, needle: &str, body: Value) -> Self {
        self.routes.push((Matcher::Contains(needle.into()), Reply::Json(body)));
        self
    }

    /// Answer any request whose description ends with `suffix`.
    pub fn respond_at(mut self, suffix: &str, body: Value) -> Self {
        self.routes.push((Matcher::EndsWith(suffix.into()), Reply::Json(body)));
        self
    }

    pub fn fail(mut self, needle: &str, status: u16, body: &str) -> Self {
        self.routes
            .push((Matcher::Contains(needle.into()), Reply::Status(status, body.into())));
        self
    }

    /// Run `hook` with the request description on every call, before answering.
    pub fn on_call<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn client(self: &Arc<Self>) -> SalesforceClient {
        SalesforceClient::new(self.clone(), "v60.0")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: ApiRequest, cancel: &CancellationToken) -> ApiResult<Value> {
        let key = request.describe();
        self.calls.lock().unwrap().push(key.clone());
        if let Some(hook) = &self.hook {
            hook(&key);
        }
        // Mirrors an in-flight request being dropped.
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        match self.routes.iter().find(|(matcher, _)| matcher.matches(&key)) {
            Some((_, Reply::Json(body))) => Ok(body.clone()),
            Some((_, Reply::Status(status, body))) => Err(ApiError::Remote {
                status: *status,
                body: body.clone(),
            }),
            None => Err(ApiError::Remote {
                status: 404,
                body: format!("no route for {key}"),
            }),
        }
    }
}

pub fn records_page(records: Vec<Value>) -> Value {
    json!({
        "totalSize": records.len(),
        "done": true,
        "records": records,
    })
}

pub fn count_page(total: u64) -> Value {
    json!({"totalSize": total, "done": true, "records": []})
}

/// A small but complete org: every collector finds something.
pub fn healthy_org() -> FakeTransport {
    healthy_routes(FakeTransport::new())
}

/// Append the healthy org's routes after whatever `fake` already answers.
pub fn healthy_routes(fake: FakeTransport) -> FakeTransport {
    fake.respond("/services/oauth2/userinfo", json!({"organization_id": "00D000000000001"}))
        .respond(
            "FROM Organization LIMIT 1",
            records_page(vec![json!({
                "Id": "00D000000000001AAA",
                "Name": "Acme",
                "OrganizationType": "Enterprise Edition",
                "InstanceName": "NA42"
            })]),
        )
        .respond(
            "/limits",
            json!({
                "DailyApiRequests": {"Max": 5000, "Remaining": 4500},
                "DailyWorkflowEmails": {"Max": 1000, "Remaining": 1000}
            }),
        )
        .respond("COUNT() FROM User WHERE IsActive", count_page(12))
        .respond(
            "FROM UserLicense",
            records_page(vec![json!({"Id": "100", "Name": "Salesforce", "Status": "Active", "UsedLicenses": 10, "TotalLicenses": 20})]),
        )
        .respond(
            "/sobjects/Account/describe/",
            json!({
                "label": "Account",
                "keyPrefix": "001",
                "fields": [
                    {"name": "Name", "label": "Account Name", "type": "string", "nillable": false, "defaultedOnCreate": false},
                    {"name": "Industry", "label": "Industry", "type": "picklist", "nillable": true,
                     "picklistValues": [{"value": "Tech"}, {"value": "Retail"}]}
                ],
                "childRelationships": [
                    {"relationshipName": "Contacts", "childSObject": "Contact", "field": "AccountId"}
                ]
            }),
        )
        .respond(
            "/sobjects/Invoice__c/describe/",
            json!({
                "label": "Invoice",
                "keyPrefix": "a01",
                "fields": [{"name": "Name", "label": "Invoice Number", "type": "autonumber", "nillable": false}]
            }),
        )
        .respond_at("/sobjects/", json!({"sobjects": [{"name": "Account"}, {"name": "Invoice__c"}]}))
        .respond("SELECT COUNT() FROM Account", count_page(250_000))
        .respond("SELECT COUNT() FROM Invoice__c", count_page(5))
        .respond(
            "FROM RecordType",
            records_page(vec![
                json!({"SobjectType": "Account", "DeveloperName": "Business"}),
                json!({"SobjectType": "Account", "DeveloperName": "Person"}),
            ]),
        )
        .respond(
            "FROM Flow",
            records_page(vec![json!({"Id": "301", "MasterLabel": "Lead Router", "DeveloperName": "Lead_Router", "Status": "Active", "VersionNumber": 3})]),
        )
        .respond(
            "FROM ApexTrigger",
            records_page(vec![json!({"Name": "AccountTrigger", "TableEnumOrId": "Account", "Status": "Active", "BodyLength": 120})]),
        )
        .respond(
            "FROM ValidationRule",
            records_page(vec![json!({"DeveloperName": "Require_Name", "EntityDefinition": {"QualifiedApiName": "Account"}, "Active": true, "ErrorMessage": "Name required"})]),
        )
        .respond(
            "FROM Profile",
            records_page(vec![json!({"Id": "00e1", "Name": "System Administrator", "UserLicenseId": "100", "UserLicense": {"Name": "Salesforce"}})]),
        )
        .respond(
            "FROM PermissionSetAssignment",
            records_page(vec![json!({"PermissionSetId": "0PS1", "total": 4})]),
        )
        .respond(
            "FROM PermissionSet ",
            records_page(vec![json!({"Id": "0PS1", "Name": "Sales_Ops", "Label": "Sales Ops", "Description": null, "License": {"Name": "Salesforce"}})]),
        )
        .respond("COUNT() FROM User WHERE UserRoleId", count_page(3))
        .respond(
            "FROM UserRole",
            records_page(vec![json!({"Id": "00E1", "Name": "CEO", "ParentRoleId": null})]),
        )
        .respond("COUNT() FROM GroupMember", count_page(2))
        .respond(
            "FROM Group WHERE Type = 'Queue'",
            records_page(vec![json!({"Id": "00G1", "Name": "Support", "SObjectType": "Case"})]),
        )
        .respond(
            "MetadataContainer",
            json!([{"fullName": "Account.Share_With_Sales", "type": "SharingCriteriaRule"}]),
        )
        .respond(
            "FROM Report",
            records_page(vec![json!({"Id": "00O1", "Name": "Pipeline", "FolderName": "Sales", "Type": "Opportunity"})]),
        )
        .respond(
            "FROM Dashboard",
            records_page(vec![json!({"Id": "01Z1", "Title": "Exec", "FolderName": null})]),
        )
        .respond(
            "FROM Layout",
            records_page(vec![json!({"FullName": "Account-Account Layout"})]),
        )
}
