//! Org scanner - inventories a CRM org and flags migration blockers

pub mod blockers;
pub mod compare;
pub mod compose;
pub mod config;
pub mod error;
pub mod inventory;
pub mod progress;
pub mod registry;
pub mod repository;
pub mod salesforce;
pub mod security;
pub mod server;
pub mod service;
pub mod types;

pub use compose::{compose_scan, start_scan, ScanOptions};
pub use error::{ApiError, ScanError};
pub use types::{ScanOutput, ScanProgress};
