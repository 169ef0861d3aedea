//! Core traits for the provisioning system
//!
//! - [`DnsApi`]: list, create, update and delete records in one DNS zone

pub mod dns_api;

pub use dns_api::{DnsApi, DnsApiFactory, Record, RecordQuery, RecordType, ensure_quoted};
