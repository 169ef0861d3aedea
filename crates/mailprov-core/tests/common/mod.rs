//! Test doubles and common utilities for contract tests
//!
//! [`MemoryDnsApi`] keeps a zone in memory and counts calls, so tests can
//! assert both the resulting records and the traffic that produced them.

#![allow(dead_code)]

use mailprov_core::error::{Error, Result};
use mailprov_core::mail::MailRecordsSpec;
use mailprov_core::traits::{DnsApi, Record, RecordQuery, RecordType};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Every call made against a [`MemoryDnsApi`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List(Option<String>, Option<RecordType>),
    Delete(String),
    CreateMx(String, String, u16),
    Create(Record),
}

/// An in-memory zone that tracks calls
pub struct MemoryDnsApi {
    records: Arc<Mutex<Vec<Record>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    next_id: Arc<AtomicUsize>,
    list_call_count: Arc<AtomicUsize>,
    delete_call_count: Arc<AtomicUsize>,
    create_call_count: Arc<AtomicUsize>,
    /// Fail the n-th delete (1-based)
    fail_delete_at: Arc<Mutex<Option<usize>>>,
    /// Return records without an id from list_records
    strip_ids: Arc<Mutex<bool>>,
}

impl MemoryDnsApi {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(1)),
            list_call_count: Arc::new(AtomicUsize::new(0)),
            delete_call_count: Arc::new(AtomicUsize::new(0)),
            create_call_count: Arc::new(AtomicUsize::new(0)),
            fail_delete_at: Arc::new(Mutex::new(None)),
            strip_ids: Arc::new(Mutex::new(false)),
        }
    }

    /// Start with `records` already in the zone; ids are assigned
    pub fn with_records(records: Vec<Record>) -> Self {
        let api = Self::new();
        for record in records {
            api.insert(record);
        }
        api
    }

    /// Create a new MemoryDnsApi that shares state and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            records: Arc::clone(&other.records),
            calls: Arc::clone(&other.calls),
            next_id: Arc::clone(&other.next_id),
            list_call_count: Arc::clone(&other.list_call_count),
            delete_call_count: Arc::clone(&other.delete_call_count),
            create_call_count: Arc::clone(&other.create_call_count),
            fail_delete_at: Arc::clone(&other.fail_delete_at),
            strip_ids: Arc::clone(&other.strip_ids),
        }
    }

    pub fn fail_delete_at(&self, n: usize) {
        *self.fail_delete_at.lock().unwrap() = Some(n);
    }

    pub fn strip_ids(&self) {
        *self.strip_ids.lock().unwrap() = true;
    }

    fn insert(&self, record: Record) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .unwrap()
            .push(record.with_id(format!("rec-{id}")));
    }

    /// Current zone content
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    /// Records at `name` of `record_type`
    pub fn records_at(&self, name: &str, record_type: RecordType) -> Vec<Record> {
        let query = RecordQuery::new().name(name).record_type(record_type);
        self.records()
            .into_iter()
            .filter(|r| query.matches(r))
            .collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_call_count(&self) -> usize {
        self.list_call_count.load(Ordering::SeqCst)
    }

    pub fn delete_call_count(&self) -> usize {
        self.delete_call_count.load(Ordering::SeqCst)
    }

    pub fn create_call_count(&self) -> usize {
        self.create_call_count.load(Ordering::SeqCst)
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl DnsApi for MemoryDnsApi {
    async fn resolve_zone(&self) -> Result<String> {
        Ok("memory-zone".to_string())
    }

    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        self.list_call_count.fetch_add(1, Ordering::SeqCst);
        self.log(Call::List(query.name.clone(), query.record_type));

        let strip = *self.strip_ids.lock().unwrap();
        Ok(self
            .records()
            .into_iter()
            .filter(|r| query.matches(r))
            .map(|mut r| {
                if strip {
                    r.id = None;
                }
                r
            })
            .collect())
    }

    async fn get_record(&self, id: &str) -> Result<Record> {
        self.records()
            .into_iter()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| Error::not_found(format!("record {id}")))
    }

    async fn create_mx_record(&self, domain: &str, host: &str, priority: u16) -> Result<()> {
        self.create_call_count.fetch_add(1, Ordering::SeqCst);
        self.log(Call::CreateMx(domain.to_string(), host.to_string(), priority));
        self.insert(Record::new(domain, RecordType::Mx, host).with_priority(priority));
        Ok(())
    }

    async fn create_record(&self, record: &Record) -> Result<()> {
        self.create_call_count.fetch_add(1, Ordering::SeqCst);
        self.log(Call::Create(record.clone()));
        self.insert(record.clone());
        Ok(())
    }

    async fn update_record(&self, record: &Record) -> Result<()> {
        let id = record
            .existing_id()
            .ok_or_else(|| Error::invalid_record_id(""))?;
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| Error::not_found(format!("record {id}")))?;
        *slot = record.clone();
        Ok(())
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid_record_id(id));
        }
        let n = self.delete_call_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.log(Call::Delete(id.to_string()));

        if *self.fail_delete_at.lock().unwrap() == Some(n) {
            return Err(Error::provider("memory", format!("refusing to delete {id}")));
        }

        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id.as_deref() != Some(id));
        if records.len() == before {
            return Err(Error::not_found(format!("record {id}")));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

/// A spec for `example.org` with the given MX hosts and an explicit DKIM value
pub fn mail_spec(mx_hosts: &[(&str, u16)], destructive: bool) -> MailRecordsSpec {
    MailRecordsSpec {
        domain: "example.org".to_string(),
        postmaster: "postmaster@example.org".to_string(),
        dkim: Some("v=DKIM1; k=rsa; p=MIIB".to_string()),
        mx_hosts: mx_hosts
            .iter()
            .map(|(h, p)| (h.to_string(), *p))
            .collect::<BTreeMap<_, _>>(),
        destructive,
        ..Default::default()
    }
}
