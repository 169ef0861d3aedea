//! Mail DNS record reconciliation
//!
//! Converges the records a mail domain needs onto a [`DnsApi`]:
//!
//! | Category | Name | Type | Content |
//! |----------|------|------|---------|
//! | MX | `<domain>` | MX | one per `(host, priority)` |
//! | SPF | `<domain>` | TXT | `v=spf1 mx ~all` |
//! | DKIM | `default._domainkey.<domain>` | TXT | explicit value, or the key file maddy generated |
//! | DMARC | `_dmarc.<domain>` | TXT | `v=DMARC1; p=quarantine; ruf=<postmaster>` |
//! | MTA-STS | `_mta-sts.<domain>`, `_smtp._tls.<domain>` | TXT | `v=STSv1; id=1`, `v=TLSRPTv1; rua=mailto:<postmaster>` |
//!
//! ## Modes
//!
//! - **Destructive**: matching records are listed and deleted first, then the
//!   desired ones created. Re-running converges to exactly one copy.
//! - **Additive**: nothing is deleted. Re-running creates duplicates; this is
//!   a known limitation of the mode.
//!
//! Records are never updated in place. Plans are computed for every category
//! before the first provider call, so a missing DKIM key aborts the run
//! without touching the zone. After that the first failure aborts; nothing
//! is rolled back.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cancel::cancellable;
use crate::error::{Error, Result, ResultExt};
use crate::traits::{DnsApi, Record, RecordQuery, RecordType};

/// Where maddy writes generated DKIM public keys
pub const DEFAULT_DKIM_KEY_DIR: &str = "/var/lib/maddy/dkim_keys";

/// Priority used when an MX host is given without one
pub const DEFAULT_MX_PRIORITY: u16 = 10;

/// Desired mail records for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailRecordsSpec {
    /// Mail domain
    pub domain: String,
    /// Address that receives DMARC and TLS reports
    pub postmaster: String,
    /// Explicit DKIM TXT value; read from `dkim_key_dir` when absent
    pub dkim: Option<String>,
    /// MX host name to priority
    pub mx_hosts: BTreeMap<String, u16>,
    /// Delete matching records before creating
    pub destructive: bool,
    /// Directory holding `<domain>_default.dns`
    pub dkim_key_dir: PathBuf,
}

impl Default for MailRecordsSpec {
    fn default() -> Self {
        Self {
            domain: String::new(),
            postmaster: String::new(),
            dkim: None,
            mx_hosts: BTreeMap::new(),
            destructive: false,
            dkim_key_dir: PathBuf::from(DEFAULT_DKIM_KEY_DIR),
        }
    }
}

impl MailRecordsSpec {
    /// Validate the inputs
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() || self.domain.chars().any(char::is_whitespace) {
            return Err(Error::config(format!("Invalid mail domain: {:?}", self.domain)));
        }
        if self.postmaster.trim().is_empty() {
            return Err(Error::config("Postmaster address is required"));
        }
        Ok(())
    }

    /// `<dkim_key_dir>/<domain>_default.dns`
    pub fn dkim_key_file(&self) -> PathBuf {
        self.dkim_key_dir.join(format!("{}_default.dns", self.domain))
    }
}

/// Record families managed by the reconciler, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MailCategory {
    Mx,
    Spf,
    Dkim,
    Dmarc,
    MtaSts,
}

impl MailCategory {
    /// All categories, in the order they are reconciled
    pub const ALL: [MailCategory; 5] = [
        MailCategory::Mx,
        MailCategory::Spf,
        MailCategory::Dkim,
        MailCategory::Dmarc,
        MailCategory::MtaSts,
    ];

    /// Human-readable label used in logs and errors
    pub fn label(&self) -> &'static str {
        match self {
            MailCategory::Mx => "MX records",
            MailCategory::Spf => "SPF records",
            MailCategory::Dkim => "DKIM record",
            MailCategory::Dmarc => "DMARC record",
            MailCategory::MtaSts => "MTA-STS record",
        }
    }
}

impl fmt::Display for MailCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Records to delete in destructive mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cleanup {
    /// Provider-side selection
    pub query: RecordQuery,
    /// Only delete listed records whose content contains this
    pub content_filter: Option<&'static str>,
}

impl Cleanup {
    fn all(query: RecordQuery) -> Self {
        Self {
            query,
            content_filter: None,
        }
    }

    fn containing(query: RecordQuery, needle: &'static str) -> Self {
        Self {
            query,
            content_filter: Some(needle),
        }
    }

    /// Whether a listed record is selected for deletion
    pub fn selects(&self, record: &Record) -> bool {
        self.content_filter
            .is_none_or(|needle| record.content.contains(needle))
    }
}

/// A record to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired {
    /// MX record, created through the provider's MX call
    Mx {
        domain: String,
        host: String,
        priority: u16,
    },
    /// Any other record
    Record(Record),
}

/// What one category will do against the zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRecordPlan {
    pub category: MailCategory,
    /// Empty in additive mode
    pub cleanup: Vec<Cleanup>,
    pub create: Vec<Desired>,
}

fn txt(name: impl Into<String>, content: impl Into<String>) -> Desired {
    Desired::Record(Record::new(name, RecordType::Txt, content))
}

fn txt_at(name: &str) -> RecordQuery {
    RecordQuery::new().name(name).record_type(RecordType::Txt)
}

/// MX records for the domain
pub fn plan_mx(spec: &MailRecordsSpec) -> MailRecordPlan {
    let mut cleanup = Vec::new();
    if spec.destructive {
        cleanup.push(Cleanup::all(
            RecordQuery::new()
                .name(&spec.domain)
                .record_type(RecordType::Mx),
        ));
    }

    MailRecordPlan {
        category: MailCategory::Mx,
        cleanup,
        create: spec
            .mx_hosts
            .iter()
            .map(|(host, priority)| Desired::Mx {
                domain: spec.domain.clone(),
                host: host.clone(),
                priority: *priority,
            })
            .collect(),
    }
}

/// SPF policy allowing the domain's MX hosts
pub fn plan_spf(spec: &MailRecordsSpec) -> MailRecordPlan {
    let mut cleanup = Vec::new();
    if spec.destructive {
        cleanup.push(Cleanup::containing(txt_at(&spec.domain), "v=spf1"));
    }

    MailRecordPlan {
        category: MailCategory::Spf,
        cleanup,
        create: vec![txt(&spec.domain, "v=spf1 mx ~all")],
    }
}

/// DKIM public key; reads the key file when no value is given
pub async fn plan_dkim(spec: &MailRecordsSpec) -> Result<MailRecordPlan> {
    let name = format!("default._domainkey.{}", spec.domain);
    let value = match &spec.dkim {
        Some(value) if !value.is_empty() => value.clone(),
        _ => read_dkim_key(spec).await?,
    };

    let mut cleanup = Vec::new();
    if spec.destructive {
        cleanup.push(Cleanup::all(txt_at(&name)));
    }

    Ok(MailRecordPlan {
        category: MailCategory::Dkim,
        cleanup,
        create: vec![txt(name, value)],
    })
}

async fn read_dkim_key(spec: &MailRecordsSpec) -> Result<String> {
    let path = spec.dkim_key_file();
    debug!("reading DKIM key from {}", path.display());
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| Error::fs("opening dkim key file", &path, e))?;
    Ok(content.trim_end().to_string())
}

/// DMARC policy reporting to the postmaster
pub fn plan_dmarc(spec: &MailRecordsSpec) -> MailRecordPlan {
    let name = format!("_dmarc.{}", spec.domain);

    let mut cleanup = Vec::new();
    if spec.destructive {
        cleanup.push(Cleanup::containing(txt_at(&name), "v=DMARC1"));
    }

    MailRecordPlan {
        category: MailCategory::Dmarc,
        cleanup,
        create: vec![txt(
            name,
            format!("v=DMARC1; p=quarantine; ruf={}", spec.postmaster),
        )],
    }
}

/// MTA-STS policy id and TLS reporting address
pub fn plan_mta_sts(spec: &MailRecordsSpec) -> MailRecordPlan {
    let entries = [
        (format!("_mta-sts.{}", spec.domain), "v=STSv1; id=1".to_string()),
        (
            format!("_smtp._tls.{}", spec.domain),
            format!("v=TLSRPTv1; rua=mailto:{}", spec.postmaster),
        ),
    ];

    let mut cleanup = Vec::new();
    let mut create = Vec::new();
    for (name, value) in entries {
        if spec.destructive {
            cleanup.push(Cleanup::all(txt_at(&name)));
        }
        create.push(txt(name, value));
    }

    MailRecordPlan {
        category: MailCategory::MtaSts,
        cleanup,
        create,
    }
}

/// Plan one category
pub async fn plan(category: MailCategory, spec: &MailRecordsSpec) -> Result<MailRecordPlan> {
    match category {
        MailCategory::Mx => Ok(plan_mx(spec)),
        MailCategory::Spf => Ok(plan_spf(spec)),
        MailCategory::Dkim => plan_dkim(spec).await,
        MailCategory::Dmarc => Ok(plan_dmarc(spec)),
        MailCategory::MtaSts => Ok(plan_mta_sts(spec)),
    }
}

/// Plan every category, in processing order
pub async fn plan_all(spec: &MailRecordsSpec) -> Result<Vec<MailRecordPlan>> {
    spec.validate()?;
    let mut plans = Vec::with_capacity(MailCategory::ALL.len());
    for category in MailCategory::ALL {
        plans.push(plan(category, spec).await.with_context(|| wrap(category))?);
    }
    Ok(plans)
}

fn wrap(category: MailCategory) -> String {
    format!("updating mail records ({})", category)
}

/// Applies mail record plans through a [`DnsApi`]
pub struct MailRecordReconciler {
    api: Arc<dyn DnsApi>,
}

impl MailRecordReconciler {
    pub fn new(api: Arc<dyn DnsApi>) -> Self {
        Self { api }
    }

    /// Reconcile every category, in order, stopping at the first failure
    pub async fn update_all_mail_records(
        &self,
        spec: &MailRecordsSpec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let plans = plan_all(spec).await?;
        info!(
            "reconciling mail records for {} via {} ({})",
            spec.domain,
            self.api.provider_name(),
            if spec.destructive { "destructive" } else { "additive" }
        );

        for plan in &plans {
            self.apply(plan, cancel)
                .await
                .with_context(|| wrap(plan.category))?;
        }
        Ok(())
    }

    pub async fn update_mx_records(&self, spec: &MailRecordsSpec, cancel: &CancellationToken) -> Result<()> {
        self.update(MailCategory::Mx, spec, cancel).await
    }

    pub async fn update_spf_records(&self, spec: &MailRecordsSpec, cancel: &CancellationToken) -> Result<()> {
        self.update(MailCategory::Spf, spec, cancel).await
    }

    pub async fn update_dkim_record(&self, spec: &MailRecordsSpec, cancel: &CancellationToken) -> Result<()> {
        self.update(MailCategory::Dkim, spec, cancel).await
    }

    pub async fn update_dmarc_record(&self, spec: &MailRecordsSpec, cancel: &CancellationToken) -> Result<()> {
        self.update(MailCategory::Dmarc, spec, cancel).await
    }

    pub async fn update_mta_sts_records(
        &self,
        spec: &MailRecordsSpec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.update(MailCategory::MtaSts, spec, cancel).await
    }

    async fn update(
        &self,
        category: MailCategory,
        spec: &MailRecordsSpec,
        cancel: &CancellationToken,
    ) -> Result<()> {
        spec.validate()?;
        let plan = plan(category, spec).await?;
        self.apply(&plan, cancel).await
    }

    /// Execute one plan: cleanups first, then creations
    pub async fn apply(&self, plan: &MailRecordPlan, cancel: &CancellationToken) -> Result<()> {
        let mut deleted = 0;
        for cleanup in &plan.cleanup {
            let listed = cancellable(cancel, "listing records", self.api.list_records(&cleanup.query)).await?;

            for record in listed.iter().filter(|r| cleanup.selects(r)) {
                let id = record.existing_id().ok_or_else(|| {
                    Error::invalid_record_id(format!(
                        "{} {} {}",
                        record.record_type, record.name, record.content
                    ))
                })?;
                cancellable(cancel, "deleting record", self.api.delete_record(id))
                    .await
                    .with_context(|| format!("deleting record: {}", id))?;
                deleted += 1;
            }
        }

        for desired in &plan.create {
            match desired {
                Desired::Mx {
                    domain,
                    host,
                    priority,
                } => {
                    cancellable(
                        cancel,
                        "creating MX record",
                        self.api.create_mx_record(domain, host, *priority),
                    )
                    .await?;
                }
                Desired::Record(record) => {
                    cancellable(cancel, "creating record", self.api.create_record(record)).await?;
                }
            }
        }

        info!(
            "{}: {} deleted, {} created",
            plan.category,
            deleted,
            plan.create.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(destructive: bool) -> MailRecordsSpec {
        MailRecordsSpec {
            domain: "example.org".to_string(),
            postmaster: "postmaster@example.org".to_string(),
            dkim: Some("v=DKIM1; k=rsa; p=AAAA".to_string()),
            mx_hosts: BTreeMap::from([
                ("mx2.example.org".to_string(), 20),
                ("mx1.example.org".to_string(), 10),
            ]),
            destructive,
            ..Default::default()
        }
    }

    #[test]
    fn test_mx_plan_sorted_by_host() {
        let plan = plan_mx(&spec(true));
        assert_eq!(plan.cleanup.len(), 1);
        assert_eq!(
            plan.create,
            vec![
                Desired::Mx {
                    domain: "example.org".to_string(),
                    host: "mx1.example.org".to_string(),
                    priority: 10,
                },
                Desired::Mx {
                    domain: "example.org".to_string(),
                    host: "mx2.example.org".to_string(),
                    priority: 20,
                },
            ]
        );
    }

    #[test]
    fn test_additive_plans_have_no_cleanup() {
        let spec = spec(false);
        for plan in [plan_mx(&spec), plan_spf(&spec), plan_dmarc(&spec), plan_mta_sts(&spec)] {
            assert!(plan.cleanup.is_empty(), "{}", plan.category);
        }
    }

    #[test]
    fn test_record_contents() {
        let spec = spec(true);
        assert_eq!(plan_spf(&spec).create, vec![txt("example.org", "v=spf1 mx ~all")]);
        assert_eq!(
            plan_dmarc(&spec).create,
            vec![txt(
                "_dmarc.example.org",
                "v=DMARC1; p=quarantine; ruf=postmaster@example.org"
            )]
        );
        assert_eq!(
            plan_mta_sts(&spec).create,
            vec![
                txt("_mta-sts.example.org", "v=STSv1; id=1"),
                txt(
                    "_smtp._tls.example.org",
                    "v=TLSRPTv1; rua=mailto:postmaster@example.org"
                ),
            ]
        );
    }

    #[test]
    fn test_content_filter() {
        let cleanup = &plan_spf(&spec(true)).cleanup[0];
        let spf = Record::new("example.org", RecordType::Txt, "\"v=spf1 a ~all\"");
        let verification = Record::new("example.org", RecordType::Txt, "site-verification=abc");
        assert!(cleanup.selects(&spf));
        assert!(!cleanup.selects(&verification));
    }

    #[tokio::test]
    async fn test_dkim_from_key_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("example.org_default.dns"),
            "v=DKIM1; k=ed25519; p=KEY\n",
        )
        .unwrap();
        let spec = MailRecordsSpec {
            dkim: None,
            dkim_key_dir: dir.path().to_path_buf(),
            ..spec(true)
        };

        let plan = plan_dkim(&spec).await.unwrap();
        assert_eq!(
            plan.create,
            vec![txt("default._domainkey.example.org", "v=DKIM1; k=ed25519; p=KEY")]
        );
    }

    #[tokio::test]
    async fn test_missing_dkim_key_fails_planning() {
        let dir = tempfile::tempdir().unwrap();
        let spec = MailRecordsSpec {
            dkim: None,
            dkim_key_dir: dir.path().to_path_buf(),
            ..spec(true)
        };

        let err = plan_all(&spec).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("updating mail records (DKIM record): "));
    }

    #[test]
    fn test_validate() {
        assert!(spec(true).validate().is_ok());
        let no_domain = MailRecordsSpec {
            domain: String::new(),
            ..spec(true)
        };
        assert!(no_domain.validate().is_err());
        let no_postmaster = MailRecordsSpec {
            postmaster: " ".to_string(),
            ..spec(true)
        };
        assert!(no_postmaster.validate().is_err());
    }
}
