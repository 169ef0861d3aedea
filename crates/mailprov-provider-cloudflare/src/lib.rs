// # Cloudflare DNS Provider
//
// Cloudflare API v4 implementation of `mailprov_core::traits::DnsApi`.
//
// ## Behaviour
//
// - HTTP timeout of 30 seconds per request
// - Zone from an explicit ID, or looked up once by name
// - Listing follows `result_info.total_pages`, 100 records per page
// - TXT content is quoted on create and update
// - Status mapping: 401/403 auth, 404 not found, 409 conflict, 429 rate
//   limit, 5xx transient server error
// - Dry-run mode: reads are performed, writes are logged and skipped
// - No retries or backoff; the caller decides what to do with an error
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider MUST fail fast if token is empty
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...&page=...`
// - DNS Record Details: GET `/zones/:zone_id/dns_records/:record_id`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Overwrite DNS Record: PUT `/zones/:zone_id/dns_records/:record_id`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use mailprov_core::config::ProviderConfig;
use mailprov_core::traits::{DnsApi, DnsApiFactory, Record, RecordQuery, RecordType, ensure_quoted};
use mailprov_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records requested per listing page
const PAGE_SIZE: u32 = 100;

/// TTL value meaning "automatic"
const AUTO_TTL: u32 = 1;

const PROVIDER: &str = "cloudflare";

/// Cloudflare DNS API client bound to one zone
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the client will:
/// - Perform all GET requests (zone lookup, record listing)
/// - Log the intended POST/PUT/DELETE
/// - **NOT** modify any record
pub struct CloudflareApi {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Zone ID, if configured
    zone_id: Option<String>,

    /// Zone name, looked up when no ID is configured
    zone_name: Option<String>,

    /// API root, without trailing slash
    base_url: String,

    client: reqwest::Client,

    /// Zone ID resolved on first use
    resolved_zone: OnceCell<String>,

    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareApi")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("zone_name", &self.zone_name)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareApi {
    /// Create a client for the zone given by ID or by name
    ///
    /// Fails if the token is empty or neither zone ID nor name is given.
    pub fn new(
        api_token: impl Into<String>,
        zone_id: Option<String>,
        zone_name: Option<String>,
        dry_run: bool,
    ) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let zone_id = zone_id.filter(|z| !z.is_empty());
        let zone_name = zone_name.filter(|z| !z.is_empty());
        if zone_id.is_none() && zone_name.is_none() {
            return Err(Error::config(
                "Cloudflare provider needs a zone ID or a zone name",
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_token,
            zone_id,
            zone_name,
            base_url: CLOUDFLARE_API_BASE.to_string(),
            client,
            resolved_zone: OnceCell::new(),
            dry_run,
        })
    }

    /// Point the client at another API root (e.g. a mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    async fn lookup_zone(&self) -> Result<String> {
        if let Some(ref zone_id) = self.zone_id {
            tracing::debug!("Using pre-configured zone ID");
            return Ok(zone_id.clone());
        }

        let zone_name = self.zone_name.as_deref().unwrap_or_default();
        tracing::debug!("Looking up zone ID for: {}", zone_name);

        let url = format!("{}/zones", self.base_url);
        let request = self.client.get(&url).query(&[("name", zone_name)]);
        let envelope: Envelope<Vec<Zone>> = self.send(request, "zone lookup").await?;

        let zone = envelope
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("Zone not found: {}", zone_name)))?;

        tracing::debug!("Found zone ID: {} ({})", zone.id, zone.name);
        Ok(zone.id)
    }

    fn records_url(&self, zone_id: &str) -> String {
        format!("{}/zones/{}/dns_records", self.base_url, zone_id)
    }

    /// Send an authenticated request and decode the response envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<Envelope<T>> {
        let response = request
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(map_status(status.as_u16(), what, &error_text));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| Error::provider(PROVIDER, format!("Failed to parse response: {}", e)))?;

        if !envelope.success {
            return Err(Error::provider(
                PROVIDER,
                format!("{} failed: {}", what, describe_messages(&envelope.errors)),
            ));
        }
        Ok(envelope)
    }

    async fn write(&self, request: reqwest::RequestBuilder, what: &str) -> Result<()> {
        let _: Envelope<serde_json::Value> = self.send(request, what).await?;
        Ok(())
    }
}

/// Map a non-success HTTP status to an error
fn map_status(status: u16, what: &str, body: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "Invalid API token or insufficient permissions. Status: {}",
            status
        )),
        404 => Error::not_found(format!("{}: {}", what, body)),
        409 => Error::provider(
            PROVIDER,
            format!("Conflict: Record is being modified by another process. Status: {}", status),
        ),
        429 => Error::rate_limited(format!("Please retry later. Status: {}", status)),
        500..=599 => Error::provider(
            PROVIDER,
            format!("Cloudflare server error (transient): {} - {}", status, body),
        ),
        _ => Error::provider(PROVIDER, format!("{} failed: {} - {}", what, status, body)),
    }
}

fn describe_messages(messages: &[ApiMessage]) -> String {
    if messages.is_empty() {
        return "no error details".to_string();
    }
    messages
        .iter()
        .map(|m| format!("{} ({})", m.message, m.code))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Response envelope shared by every v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    ttl: Option<u32>,
    priority: Option<u16>,
}

impl DnsRecord {
    /// None for types outside [`RecordType`]
    fn into_record(self) -> Option<Record> {
        let record_type = match self.record_type.parse::<RecordType>() {
            Ok(t) => t,
            Err(_) => {
                tracing::debug!("Skipping {} record {}", self.record_type, self.name);
                return None;
            }
        };
        Some(Record {
            id: Some(self.id),
            name: self.name,
            record_type,
            content: self.content,
            ttl: self.ttl,
            priority: self.priority,
        })
    }
}

#[derive(Debug, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
}

impl<'a> RecordBody<'a> {
    fn from_record(record: &'a Record) -> Self {
        let content = if record.record_type == RecordType::Txt {
            ensure_quoted(&record.content)
        } else {
            record.content.clone()
        };
        Self {
            record_type: record.record_type.as_str(),
            name: &record.name,
            content,
            ttl: record.ttl.unwrap_or(AUTO_TTL),
            priority: record.priority,
        }
    }
}

#[async_trait]
impl DnsApi for CloudflareApi {
    async fn resolve_zone(&self) -> Result<String> {
        self.resolved_zone
            .get_or_try_init(|| self.lookup_zone())
            .await
            .cloned()
    }

    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<Record>> {
        let zone_id = self.resolve_zone().await?;
        let url = self.records_url(&zone_id);

        let mut params: Vec<(&str, String)> = vec![("per_page", PAGE_SIZE.to_string())];
        if let Some(ref name) = query.name {
            params.push(("name", name.clone()));
        }
        if let Some(record_type) = query.record_type {
            params.push(("type", record_type.as_str().to_string()));
        }
        if let Some(ref content) = query.content {
            params.push(("content", content.clone()));
        }

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let request = self
                .client
                .get(&url)
                .query(&params)
                .query(&[("page", page.to_string())]);
            let envelope: Envelope<Vec<DnsRecord>> = self.send(request, "record listing").await?;

            let total_pages = envelope
                .result_info
                .as_ref()
                .map(|info| info.total_pages)
                .unwrap_or(1);
            records.extend(
                envelope
                    .result
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(DnsRecord::into_record),
            );

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        tracing::debug!("Listed {} record(s) over {} page(s)", records.len(), page);
        Ok(records)
    }

    async fn get_record(&self, id: &str) -> Result<Record> {
        if id.is_empty() {
            return Err(Error::invalid_record_id(id));
        }
        let zone_id = self.resolve_zone().await?;
        let url = format!("{}/{}", self.records_url(&zone_id), id);

        let envelope: Envelope<DnsRecord> = self.send(self.client.get(&url), "record lookup").await?;
        envelope
            .result
            .and_then(DnsRecord::into_record)
            .ok_or_else(|| Error::not_found(format!("DNS record not found: {}", id)))
    }

    async fn create_mx_record(&self, domain: &str, host: &str, priority: u16) -> Result<()> {
        let record = Record::new(domain, RecordType::Mx, host).with_priority(priority);
        self.create_record(&record).await
    }

    async fn create_record(&self, record: &Record) -> Result<()> {
        let zone_id = self.resolve_zone().await?;
        let url = self.records_url(&zone_id);
        let body = RecordBody::from_record(record);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send POST request to {} with payload: {}",
                url,
                serde_json::to_string(&body)?
            );
            return Ok(());
        }

        tracing::info!("Creating {} record {}", body.record_type, body.name);
        self.write(self.client.post(&url).json(&body), "record creation")
            .await
    }

    async fn update_record(&self, record: &Record) -> Result<()> {
        let id = record
            .existing_id()
            .ok_or_else(|| Error::invalid_record_id(record.id.clone().unwrap_or_default()))?;
        let zone_id = self.resolve_zone().await?;
        let url = format!("{}/{}", self.records_url(&zone_id), id);
        let body = RecordBody::from_record(record);

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send PUT request to {} with payload: {}",
                url,
                serde_json::to_string(&body)?
            );
            return Ok(());
        }

        tracing::info!("Updating {} record {} ({})", body.record_type, body.name, id);
        self.write(self.client.put(&url).json(&body), "record update")
            .await
    }

    async fn delete_record(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::invalid_record_id(id));
        }
        let zone_id = self.resolve_zone().await?;
        let url = format!("{}/{}", self.records_url(&zone_id), id);

        if self.dry_run {
            tracing::info!("[DRY-RUN] Would send DELETE request to {}", url);
            return Ok(());
        }

        tracing::info!("Deleting record {}", id);
        self.write(self.client.delete(&url), "record deletion").await
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

/// Factory for creating Cloudflare APIs
pub struct CloudflareFactory;

impl DnsApiFactory for CloudflareFactory {
    fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsApi>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_id,
                zone_name,
            } => {
                // Check for dry-run mode environment variable
                let dry_run = std::env::var("MAILPROV_MODE")
                    .unwrap_or_default()
                    .eq_ignore_ascii_case("dry-run");

                if dry_run {
                    tracing::warn!(
                        "Cloudflare provider running in DRY-RUN mode - no changes will be made"
                    );
                }

                Ok(Box::new(CloudflareApi::new(
                    api_token.clone(),
                    zone_id.clone(),
                    zone_name.clone(),
                    dry_run,
                )?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use mailprov_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// mailprov_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &mailprov_core::ProviderRegistry) {
    registry.register_provider(PROVIDER, Box::new(CloudflareFactory));
}
