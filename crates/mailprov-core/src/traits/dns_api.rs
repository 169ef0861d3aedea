// # DNS API Trait
//
// The single seam between the reconciler and a DNS provider.
//
// ## Implementations
//
// - Cloudflare: `mailprov-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use mailprov_core::traits::{DnsApi, RecordQuery, RecordType};
//
// let api: Box<dyn DnsApi> = /* DnsApi implementation */;
// let mx = api
//     .list_records(&RecordQuery::new().name("example.com").record_type(RecordType::Mx))
//     .await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DNS resource record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address
    A,
    /// IPv6 address
    Aaaa,
    /// Canonical name
    Cname,
    /// Mail exchanger
    Mx,
    /// Name server
    Ns,
    /// Service locator
    Srv,
    /// Text
    Txt,
}

impl RecordType {
    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Cname => "CNAME",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Srv => "SRV",
            RecordType::Txt => "TXT",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "CNAME" => Ok(RecordType::Cname),
            "MX" => Ok(RecordType::Mx),
            "NS" => Ok(RecordType::Ns),
            "SRV" => Ok(RecordType::Srv),
            "TXT" => Ok(RecordType::Txt),
            other => Err(crate::Error::invalid_input(format!(
                "unsupported record type: {}",
                other
            ))),
        }
    }
}

/// A DNS resource record
///
/// `id` is the provider's identity and is `None` for records that do not
/// exist yet. Two records describe the same thing when their name, type and
/// content agree; see [`Record::is_equivalent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Provider-assigned identity
    pub id: Option<String>,
    /// Fully qualified owner name
    pub name: String,
    /// Record type
    pub record_type: RecordType,
    /// Record value; for MX the target host
    pub content: String,
    /// Time-to-live in seconds, if known
    pub ttl: Option<u32>,
    /// MX preference
    pub priority: Option<u16>,
}

impl Record {
    /// A record that has not been created yet
    pub fn new(name: impl Into<String>, record_type: RecordType, content: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            record_type,
            content: content.into(),
            ttl: None,
            priority: None,
        }
    }

    /// Attach a provider identity
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Set the MX preference
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Provider identity, if the record exists at the provider
    pub fn existing_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Equality by `(name, type, content)`, ignoring identity and TTL
    pub fn is_equivalent(&self, other: &Record) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.record_type == other.record_type
            && self.content == other.content
    }
}

/// Filter for [`DnsApi::list_records`]; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    /// Exact owner name
    pub name: Option<String>,
    /// Record type
    pub record_type: Option<RecordType>,
    /// Exact content
    pub content: Option<String>,
}

impl RecordQuery {
    /// Match every record in the zone
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to an owner name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Restrict to a record type
    pub fn record_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    /// Restrict to an exact content value
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Whether `record` satisfies this query
    pub fn matches(&self, record: &Record) -> bool {
        self.name
            .as_ref()
            .is_none_or(|n| n.eq_ignore_ascii_case(&record.name))
            && self.record_type.is_none_or(|t| t == record.record_type)
            && self.content.as_ref().is_none_or(|c| *c == record.content)
    }
}

/// Quote a TXT value unless it already looks quoted.
///
/// Only the first and last characters are inspected: a value not starting
/// with `"` is quoted, and the result is quoted again if it still does not
/// end with `"`.
pub fn ensure_quoted(content: &str) -> String {
    let mut s = content.to_string();
    if s.is_empty() {
        return s;
    }
    if !s.starts_with('"') {
        s = quote(&s);
    }
    if !s.ends_with('"') {
        s = quote(&s);
    }
    s
}

/// Double-quote `s` with C-style escapes
///
/// `\a \b \f \n \r \t \v` get their short forms, other ASCII controls
/// become `\xHH`, and any other non-printable character becomes `\uHHHH` or
/// `\UHHHHHHHH`. Printable non-ASCII text is kept as is.
fn quote(s: &str) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{07}' => out.push_str("\\a"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0b}' => out.push_str("\\v"),
            c if is_printable(c) => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if (c as u32) < 0x10000 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => {
                let _ = write!(out, "\\U{:08x}", c as u32);
            }
        }
    }
    out.push('"');
    out
}

/// Letters, marks, numbers, punctuation, symbols and the ASCII space
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    !matches!(
        c as u32,
        // format characters
        0xad | 0x600..=0x605 | 0x61c | 0x6dd | 0x70f | 0x180e
            | 0x200b..=0x200f | 0x202a..=0x202e | 0x2060..=0x206f
            | 0xfeff | 0xfff9..=0xfffb | 0xe0001 | 0xe0020..=0xe007f
            // private use areas
            | 0xe000..=0xf8ff | 0xf0000..=0xffffd | 0x100000..=0x10fffd
            // noncharacters
            | 0xfdd0..=0xfdef | 0xfffe | 0xffff
    )
}

/// Trait for DNS provider implementations
///
/// Implementations operate on a single zone, resolved either from an explicit
/// zone ID or by looking the zone up by name.
///
/// # Trust Level: Untrusted
///
/// Providers make API calls to their own endpoints and nothing else. They do
/// not retry, cache across calls, or decide what should change; that belongs
/// to the reconciler.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Resolve the zone identity this API operates on
    async fn resolve_zone(&self) -> Result<String, crate::Error>;

    /// List records matching `query`
    ///
    /// Must follow pagination until exhausted and return records in page
    /// order.
    async fn list_records(&self, query: &RecordQuery) -> Result<Vec<Record>, crate::Error>;

    /// Fetch a single record by identity
    async fn get_record(&self, id: &str) -> Result<Record, crate::Error>;

    /// Create an MX record for `domain` pointing at `host`
    async fn create_mx_record(
        &self,
        domain: &str,
        host: &str,
        priority: u16,
    ) -> Result<(), crate::Error>;

    /// Create a record; TXT content is passed through [`ensure_quoted`]
    async fn create_record(&self, record: &Record) -> Result<(), crate::Error>;

    /// Replace an existing record in place
    ///
    /// Fails with [`crate::Error::InvalidRecordId`] if the record has no id.
    async fn update_record(&self, record: &Record) -> Result<(), crate::Error>;

    /// Delete a record by identity
    ///
    /// Fails with [`crate::Error::InvalidRecordId`] if `id` is empty.
    async fn delete_record(&self, id: &str) -> Result<(), crate::Error>;

    /// Provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS APIs from configuration
pub trait DnsApiFactory: Send + Sync {
    /// Create a DnsApi instance from configuration
    fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsApi>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotes_plain_text() {
        assert_eq!(ensure_quoted("hello world"), "\"hello world\"");
    }

    #[test]
    fn test_leaves_quoted_text() {
        assert_eq!(ensure_quoted("\"hello world\""), "\"hello world\"");
    }

    #[test]
    fn test_half_quoted_text_is_wrapped_again() {
        // starts with a quote but does not end with one
        assert_eq!(ensure_quoted("\"abc"), "\"\\\"abc\"");
        // ends with a quote but does not start with one
        assert_eq!(ensure_quoted("abc\""), "\"abc\\\"\"");
    }

    #[test]
    fn test_escapes() {
        assert_eq!(ensure_quoted("a\tb\u{7}"), "\"a\\tb\\a\"");
        assert_eq!(ensure_quoted("\u{1}\u{7f}"), "\"\\x01\\x7f\"");
        assert_eq!(ensure_quoted("\u{80}"), "\"\\u0080\"");
        assert_eq!(ensure_quoted("\u{a0}\u{200b}"), "\"\\u00a0\\u200b\"");
        assert_eq!(ensure_quoted("\u{f0000}"), "\"\\U000f0000\"");
        assert_eq!(ensure_quoted("café 😀"), "\"café 😀\"");
    }

    #[test]
    fn test_empty_stays_empty() {
        assert_eq!(ensure_quoted(""), "");
    }

    #[test]
    fn test_equivalence_ignores_identity() {
        let a = Record::new("example.com", RecordType::Txt, "v=spf1 mx ~all").with_id("1");
        let b = Record::new("EXAMPLE.com", RecordType::Txt, "v=spf1 mx ~all").with_ttl(300);
        assert!(a.is_equivalent(&b));
        assert_ne!(a, b);

        let c = Record::new("example.com", RecordType::Mx, "v=spf1 mx ~all");
        assert!(!a.is_equivalent(&c));
    }

    #[test]
    fn test_existing_id() {
        assert_eq!(Record::new("a", RecordType::A, "1.2.3.4").existing_id(), None);
        assert_eq!(Record::new("a", RecordType::A, "1.2.3.4").with_id("").existing_id(), None);
        assert_eq!(
            Record::new("a", RecordType::A, "1.2.3.4").with_id("abc").existing_id(),
            Some("abc")
        );
    }

    #[test]
    fn test_query_matches() {
        let rec = Record::new("_dmarc.example.com", RecordType::Txt, "v=DMARC1");
        assert!(RecordQuery::new().matches(&rec));
        assert!(RecordQuery::new().name("_dmarc.example.com").matches(&rec));
        assert!(!RecordQuery::new().record_type(RecordType::Mx).matches(&rec));
        assert!(!RecordQuery::new().content("other").matches(&rec));
    }

    #[test]
    fn test_record_type_parse() {
        assert_eq!("mx".parse::<RecordType>().unwrap(), RecordType::Mx);
        assert_eq!(RecordType::Aaaa.to_string(), "AAAA");
        assert!("SOA".parse::<RecordType>().is_err());
    }
}
