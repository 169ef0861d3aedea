//! Contract Test: Cloudflare API client against a mock server
//!
//! Constraints verified:
//! - Listing follows pagination and preserves page order
//! - TXT content is quoted before it is sent, on create and update
//! - Single records are fetched and decoded by id
//! - Empty record ids are rejected without a request
//! - Zones are looked up by name once per client
//! - Dry-run never sends a write

use mailprov_core::traits::{DnsApi, Record, RecordQuery, RecordType};
use mailprov_provider_cloudflare::CloudflareApi;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ZONE: &str = "zone-123";

fn api(server: &MockServer, dry_run: bool) -> CloudflareApi {
    CloudflareApi::new("test-token", Some(ZONE.to_string()), None, dry_run)
        .unwrap()
        .with_base_url(server.uri())
}

fn txt(id: &str, content: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": "example.org",
        "type": "TXT",
        "content": content,
        "ttl": 1,
    })
}

fn page(records: Vec<serde_json::Value>, page: u32, total_pages: u32) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": records,
        "result_info": {
            "page": page,
            "per_page": 100,
            "total_pages": total_pages,
        },
    }))
}

fn ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "errors": [],
        "result": { "id": "new" },
    }))
}

#[tokio::test]
async fn listing_concatenates_pages_in_order() {
    let server = MockServer::start().await;
    let records_path = format!("/zones/{ZONE}/dns_records");
    for (n, ids) in [(1, ["a", "b"]), (2, ["c", "d"]), (3, ["e", "f"])] {
        Mock::given(method("GET"))
            .and(path(records_path.as_str()))
            .and(query_param("page", n.to_string()))
            .and(query_param("per_page", "100"))
            .and(query_param("type", "TXT"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(page(ids.iter().map(|id| txt(id, id)).collect(), n, 3))
            .expect(1)
            .mount(&server)
            .await;
    }

    let records = api(&server, false)
        .list_records(&RecordQuery::new().record_type(RecordType::Txt))
        .await
        .unwrap();

    let ids: Vec<_> = records.iter().map(|r| r.id.clone().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d", "e", "f"]);
}

#[tokio::test]
async fn unsupported_types_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/zones/{ZONE}/dns_records")))
        .respond_with(page(
            vec![
                txt("a", "v=spf1 mx ~all"),
                json!({"id": "b", "name": "example.org", "type": "CAA", "content": "0 issue \"letsencrypt.org\""}),
            ],
            1,
            1,
        ))
        .mount(&server)
        .await;

    let records = api(&server, false).list_records(&RecordQuery::new()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, RecordType::Txt);
}

#[tokio::test]
async fn create_txt_sends_quoted_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/zones/{ZONE}/dns_records")))
        .and(body_json(json!({
            "type": "TXT",
            "name": "example.org",
            "content": "\"hello world\"",
            "ttl": 1,
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    api(&server, false)
        .create_record(&Record::new("example.org", RecordType::Txt, "hello world"))
        .await
        .unwrap();
}

#[tokio::test]
async fn create_mx_sends_priority() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/zones/{ZONE}/dns_records")))
        .and(body_json(json!({
            "type": "MX",
            "name": "example.org",
            "content": "mx.example.org",
            "ttl": 1,
            "priority": 10,
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    api(&server, false)
        .create_mx_record("example.org", "mx.example.org", 10)
        .await
        .unwrap();
}

#[tokio::test]
async fn update_puts_quoted_txt_to_record_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("/zones/{ZONE}/dns_records/rec-9")))
        .and(header("authorization", "Bearer test-token"))
        .and(body_json(json!({
            "type": "TXT",
            "name": "example.org",
            "content": "\"v=spf1 mx ~all\"",
            "ttl": 300,
        })))
        .respond_with(ok())
        .expect(1)
        .mount(&server)
        .await;

    let record = Record::new("example.org", RecordType::Txt, "v=spf1 mx ~all")
        .with_id("rec-9")
        .with_ttl(300);
    api(&server, false).update_record(&record).await.unwrap();
}

#[tokio::test]
async fn get_record_decodes_mx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/zones/{ZONE}/dns_records/rec-1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": {
                "id": "rec-1",
                "name": "example.org",
                "type": "MX",
                "content": "mx.example.org",
                "ttl": 1,
                "priority": 10,
            },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = api(&server, false).get_record("rec-1").await.unwrap();
    assert_eq!(
        record,
        Record::new("example.org", RecordType::Mx, "mx.example.org")
            .with_id("rec-1")
            .with_ttl(1)
            .with_priority(10)
    );
}

#[tokio::test]
async fn empty_ids_are_rejected_locally() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ok())
        .expect(0)
        .mount(&server)
        .await;

    let api = api(&server, false);
    assert!(api.delete_record("").await.unwrap_err().is_invalid_record_id());
    assert!(api.get_record("").await.unwrap_err().is_invalid_record_id());
    let unsaved = Record::new("example.org", RecordType::Txt, "x");
    assert!(api.update_record(&unsaved).await.unwrap_err().is_invalid_record_id());
}

#[tokio::test]
async fn zone_looked_up_by_name_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "example.org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": [{ "id": "zone-by-name", "name": "example.org" }],
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/zones/zone-by-name/dns_records/rec-1"))
        .respond_with(ok())
        .expect(2)
        .mount(&server)
        .await;

    let api = CloudflareApi::new("test-token", None, Some("example.org".to_string()), false)
        .unwrap()
        .with_base_url(server.uri());

    assert_eq!(api.resolve_zone().await.unwrap(), "zone-by-name");
    api.delete_record("rec-1").await.unwrap();
    api.delete_record("rec-1").await.unwrap();
}

#[tokio::test]
async fn unknown_zone_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/zones"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": [],
        })))
        .mount(&server)
        .await;

    let api = CloudflareApi::new("test-token", None, Some("example.org".to_string()), false)
        .unwrap()
        .with_base_url(server.uri());

    assert!(api.resolve_zone().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn forbidden_maps_to_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/zones/{ZONE}/dns_records")))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let err = api(&server, false)
        .list_records(&RecordQuery::new())
        .await
        .unwrap_err();
    assert!(matches!(err, mailprov_core::Error::Authentication(_)));
    assert!(!err.to_string().contains("test-token"));
}

#[tokio::test]
async fn unsuccessful_envelope_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/zones/{ZONE}/dns_records")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "errors": [{ "code": 81057, "message": "Record already exists." }],
            "result": null,
        })))
        .mount(&server)
        .await;

    let err = api(&server, false)
        .create_record(&Record::new("example.org", RecordType::Txt, "x"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Record already exists. (81057)"));
}

#[tokio::test]
async fn dry_run_reads_but_never_writes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/zones/{ZONE}/dns_records")))
        .respond_with(page(vec![txt("a", "v=spf1 -all")], 1, 1))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ok())
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ok())
        .expect(0)
        .mount(&server)
        .await;

    let api = api(&server, true);
    assert!(api.is_dry_run());

    let listed = api.list_records(&RecordQuery::new()).await.unwrap();
    api.delete_record(listed[0].id.as_deref().unwrap()).await.unwrap();
    api.create_record(&Record::new("example.org", RecordType::Txt, "v=spf1 mx ~all"))
        .await
        .unwrap();
}
