// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Address book integration tests with wiremock.

use std::sync::{Arc, Mutex};

use aimcal_carddav::{
    AddressBook, CardDavClient, CardDavConfig, CardDavError, DavRequest, DavResponse, ETag, Href,
    PropFilter, QueryFilter, ServerQuirks, SyncToken, TextMatch, Transport,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ETAG, HeaderMap, HeaderValue};
use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CARD: &str = "BEGIN:VCARD\r\nVERSION:4.0\r\nFN:Jane Doe\r\nUID:abc-123\r\nEND:VCARD\r\n";

const COLLECTION_PROPS: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:CS="http://calendarserver.org/ns/">
  <D:response>
    <D:href>/ab/</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>Contacts</D:displayname>
        <D:resourcetype><D:collection/></D:resourcetype>
        <CS:getctag>ctag-1</CS:getctag>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

fn address_book(server: &MockServer) -> AddressBook {
    let config = CardDavConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let client = CardDavClient::new(config).expect("Failed to create client");
    client.address_book("/ab/").expect("Failed to open address book")
}

async fn mount_collection_props(server: &MockServer, body: &str) {
    Mock::given(method("PROPFIND"))
        .and(path("/ab/"))
        .and(header("Depth", "0"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(body, "application/xml"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn addressbook_properties_are_cached() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/ab/"))
        .and(header("Depth", "0"))
        .and(header("Content-Type", "application/xml; charset=utf-8"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(COLLECTION_PROPS, "application/xml"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let mut book = address_book(&mock_server);
    assert!(book.cached_properties().is_none());

    let props = book.properties(false).await.expect("Failed to fetch properties");
    assert_eq!(props.display_name.as_deref(), Some("Contacts"));
    assert_eq!(props.ctag.as_deref(), Some("ctag-1"));
    assert!(!props.supports_sync_collection());

    book.properties(false).await.expect("Failed to read cached properties");
    book.properties(true).await.expect("Failed to refresh properties");
}

#[tokio::test]
async fn addressbook_properties_failure_keeps_cache() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/ab/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(COLLECTION_PROPS, "application/xml"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/ab/"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut book = address_book(&mock_server);
    book.properties(false).await.expect("Failed to fetch properties");

    let err = book.properties(true).await.expect_err("Refresh should fail");
    assert!(matches!(err, CardDavError::UnexpectedStatus { .. }));
    assert_eq!(
        book.cached_properties().and_then(|p| p.ctag.as_deref()),
        Some("ctag-1")
    );
}

#[tokio::test]
async fn addressbook_create_then_get_round_trip() {
    let mock_server = MockServer::start().await;
    mount_collection_props(&mock_server, COLLECTION_PROPS).await;

    Mock::given(method("PUT"))
        .and(path("/ab/abc-123.vcf"))
        .and(header("If-None-Match", "*"))
        .and(header("Content-Type", "text/vcard; charset=utf-8"))
        .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"e1\""))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ab/abc-123.vcf"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", "\"e1\"")
                .set_body_raw(CARD, "text/vcard"),
        )
        .mount(&mock_server)
        .await;

    let mut book = address_book(&mock_server);
    let created = book.create_card(CARD).await.expect("Failed to create card");
    assert_eq!(created.href.as_str(), "/ab/abc-123.vcf");
    assert_eq!(created.etag, Some(ETag::from("\"e1\"")));
    assert_eq!(created.uid, "abc-123");

    let object = book.get_card(&created.href).await.expect("Failed to get card");
    assert_eq!(object.card, CARD);
    assert_eq!(object.etag.as_str(), "\"e1\"");
}

#[tokio::test]
async fn addressbook_create_assigns_uid() {
    let mock_server = MockServer::start().await;
    mount_collection_props(&mock_server, COLLECTION_PROPS).await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/ab/[0-9a-f-]{36}\.vcf$"))
        .and(body_string_contains("UID:"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut book = address_book(&mock_server);
    let card = "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:No Uid\r\nEND:VCARD\r\n";
    let created = book.create_card(card).await.expect("Failed to create card");

    assert_eq!(created.uid.len(), 36);
    assert_eq!(created.href.as_str(), format!("/ab/{}.vcf", created.uid));
    assert_eq!(created.etag, None);
}

#[tokio::test]
async fn addressbook_create_retries_with_suffix() {
    let mock_server = MockServer::start().await;
    mount_collection_props(&mock_server, COLLECTION_PROPS).await;

    Mock::given(method("PUT"))
        .and(path("/ab/abc-123.vcf"))
        .respond_with(ResponseTemplate::new(412))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/ab/abc-123-[0-9a-f]{8}\.vcf$"))
        .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"e2\""))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut book = address_book(&mock_server);
    let created = book.create_card(CARD).await.expect("Failed to create card");

    assert!(created.href.as_str().starts_with("/ab/abc-123-"));
    assert_eq!(created.etag, Some(ETag::from("\"e2\"")));
}

#[tokio::test]
async fn addressbook_create_gives_up_after_five_collisions() {
    let mock_server = MockServer::start().await;
    mount_collection_props(&mock_server, COLLECTION_PROPS).await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/ab/.*\.vcf$"))
        .respond_with(ResponseTemplate::new(412))
        .expect(5)
        .mount(&mock_server)
        .await;

    let mut book = address_book(&mock_server);
    let err = book.create_card(CARD).await.expect_err("Create should fail");
    assert!(matches!(err, CardDavError::Conflict(_)));
}

#[tokio::test]
async fn addressbook_create_posts_to_add_member() {
    let mock_server = MockServer::start().await;
    let props = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/ab/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
        <D:add-member><D:href>/ab/;add-member</D:href></D:add-member>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;
    mount_collection_props(&mock_server, props).await;

    Mock::given(method("POST"))
        .and(path("/ab/;add-member"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("Location", "/ab/server-chosen.vcf")
                .insert_header("ETag", "\"p1\""),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut book = address_book(&mock_server);
    let created = book.create_card(CARD).await.expect("Failed to create card");

    assert_eq!(created.href.as_str(), "/ab/server-chosen.vcf");
    assert_eq!(created.etag, Some(ETag::from("\"p1\"")));
}

#[tokio::test]
async fn addressbook_create_rejects_invalid_card() {
    let mock_server = MockServer::start().await;

    let mut book = address_book(&mock_server);
    let card = "BEGIN:VCARD\r\nVERSION:4.0\r\nEMAIL:jane@example.com\r\nEND:VCARD\r\n";
    let err = book.create_card(card).await.expect_err("Create should fail");

    assert!(matches!(err, CardDavError::Validation(_)));
    let requests = mock_server.received_requests().await.unwrap_or_default();
    assert!(requests.is_empty());
}

#[tokio::test]
async fn addressbook_get_card_errors() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ab/missing.vcf"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ab/no-etag.vcf"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(CARD, "text/vcard"))
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server);

    let err = book
        .get_card(&Href::from("/ab/missing.vcf"))
        .await
        .expect_err("Get should fail");
    assert!(matches!(err, CardDavError::NotFound(href) if href.as_str() == "/ab/missing.vcf"));

    let err = book
        .get_card(&Href::from("/ab/no-etag.vcf"))
        .await
        .expect_err("Get should fail");
    assert!(matches!(err, CardDavError::Protocol(_)));
}

#[tokio::test]
async fn addressbook_update_card() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/ab/stale.vcf"))
        .and(header("If-Match", "\"old\""))
        .respond_with(ResponseTemplate::new(412))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/ab/fresh.vcf"))
        .and(header("If-Match", "\"v1\""))
        .respond_with(ResponseTemplate::new(204).insert_header("ETag", "\"v2\""))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/ab/rewritten.vcf"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server);

    let etag = book
        .update_card(&Href::from("/ab/stale.vcf"), CARD, &ETag::from("\"old\""))
        .await
        .expect("Failed to update card");
    assert_eq!(etag, None);

    let etag = book
        .update_card(&Href::from("/ab/fresh.vcf"), CARD, &ETag::from("\"v1\""))
        .await
        .expect("Failed to update card");
    assert_eq!(etag, Some(ETag::from("\"v2\"")));

    let etag = book
        .update_card(&Href::from("/ab/rewritten.vcf"), CARD, &ETag::from("\"v1\""))
        .await
        .expect("Failed to update card");
    assert_eq!(etag, None);
}

#[tokio::test]
async fn addressbook_delete_card() {
    let mock_server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/ab/jane.vcf"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/ab/changed.vcf"))
        .and(header("If-Match", "\"1\""))
        .respond_with(ResponseTemplate::new(412))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/ab/locked.vcf"))
        .respond_with(ResponseTemplate::new(423))
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server);

    book.delete_card(&Href::from("/ab/jane.vcf"))
        .await
        .expect("Failed to delete card");

    let err = book
        .delete_card_if_match(&Href::from("/ab/changed.vcf"), &ETag::from("\"1\""))
        .await
        .expect_err("Delete should fail");
    assert!(matches!(err, CardDavError::Conflict(_)));

    let err = book
        .delete_card(&Href::from("/ab/locked.vcf"))
        .await
        .expect_err("Delete should fail");
    assert!(matches!(err, CardDavError::UnexpectedStatus { status, .. } if status.as_u16() == 423));
}

#[tokio::test]
async fn addressbook_query_reports_truncation() {
    let mock_server = MockServer::start().await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(header("Depth", "1"))
        .and(body_string_contains("addressbook-query"))
        .and(body_string_contains("example.com"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:response>
    <D:href>/ab/jane.vcf</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"j1"</D:getetag>
        <C:address-data>BEGIN:VCARD
VERSION:4.0
FN:Jane Doe
EMAIL:jane@example.com
UID:jane
END:VCARD
</C:address-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/ab/</D:href>
    <D:status>HTTP/1.1 507 Insufficient Storage</D:status>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server);
    let filter = QueryFilter::any_of(vec![
        PropFilter::new("EMAIL").text_match(TextMatch::contains("example.com")),
    ]);
    let result = book
        .query(&filter, &[], Some(1))
        .await
        .expect("Failed to query");

    assert!(result.truncated);
    assert_eq!(result.objects.len(), 1);
    let object = result
        .objects
        .get(&Href::from("/ab/jane.vcf"))
        .expect("Missing card");
    assert_eq!(object.etag.as_str(), "\"j1\"");
    assert!(object.card.contains("EMAIL:jane@example.com"));
}

#[tokio::test]
async fn addressbook_multi_get_batches_and_reports_missing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(body_string_contains("addressbook-multiget"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:response>
    <D:href>/ab/a.vcf</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"a1"</D:getetag>
        <C:address-data>BEGIN:VCARD
FN:A
END:VCARD
</C:address-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/ab/gone.vcf</D:href>
    <D:status>HTTP/1.1 404 Not Found</D:status>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .expect(2)
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server).with_quirks(ServerQuirks {
        multiget_batch_size: 1,
        ..Default::default()
    });
    let result = book
        .multi_get(&[Href::from("/ab/a.vcf"), Href::from("/ab/gone.vcf")], &[])
        .await
        .expect("Failed to multiget");

    assert_eq!(result.objects.len(), 1);
    assert!(result.objects.contains_key(&Href::from("/ab/a.vcf")));
    assert!(result.missing.contains(&Href::from("/ab/gone.vcf")));
    assert!(!result.truncated);
}

#[tokio::test]
async fn addressbook_list_members_skips_collections() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/ab/"))
        .and(header("Depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:CS="http://calendarserver.org/ns/">
  <D:response>
    <D:href>/ab/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/></D:resourcetype>
        <CS:getctag>c7</CS:getctag>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/ab/b.vcf</D:href>
    <D:propstat>
      <D:prop><D:resourcetype/><D:getetag>"b1"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/ab/sub/</D:href>
    <D:propstat>
      <D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/ab/a.vcf</D:href>
    <D:propstat>
      <D:prop><D:getetag>"a1"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server);
    let listing = book.list_members().await.expect("Failed to list members");

    assert_eq!(listing.properties.ctag.as_deref(), Some("c7"));
    let hrefs: Vec<_> = listing.members.iter().map(|m| m.href.as_str()).collect();
    assert_eq!(hrefs, ["/ab/b.vcf", "/ab/a.vcf"]);
    assert_eq!(
        listing.members.first().and_then(|m| m.etag.clone()),
        Some(ETag::from("\"b1\""))
    );
}

#[tokio::test]
async fn addressbook_sync_report_rejected_token() {
    let mock_server = MockServer::start().await;
    Mock::given(method("REPORT"))
        .and(path("/ab/"))
        .and(header("Depth", "0"))
        .and(body_string_contains("sync-collection"))
        .respond_with(ResponseTemplate::new(403).set_body_raw(
            r#"<D:error xmlns:D="DAV:"><D:valid-sync-token/></D:error>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server);
    let err = book
        .sync_report(&SyncToken::from("http://example.com/sync/1"), None)
        .await
        .expect_err("Sync report should fail");
    assert!(matches!(err, CardDavError::InvalidSyncToken));
}

#[tokio::test]
async fn addressbook_redirect_limit() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ab/loop.vcf"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/ab/loop.vcf"))
        .expect(6)
        .mount(&mock_server)
        .await;

    let book = address_book(&mock_server);
    let err = book
        .get_card(&Href::from("/ab/loop.vcf"))
        .await
        .expect_err("Get should fail");
    assert!(matches!(err, CardDavError::TooManyRedirects(5)));
}

#[tokio::test]
async fn addressbook_redirect_keeps_method() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/old/"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/ab/"))
        .mount(&mock_server)
        .await;
    mount_collection_props(&mock_server, COLLECTION_PROPS).await;

    let config = CardDavConfig {
        base_url: mock_server.uri(),
        ..Default::default()
    };
    let client = CardDavClient::new(config).expect("Failed to create client");
    let mut book = client
        .address_book("/old/")
        .expect("Failed to open address book");

    let props = book.properties(false).await.expect("Failed to fetch properties");
    assert_eq!(props.display_name.as_deref(), Some("Contacts"));
}

/// Answers every request with `204 No Content` and a fixed `ETag`,
/// remembering what was sent.
#[derive(Debug, Default)]
struct RecordingTransport {
    requests: Mutex<Vec<DavRequest>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: DavRequest) -> Result<DavResponse, CardDavError> {
        let url = request.url.clone();
        self.requests
            .lock()
            .map_err(|e| CardDavError::Transport(e.to_string()))?
            .push(request);

        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"e2\""));
        Ok(DavResponse {
            status: StatusCode::NO_CONTENT,
            headers,
            body: String::new(),
            url,
        })
    }
}

#[tokio::test]
async fn address_book_custom_transport_receives_conditional_headers() {
    let transport = Arc::new(RecordingTransport::default());
    let config = CardDavConfig {
        base_url: "https://dav.example.com".to_string(),
        ..Default::default()
    };
    let client = CardDavClient::with_transport(config, transport.clone())
        .expect("Failed to create client");
    let book = client.address_book("/ab/").expect("Failed to open address book");

    let etag = book
        .update_card(&Href::from("/ab/abc-123.vcf"), CARD, &ETag::from("\"e1\""))
        .await
        .expect("Failed to update card");
    assert_eq!(etag, Some(ETag::from("\"e2\"")));

    let requests = transport.requests.lock().expect("Failed to lock requests");
    let request = requests.first().expect("No request sent");
    assert_eq!(request.method.as_str(), "PUT");
    assert_eq!(request.url.as_str(), "https://dav.example.com/ab/abc-123.vcf");
    assert_eq!(request.header_value("if-match"), Some("\"e1\""));
    assert!(
        request
            .header_value("content-type")
            .is_some_and(|v| v.starts_with("text/vcard"))
    );
    assert_eq!(request.body.as_deref(), Some(CARD));
}
