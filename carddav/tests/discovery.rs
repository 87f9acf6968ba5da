// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Discovery integration tests with wiremock.

use aimcal_carddav::{CardDavClient, CardDavConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_principal_chain(server: &MockServer, context: &str) {
    Mock::given(method("PROPFIND"))
        .and(path(context))
        .and(header("Depth", "0"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/</D:href>
    <D:propstat>
      <D:prop>
        <D:current-user-principal><D:href>/principals/jane/</D:href></D:current-user-principal>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(server)
        .await;

    Mock::given(method("PROPFIND"))
        .and(path("/principals/jane/"))
        .and(header("Depth", "0"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:response>
    <D:href>/principals/jane/</D:href>
    <D:propstat>
      <D:prop>
        <C:addressbook-home-set><D:href>/ab/jane/</D:href></C:addressbook-home-set>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(server)
        .await;

    Mock::given(method("PROPFIND"))
        .and(path("/ab/jane/"))
        .and(header("Depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:response>
    <D:href>/ab/jane/</D:href>
    <D:propstat>
      <D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/ab/jane/contacts/</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>Contacts</D:displayname>
        <D:resourcetype><D:collection/><C:addressbook/></D:resourcetype>
        <C:addressbook-description>Personal</C:addressbook-description>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/ab/jane/inbox/</D:href>
    <D:propstat>
      <D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> CardDavClient {
    let config = CardDavConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    CardDavClient::new(config).expect("Failed to create client")
}

#[tokio::test]
async fn discovery_follows_principal_chain() {
    let mock_server = MockServer::start().await;
    mount_principal_chain(&mock_server, "/dav/").await;

    let books = client(&mock_server)
        .discovery()
        .discover(&format!("{}/dav/", mock_server.uri()))
        .await;

    assert_eq!(books.len(), 1);
    let book = books.first().expect("No address book");
    assert_eq!(book.href.as_str(), "/ab/jane/contacts/");
    assert_eq!(book.url.path(), "/ab/jane/contacts/");
    assert_eq!(book.display_name.as_deref(), Some("Contacts"));
    assert_eq!(book.description.as_deref(), Some("Personal"));
}

#[tokio::test]
async fn discovery_follows_well_known_redirect() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/.well-known/carddav"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/dav/"))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_principal_chain(&mock_server, "/dav/").await;

    let books = client(&mock_server)
        .discovery()
        .discover(&format!("{}/.well-known/carddav", mock_server.uri()))
        .await;

    let hrefs: Vec<_> = books.iter().map(|b| b.href.as_str()).collect();
    assert_eq!(hrefs, ["/ab/jane/contacts/"]);
}

#[tokio::test]
async fn discovery_skips_failing_home() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/</D:href>
    <D:propstat>
      <D:prop>
        <D:current-user-principal><D:href>/principals/jane/</D:href></D:current-user-principal>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/principals/jane/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:response>
    <D:href>/principals/jane/</D:href>
    <D:propstat>
      <D:prop>
        <C:addressbook-home-set>
          <D:href>/ab/shared/</D:href>
          <D:href>/ab/jane/</D:href>
        </C:addressbook-home-set>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/ab/shared/"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/ab/jane/"))
        .and(header("Depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
  <D:response>
    <D:href>/ab/jane/contacts/</D:href>
    <D:propstat>
      <D:prop>
        <D:displayname>Contacts</D:displayname>
        <D:resourcetype><D:collection/><C:addressbook/></D:resourcetype>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let books = client(&mock_server)
        .discovery()
        .discover(&format!("{}/dav/", mock_server.uri()))
        .await;

    let hrefs: Vec<_> = books.iter().map(|b| b.href.as_str()).collect();
    assert_eq!(hrefs, ["/ab/jane/contacts/"]);
}

#[tokio::test]
async fn discovery_without_principal_finds_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/</D:href>
    <D:propstat>
      <D:prop><D:current-user-principal/></D:prop>
      <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let books = client(&mock_server)
        .discovery()
        .discover(&format!("{}/dav/", mock_server.uri()))
        .await;

    assert!(books.is_empty());
}

#[tokio::test]
async fn discovery_without_home_set_finds_nothing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PROPFIND"))
        .and(path("/dav/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/</D:href>
    <D:propstat>
      <D:prop>
        <D:current-user-principal><D:href>/principals/jane/</D:href></D:current-user-principal>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("PROPFIND"))
        .and(path("/principals/jane/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/principals/jane/</D:href>
    <D:propstat>
      <D:prop><D:displayname>Jane</D:displayname></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let books = client(&mock_server)
        .discovery()
        .discover(&format!("{}/dav/", mock_server.uri()))
        .await;

    assert!(books.is_empty());
}
