// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CardDAV` account client.

use std::sync::Arc;

use reqwest::{StatusCode, Url};

use crate::addressbook::AddressBook;
use crate::config::{CardDavConfig, Depth};
use crate::discovery::{Discovery, NoServiceResolver, ServiceResolver};
use crate::error::CardDavError;
use crate::http::{DavRequest, DavResponse, HttpTransport, Transport, dav_method};
use crate::request::{Prop, PropFindRequest};
use crate::response::MultiStatusResponse;
use crate::types::{AddressBookInfo, Href};

/// `CardDAV` client for one account.
///
/// Cloning is cheap: clones share the transport and configuration.
///
/// # Example
///
/// ```ignore
/// use aimcal_carddav::{AuthMethod, CardDavClient, CardDavConfig, MemoryCache, SyncOptions, SyncToken};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CardDavConfig {
///     base_url: "https://dav.example.com".to_string(),
///     auth: AuthMethod::Basic {
///         username: "user".to_string(),
///         password: "pass".to_string(),
///     },
///     ..Default::default()
/// };
///
/// let client = CardDavClient::new(config)?;
/// let books = client.discovery().discover("user@example.com").await;
/// let mut book = client.address_book_at(books[0].url.clone());
///
/// let mut cache = MemoryCache::default();
/// let outcome = aimcal_carddav::synchronize(
///     &mut book,
///     &SyncToken::empty(),
///     &mut cache,
///     &SyncOptions::default(),
/// )
/// .await?;
/// println!("next token: {}", outcome.token);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CardDavClient {
    transport: Arc<dyn Transport>,
    config: Arc<CardDavConfig>,
    base_url: Url,
}

impl CardDavClient {
    /// Creates a new `CardDAV` client using [`HttpTransport`].
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or HTTP client
    /// initialization fails.
    pub fn new(config: CardDavConfig) -> Result<Self, CardDavError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client on top of a custom transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn with_transport(
        config: CardDavConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CardDavError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| CardDavError::Config(format!("Invalid base URL {}: {e}", config.base_url)))?;
        Ok(Self {
            transport,
            config: Arc::new(config),
            base_url,
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CardDavConfig {
        &self.config
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves an href against the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the href cannot be joined to the base URL.
    pub fn resolve(&self, href: &str) -> Result<Url, CardDavError> {
        self.base_url
            .join(href)
            .map_err(|e| CardDavError::Config(format!("Invalid href {href}: {e}")))
    }

    /// Opens the address book at `href`, relative to the base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the href is invalid.
    pub fn address_book(&self, href: impl Into<Href>) -> Result<AddressBook, CardDavError> {
        let href = href.into();
        let url = self.resolve(href.as_str())?;
        Ok(self.address_book_at(url))
    }

    /// Opens the address book at an absolute URL, e.g. one returned by
    /// discovery.
    #[must_use]
    pub fn address_book_at(&self, url: Url) -> AddressBook {
        AddressBook::new(self.clone(), url)
    }

    /// Returns the discovery engine without DNS lookups.
    #[must_use]
    pub fn discovery(&self) -> Discovery {
        Discovery::new(self.clone(), Arc::new(NoServiceResolver))
    }

    /// Returns the discovery engine using `resolver` for DNS SRV/TXT lookups.
    #[must_use]
    pub fn discovery_with(&self, resolver: Arc<dyn ServiceResolver>) -> Discovery {
        Discovery::new(self.clone(), resolver)
    }

    /// Lists the address book collections below an address book home.
    ///
    /// # Errors
    ///
    /// Returns an error if PROPFIND fails.
    pub async fn list_address_books(
        &self,
        home: &Url,
    ) -> Result<Vec<AddressBookInfo>, CardDavError> {
        let props = [
            Prop::DisplayName,
            Prop::ResourceType,
            Prop::AddressBookDescription,
        ];
        let (multistatus, url) = self.propfind(home, Depth::One, &props).await?;

        let mut books = Vec::new();
        for response in multistatus.responses {
            let (Some(href), Some(props)) = (response.href(), response.ok_props()) else {
                continue;
            };
            if !props.is_addressbook() {
                continue;
            }
            let Ok(book_url) = url.join(href) else {
                tracing::warn!(%href, "skipping address book with invalid href");
                continue;
            };
            books.push(AddressBookInfo {
                url: book_url,
                href: href.clone(),
                display_name: props.display_name,
                description: props.addressbook_description,
            });
        }
        tracing::debug!(home = %home, count = books.len(), "listed address books");
        Ok(books)
    }

    /// Sends a request through the transport.
    pub(crate) async fn send(&self, request: DavRequest) -> Result<DavResponse, CardDavError> {
        self.transport.send(request).await
    }

    /// Issues a PROPFIND and parses the multistatus.
    ///
    /// Returns the parsed response and the URL that answered it, against
    /// which the returned hrefs resolve.
    pub(crate) async fn propfind(
        &self,
        url: &Url,
        depth: Depth,
        props: &[Prop],
    ) -> Result<(MultiStatusResponse, Url), CardDavError> {
        let method = dav_method("PROPFIND")?;
        let body = PropFindRequest::with_props(props).build()?;
        let resp = self
            .send(
                DavRequest::new(method.clone(), url.clone())
                    .depth(depth)
                    .xml_body(body),
            )
            .await?;

        if resp.status != StatusCode::MULTI_STATUS {
            return Err(CardDavError::UnexpectedStatus {
                method,
                href: url.to_string(),
                status: resp.status,
            });
        }
        let multistatus = MultiStatusResponse::from_xml(&resp.body)?;
        Ok((multistatus, resp.url))
    }
}
