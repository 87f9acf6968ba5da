// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Operations on a single address book collection.

use std::collections::BTreeMap;

use reqwest::{Method, StatusCode, Url};

use crate::client::CardDavClient;
use crate::config::{Depth, ServerQuirks};
use crate::error::CardDavError;
use crate::http::{DavRequest, DavResponse, dav_method};
use crate::request::{
    AddressBookMultiGetRequest, AddressBookQueryRequest, Prop, QueryFilter, SyncCollectionRequest,
};
use crate::response::MultiStatusResponse;
use crate::types::{AddressBookProperties, AddressObject, ETag, Href, SyncToken};
use crate::vcard;

/// Attempts made by [`AddressBook::create_card`] before giving up on name
/// collisions.
const MAX_CREATE_ATTEMPTS: usize = 5;

const VCARD_CONTENT_TYPE: &str = "text/vcard; charset=utf-8";

/// Properties requested for the collection itself.
const COLLECTION_PROPS: [Prop; 8] = [
    Prop::DisplayName,
    Prop::ResourceType,
    Prop::GetCTag,
    Prop::SyncToken,
    Prop::AddMember,
    Prop::SupportedReportSet,
    Prop::AddressBookDescription,
    Prop::MaxResourceSize,
];

/// Result of an addressbook-query or addressbook-multiget REPORT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    /// Returned address objects by href.
    pub objects: BTreeMap<Href, AddressObject>,
    /// Requested hrefs the server reported as not found.
    pub missing: Vec<Href>,
    /// The server returned only part of the matching objects.
    pub truncated: bool,
}

/// A member of the collection as seen by a depth 1 PROPFIND.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// The href of the address object.
    pub href: Href,
    /// Its entity tag, if the server reported one.
    pub etag: Option<ETag>,
}

/// Collection properties together with its members.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Properties of the collection at the time of listing.
    pub properties: AddressBookProperties,
    /// Address objects in server order.
    pub members: Vec<Member>,
}

/// Result of [`AddressBook::create_card`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedCard {
    /// Where the server stored the card.
    pub href: Href,
    /// The new entity tag, if the server reported it.
    pub etag: Option<ETag>,
    /// The UID of the stored card.
    pub uid: String,
}

/// Handle to an address book collection.
///
/// Obtained from [`CardDavClient::address_book`] or
/// [`CardDavClient::address_book_at`].
#[derive(Debug, Clone)]
pub struct AddressBook {
    client: CardDavClient,
    url: Url,
    href: Href,
    quirks: ServerQuirks,
    properties: Option<AddressBookProperties>,
}

impl AddressBook {
    pub(crate) fn new(client: CardDavClient, mut url: Url) -> Self {
        // Members are resolved relative to the collection.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let href = Href::from(url.path());
        let quirks = client.config().quirks.clone();
        Self {
            client,
            url,
            href,
            quirks,
            properties: None,
        }
    }

    /// Overrides the account's server quirks for this collection.
    #[must_use]
    pub fn with_quirks(mut self, quirks: ServerQuirks) -> Self {
        self.quirks = quirks;
        self
    }

    /// Returns the server quirks in effect.
    #[must_use]
    pub const fn quirks(&self) -> &ServerQuirks {
        &self.quirks
    }

    /// Returns the absolute URL of the collection.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the path of the collection.
    #[must_use]
    pub const fn href(&self) -> &Href {
        &self.href
    }

    /// Returns the properties fetched by the last successful
    /// [`properties`](Self::properties) call.
    #[must_use]
    pub const fn cached_properties(&self) -> Option<&AddressBookProperties> {
        self.properties.as_ref()
    }

    /// Returns the collection properties, fetching them if they are not
    /// cached or if `force` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if PROPFIND fails. The cached snapshot is kept.
    pub async fn properties(
        &mut self,
        force: bool,
    ) -> Result<&AddressBookProperties, CardDavError> {
        if force || self.properties.is_none() {
            let fetched = self.fetch_properties().await?;
            self.properties = Some(fetched);
        }
        self.properties
            .as_ref()
            .ok_or_else(|| CardDavError::Protocol("Collection properties unavailable".to_string()))
    }

    async fn fetch_properties(&self) -> Result<AddressBookProperties, CardDavError> {
        let (multistatus, _) = self
            .client
            .propfind(&self.url, Depth::Zero, &COLLECTION_PROPS)
            .await?;

        // Some servers report the collection under a different spelling of
        // its href; with depth 0 a single response is unambiguous.
        let response = match multistatus.find(&self.href) {
            Some(response) => Some(response),
            None if multistatus.responses.len() == 1 => multistatus.responses.first(),
            None => None,
        };
        let props = response
            .and_then(|r| r.ok_props())
            .ok_or_else(|| {
                CardDavError::Protocol(format!("No properties returned for {}", self.href))
            })?;

        tracing::debug!(href = %self.href, ctag = ?props.ctag, "fetched collection properties");
        Ok(props.into())
    }

    /// Fetches one address object.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::NotFound`] if the card does not exist and
    /// [`CardDavError::Protocol`] if the server omits the `ETag`.
    pub async fn get_card(&self, href: &Href) -> Result<AddressObject, CardDavError> {
        let url = self.member_url(href)?;
        let resp = self
            .client
            .send(DavRequest::new(Method::GET, url.clone()).header("Accept", "text/vcard"))
            .await?;

        match resp.status {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(CardDavError::NotFound(href.clone())),
            status if status.is_success() => {
                let etag = resp.etag().ok_or_else(|| {
                    CardDavError::Protocol(format!("No ETag in response for {href}"))
                })?;
                Ok(AddressObject::new(href.clone(), etag, resp.body))
            }
            status => Err(unexpected(Method::GET, &url, status)),
        }
    }

    /// Stores a new card in the collection.
    ///
    /// A UID is generated if the card has none. If the collection advertises
    /// `DAV:add-member` the card is POSTed there and the server picks the
    /// name; otherwise it is PUT to a name derived from the UID, retrying
    /// with a random suffix when the name is taken.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Validation`] if mandatory properties are
    /// missing and [`CardDavError::Conflict`] if no free name was found.
    pub async fn create_card(&mut self, card: &str) -> Result<CreatedCard, CardDavError> {
        let (card, uid) = vcard::ensure_uid(card);
        vcard::validate(&card)?;

        let add_member = match self.properties(false).await {
            Ok(props) => {
                if let Some(max) = props.max_resource_size
                    && card.len() as u64 > max
                {
                    return Err(CardDavError::Validation(format!(
                        "Card size {} exceeds max-resource-size {max}",
                        card.len()
                    )));
                }
                props.add_member.clone()
            }
            Err(err) => {
                tracing::warn!(href = %self.href, error = %err, "could not read collection properties");
                None
            }
        };

        match add_member {
            Some(target) => self.post_card(&target, card, uid).await,
            None => self.put_new_card(card, uid).await,
        }
    }

    async fn post_card(
        &self,
        target: &Href,
        card: String,
        uid: String,
    ) -> Result<CreatedCard, CardDavError> {
        let url = self.member_url(target)?;
        let resp = self
            .client
            .send(
                DavRequest::new(Method::POST, url.clone())
                    .header("Content-Type", VCARD_CONTENT_TYPE)
                    .body(card),
            )
            .await?;

        if !resp.status.is_success() {
            return Err(unexpected(Method::POST, &url, resp.status));
        }
        let location = resp
            .header("Location")
            .ok_or_else(|| CardDavError::Protocol("No Location in POST response".to_string()))?;
        let href = resp.url.join(location).map_err(|e| {
            CardDavError::Protocol(format!("Invalid Location {location}: {e}"))
        })?;

        tracing::debug!(href = %href.path(), "created card via add-member");
        Ok(CreatedCard {
            href: Href::from(href.path()),
            etag: resp.etag(),
            uid,
        })
    }

    async fn put_new_card(&self, card: String, uid: String) -> Result<CreatedCard, CardDavError> {
        for attempt in 0..MAX_CREATE_ATTEMPTS {
            let suffix = (attempt > 0).then(|| {
                uuid::Uuid::new_v4()
                    .simple()
                    .to_string()
                    .chars()
                    .take(8)
                    .collect::<String>()
            });
            let name = vcard::file_name(&uid, suffix.as_deref());
            let url = self.member_url(&Href::from(name))?;

            let resp = self
                .client
                .send(
                    DavRequest::new(Method::PUT, url.clone())
                        .header("Content-Type", VCARD_CONTENT_TYPE)
                        .header("If-None-Match", "*")
                        .body(card.clone()),
                )
                .await?;

            match resp.status {
                StatusCode::PRECONDITION_FAILED => {
                    tracing::debug!(url = %url, attempt, "card name taken, retrying");
                }
                status if status.is_success() => {
                    tracing::debug!(url = %url, "created card");
                    return Ok(CreatedCard {
                        href: Href::from(url.path()),
                        etag: resp.etag(),
                        uid,
                    });
                }
                status => return Err(unexpected(Method::PUT, &url, status)),
            }
        }

        Err(CardDavError::Conflict(format!(
            "No free name for card {uid} after {MAX_CREATE_ATTEMPTS} attempts"
        )))
    }

    /// Replaces a card if it still has the entity tag `etag`.
    ///
    /// Returns the new entity tag, or `None` if the card changed on the
    /// server (412) or the server did not report the new tag. In both cases
    /// the caller has to fetch the card again.
    ///
    /// # Errors
    ///
    /// Returns an error if the card is invalid or the request fails.
    pub async fn update_card(
        &self,
        href: &Href,
        card: &str,
        etag: &ETag,
    ) -> Result<Option<ETag>, CardDavError> {
        vcard::validate(card)?;
        let url = self.member_url(href)?;
        let resp = self
            .client
            .send(
                DavRequest::new(Method::PUT, url.clone())
                    .header("Content-Type", VCARD_CONTENT_TYPE)
                    .header("If-Match", etag.as_str())
                    .body(card.to_string()),
            )
            .await?;

        match resp.status {
            StatusCode::PRECONDITION_FAILED => {
                tracing::debug!(%href, "card changed on server, update rejected");
                Ok(None)
            }
            status if status.is_success() => Ok(resp.etag()),
            status => Err(unexpected(Method::PUT, &url, status)),
        }
    }

    /// Deletes a card unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error unless the server answers 200 or 204.
    pub async fn delete_card(&self, href: &Href) -> Result<(), CardDavError> {
        self.delete(href, None).await
    }

    /// Deletes a card if it still has the entity tag `etag`.
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::Conflict`] if the card changed on the server.
    pub async fn delete_card_if_match(&self, href: &Href, etag: &ETag) -> Result<(), CardDavError> {
        self.delete(href, Some(etag)).await
    }

    async fn delete(&self, href: &Href, etag: Option<&ETag>) -> Result<(), CardDavError> {
        let url = self.member_url(href)?;
        let mut request = DavRequest::new(Method::DELETE, url.clone());
        if let Some(etag) = etag {
            request = request.header("If-Match", etag.as_str());
        }

        let resp = self.client.send(request).await?;
        match resp.status {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                tracing::debug!(%href, "deleted card");
                Ok(())
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(CardDavError::NotFound(href.clone())),
            StatusCode::PRECONDITION_FAILED => {
                Err(CardDavError::Conflict(format!("{href} changed on the server")))
            }
            status => Err(unexpected(Method::DELETE, &url, status)),
        }
    }

    /// Runs an addressbook-query REPORT.
    ///
    /// `card_props` restricts the returned vCards to the named properties;
    /// an empty slice requests full cards.
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    pub async fn query(
        &self,
        filter: &QueryFilter,
        card_props: &[String],
        limit: Option<u32>,
    ) -> Result<QueryResult, CardDavError> {
        let body = AddressBookQueryRequest::new(filter.clone())
            .card_props(card_props.iter().cloned())
            .limit(limit)
            .build()?;
        let multistatus = self.report(Depth::One, body).await?;

        let mut result = QueryResult::default();
        self.collect_objects(multistatus, &mut result);
        tracing::debug!(
            href = %self.href,
            count = result.objects.len(),
            truncated = result.truncated,
            "addressbook-query completed"
        );
        Ok(result)
    }

    /// Fetches several address objects with addressbook-multiget REPORTs.
    ///
    /// # Errors
    ///
    /// Returns an error if any REPORT fails.
    pub async fn multi_get(
        &self,
        hrefs: &[Href],
        card_props: &[String],
    ) -> Result<QueryResult, CardDavError> {
        let mut result = QueryResult::default();
        for batch in hrefs.chunks(self.quirks.multiget_batch_size.max(1)) {
            let mut request = AddressBookMultiGetRequest::new();
            request.set_card_props(card_props);
            for href in batch {
                request.add_href(href.clone());
            }
            let multistatus = self.report(Depth::Zero, request.build()?).await?;
            self.collect_objects(multistatus, &mut result);
        }
        Ok(result)
    }

    /// Lists the address objects of the collection with their entity tags.
    ///
    /// # Errors
    ///
    /// Returns an error if PROPFIND fails.
    pub async fn list_members(&self) -> Result<Listing, CardDavError> {
        let props = [Prop::ResourceType, Prop::GetETag, Prop::GetCTag, Prop::SyncToken];
        let (multistatus, _) = self.client.propfind(&self.url, Depth::One, &props).await?;

        let mut listing = Listing::default();
        for response in multistatus.responses {
            let Some(href) = response.href() else {
                continue;
            };
            let Some(props) = response.ok_props() else {
                tracing::debug!(%href, "skipping member without properties");
                continue;
            };
            if href.same_resource(&self.href) {
                listing.properties = props.into();
            } else if !props.is_collection() {
                listing.members.push(Member {
                    href: href.clone(),
                    etag: props.etag,
                });
            }
        }
        Ok(listing)
    }

    /// Runs a sync-collection REPORT starting at `token`.
    ///
    /// With `card_props` set, the report also returns `address-data`
    /// restricted to those properties (all of them if empty).
    ///
    /// # Errors
    ///
    /// Returns [`CardDavError::InvalidSyncToken`] if the server rejects a
    /// non-empty token.
    pub async fn sync_report(
        &self,
        token: &SyncToken,
        card_props: Option<&[String]>,
    ) -> Result<MultiStatusResponse, CardDavError> {
        let mut request = SyncCollectionRequest::new(token.clone());
        if let Some(props) = card_props {
            request = request.with_address_data(props.to_vec());
        }

        let resp = self
            .send_report(self.quirks.sync_collection_depth, request.build()?)
            .await?;
        match resp.status {
            StatusCode::MULTI_STATUS => MultiStatusResponse::from_xml(&resp.body),
            StatusCode::FORBIDDEN | StatusCode::CONFLICT if !token.is_empty() => {
                tracing::debug!(href = %self.href, status = ?resp.status, "sync token rejected");
                Err(CardDavError::InvalidSyncToken)
            }
            status if status.is_client_error()
                && !token.is_empty()
                && resp.body.contains("valid-sync-token") =>
            {
                Err(CardDavError::InvalidSyncToken)
            }
            status => Err(unexpected(report_method()?, &self.url, status)),
        }
    }

    async fn report(&self, depth: Depth, body: String) -> Result<MultiStatusResponse, CardDavError> {
        let resp = self.send_report(depth, body).await?;
        if resp.status != StatusCode::MULTI_STATUS {
            return Err(unexpected(report_method()?, &self.url, resp.status));
        }
        MultiStatusResponse::from_xml(&resp.body)
    }

    async fn send_report(&self, depth: Depth, body: String) -> Result<DavResponse, CardDavError> {
        let request = DavRequest::new(report_method()?, self.url.clone())
            .depth(depth)
            .xml_body(body);
        self.client.send(request).await
    }

    /// Sorts the responses of a query or multiget into `result`.
    fn collect_objects(&self, multistatus: MultiStatusResponse, result: &mut QueryResult) {
        for response in multistatus.responses {
            let Some(href) = response.href().cloned() else {
                continue;
            };
            if href.same_resource(&self.href) {
                if response.has_status(StatusCode::INSUFFICIENT_STORAGE) {
                    result.truncated = true;
                }
                continue;
            }
            if response.is_gone() {
                result.missing.extend(response.hrefs);
                continue;
            }

            match response.ok_props() {
                Some(props) => match (props.etag, props.address_data) {
                    (Some(etag), Some(card)) => {
                        result
                            .objects
                            .insert(href.clone(), AddressObject::new(href, etag, card));
                    }
                    _ => tracing::warn!(%href, "response lacks etag or address-data"),
                },
                None => tracing::warn!(%href, status = ?response.status_code(), "unexpected response"),
            }
        }
    }

    fn member_url(&self, href: &Href) -> Result<Url, CardDavError> {
        self.url
            .join(href.as_str())
            .map_err(|e| CardDavError::Protocol(format!("Invalid href {href}: {e}")))
    }
}

fn report_method() -> Result<Method, CardDavError> {
    dav_method("REPORT")
}

fn unexpected(method: Method, url: &Url, status: StatusCode) -> CardDavError {
    CardDavError::UnexpectedStatus {
        method,
        href: url.path().to_string(),
        status,
    }
}
