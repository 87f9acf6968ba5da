// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsers for WebDAV/CardDAV operations.

use std::collections::BTreeMap;
use std::mem;

use quick_xml::events::{BytesStart, Event};
use reqwest::StatusCode;

use crate::error::CardDavError;
use crate::types::{AddressBookProperties, ETag, Href, SyncToken};
use crate::xml;

/// `WebDAV` multistatus response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// The response items, in document order.
    pub responses: Vec<ResponseItem>,
    /// Top-level `DAV:sync-token` of a sync-collection report.
    pub sync_token: Option<SyncToken>,
}

/// Individual response in multistatus.
#[derive(Debug, Clone, Default)]
pub struct ResponseItem {
    /// One href, or several sharing the same `status`.
    pub hrefs: Vec<Href>,
    /// Property groups with their status.
    pub prop_stats: Vec<PropStat>,
    /// Status line of the response itself, if given instead of propstats.
    pub status: Option<String>,
}

/// Property stat with status and value.
#[derive(Debug, Clone, Default)]
pub struct PropStat {
    /// The properties of this group.
    pub props: Properties,
    /// Status line, e.g. `HTTP/1.1 200 OK`.
    pub status: String,
}

/// WebDAV/CardDAV properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// `DAV:displayname`.
    pub display_name: Option<String>,
    /// Local names of the `DAV:resourcetype` children.
    pub resource_type: Option<Vec<String>>,
    /// `DAV:getetag`.
    pub etag: Option<ETag>,
    /// `CS:getctag`.
    pub ctag: Option<String>,
    /// `DAV:sync-token` as a property.
    pub sync_token: Option<String>,
    /// `CARDDAV:address-data`.
    pub address_data: Option<String>,
    /// `DAV:current-user-principal`.
    pub current_user_principal: Option<Href>,
    /// `CARDDAV:addressbook-home-set`.
    pub addressbook_home_set: Vec<Href>,
    /// `DAV:add-member`.
    pub add_member: Option<Href>,
    /// `CARDDAV:max-resource-size`.
    pub max_resource_size: Option<u64>,
    /// Local names of the reports in `DAV:supported-report-set`.
    pub supported_reports: Option<Vec<String>>,
    /// `CARDDAV:addressbook-description`.
    pub addressbook_description: Option<String>,
    /// Remaining properties by local name.
    pub other: BTreeMap<String, String>,
}

impl Properties {
    /// Returns `true` if the resource is a collection.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        self.has_resource_type("collection")
    }

    /// Returns `true` if the resource is an address book collection.
    #[must_use]
    pub fn is_addressbook(&self) -> bool {
        self.has_resource_type("addressbook")
    }

    fn has_resource_type(&self, name: &str) -> bool {
        self.resource_type
            .as_ref()
            .is_some_and(|types| types.iter().any(|t| t == name))
    }

    /// Fills properties missing here from `other`.
    fn merge(&mut self, other: Self) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }

        fill(&mut self.display_name, other.display_name);
        fill(&mut self.resource_type, other.resource_type);
        fill(&mut self.etag, other.etag);
        fill(&mut self.ctag, other.ctag);
        fill(&mut self.sync_token, other.sync_token);
        fill(&mut self.address_data, other.address_data);
        fill(&mut self.current_user_principal, other.current_user_principal);
        fill(&mut self.add_member, other.add_member);
        fill(&mut self.max_resource_size, other.max_resource_size);
        fill(&mut self.supported_reports, other.supported_reports);
        fill(&mut self.addressbook_description, other.addressbook_description);
        self.addressbook_home_set.extend(other.addressbook_home_set);
        for (name, value) in other.other {
            self.other.entry(name).or_insert(value);
        }
    }
}

impl From<Properties> for AddressBookProperties {
    fn from(props: Properties) -> Self {
        Self {
            display_name: props.display_name,
            description: props.addressbook_description,
            ctag: props.ctag,
            sync_token: props.sync_token,
            add_member: props.add_member,
            max_resource_size: props.max_resource_size,
            supported_reports: props.supported_reports.unwrap_or_default().into_iter().collect(),
            other: props.other,
        }
    }
}

/// Parses the status code out of a status line such as `HTTP/1.1 404 Not Found`.
#[must_use]
pub fn parse_status_line(line: &str) -> Option<StatusCode> {
    line.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
}

impl PropStat {
    /// Returns the parsed status code.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        parse_status_line(&self.status)
    }
}

impl ResponseItem {
    /// Returns the first href of the response.
    #[must_use]
    pub fn href(&self) -> Option<&Href> {
        self.hrefs.first()
    }

    /// Returns the status code of the response itself.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status.as_deref().and_then(parse_status_line)
    }

    /// Returns `true` if the response or any of its propstats carries `status`.
    #[must_use]
    pub fn has_status(&self, status: StatusCode) -> bool {
        self.status_code() == Some(status)
            || self.prop_stats.iter().any(|p| p.status_code() == Some(status))
    }

    /// Returns `true` if the resource is reported as gone (404 or 410).
    #[must_use]
    pub fn is_gone(&self) -> bool {
        let gone = |status: Option<StatusCode>| {
            matches!(status, Some(StatusCode::NOT_FOUND | StatusCode::GONE))
        };
        match self.status_code() {
            Some(status) => gone(Some(status)),
            None => {
                !self.prop_stats.is_empty()
                    && self.prop_stats.iter().all(|p| gone(p.status_code()))
            }
        }
    }

    /// Merges the properties of all successful propstats.
    ///
    /// Returns `None` if no propstat has a 2xx status.
    #[must_use]
    pub fn ok_props(&self) -> Option<Properties> {
        let mut merged: Option<Properties> = None;
        for prop_stat in &self.prop_stats {
            if !prop_stat.status_code().is_some_and(|s| s.is_success()) {
                continue;
            }
            match merged.as_mut() {
                Some(props) => props.merge(prop_stat.props.clone()),
                None => merged = Some(prop_stat.props.clone()),
            }
        }
        merged
    }
}

impl MultiStatusResponse {
    /// Parses multistatus response from XML.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not well-formed XML or its root is
    /// not `DAV:multistatus`.
    pub fn from_xml(xml: &str) -> Result<Self, CardDavError> {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().check_end_names = true;

        let mut parser = Parser::default();
        loop {
            let event = reader.read_event()?;
            match &event {
                Event::Start(e) => parser.start(e)?,
                Event::Empty(e) => {
                    parser.start(e)?;
                    parser.end();
                }
                Event::End(_) => parser.end(),
                Event::Text(_) | Event::CData(_) | Event::GeneralRef(_) => {
                    xml::push_text(&event, &mut parser.text)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !parser.stack.is_empty() {
            return Err(CardDavError::Xml("Unexpected end of document".to_string()));
        }
        if !parser.seen_root {
            return Err(CardDavError::Protocol(
                "Response is not a DAV:multistatus document".to_string(),
            ));
        }

        Ok(Self {
            responses: parser.responses,
            sync_token: parser.sync_token,
        })
    }

    /// Finds the response describing `href`.
    #[must_use]
    pub fn find(&self, href: &Href) -> Option<&ResponseItem> {
        self.responses
            .iter()
            .find(|r| r.hrefs.iter().any(|h| h.same_resource(href)))
    }
}

/// Event-driven multistatus parser keyed on the element path.
#[derive(Debug, Default)]
struct Parser {
    stack: Vec<String>,
    text: String,
    seen_root: bool,
    responses: Vec<ResponseItem>,
    sync_token: Option<SyncToken>,
    response: ResponseItem,
    prop_stat: PropStat,
    props: Properties,
}

impl Parser {
    fn within(&self, name: &str) -> bool {
        self.stack.iter().any(|n| n == name)
    }

    fn start(&mut self, e: &BytesStart<'_>) -> Result<(), CardDavError> {
        let name = std::str::from_utf8(e.local_name().into_inner())
            .map_err(|err| CardDavError::Xml(format!("UTF-8 error: {err}")))?
            .to_string();
        let parent = self.stack.last().cloned();
        self.stack.push(name.clone());
        self.text.clear();

        match (name.as_str(), parent.as_deref()) {
            ("multistatus", None) => self.seen_root = true,
            ("response", Some("multistatus")) => self.response = ResponseItem::default(),
            ("propstat", Some("response")) => self.prop_stat = PropStat::default(),
            ("prop", Some("propstat")) => self.props = Properties::default(),
            ("resourcetype", Some("prop")) => self.props.resource_type = Some(Vec::new()),
            ("supported-report-set", Some("prop")) => {
                self.props.supported_reports = Some(Vec::new());
            }
            (_, Some("resourcetype")) => {
                self.props.resource_type.get_or_insert_with(Vec::new).push(name);
            }
            (_, Some("report")) if self.within("supported-report-set") => {
                self.props.supported_reports.get_or_insert_with(Vec::new).push(name);
            }
            _ => {}
        }
        Ok(())
    }

    fn end(&mut self) {
        let Some(name) = self.stack.pop() else {
            return;
        };
        let parent = self.stack.last().cloned();
        let text = mem::take(&mut self.text);
        let value = text.trim();

        match (name.as_str(), parent.as_deref()) {
            ("response", Some("multistatus")) => {
                self.responses.push(mem::take(&mut self.response));
            }
            ("sync-token", Some("multistatus")) => {
                self.sync_token = Some(SyncToken::from(value));
            }
            ("href", Some("response")) => self.response.hrefs.push(Href::from(value)),
            ("status", Some("response")) => self.response.status = Some(value.to_string()),
            ("propstat", Some("response")) => {
                self.response.prop_stats.push(mem::take(&mut self.prop_stat));
            }
            ("status", Some("propstat")) => self.prop_stat.status = value.to_string(),
            ("prop", Some("propstat")) => self.prop_stat.props = mem::take(&mut self.props),
            ("href", Some("current-user-principal")) => {
                self.props.current_user_principal = Some(Href::from(value));
            }
            ("href", Some("addressbook-home-set")) => {
                self.props.addressbook_home_set.push(Href::from(value));
            }
            ("href", Some("add-member")) => self.props.add_member = Some(Href::from(value)),
            (property, Some("prop")) if self.within("propstat") => {
                self.set_property(property, &text);
            }
            _ => {}
        }
    }

    fn set_property(&mut self, name: &str, text: &str) {
        let value = text.trim();
        let props = &mut self.props;
        match name {
            "displayname" => props.display_name = Some(value.to_string()),
            "getetag" => props.etag = Some(ETag::from(value)),
            "getctag" => props.ctag = Some(value.to_string()),
            "sync-token" => props.sync_token = Some(value.to_string()),
            "addressbook-description" => {
                props.addressbook_description = Some(value.to_string());
            }
            "max-resource-size" => props.max_resource_size = value.parse().ok(),
            "address-data" => {
                let data = text.trim_start().trim_end_matches([' ', '\t']);
                props.address_data = Some(data.to_string());
            }
            "resourcetype"
            | "supported-report-set"
            | "current-user-principal"
            | "addressbook-home-set"
            | "add-member" => {}
            other => {
                props.other.insert(other.to_string(), value.to_string());
            }
        }
    }
}
