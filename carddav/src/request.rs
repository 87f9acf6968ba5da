// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request builders for `CardDAV` operations.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::CardDavError;
use crate::types::{Href, SyncToken};
use crate::xml::{self, XmlWriter, ns};

/// PROPFIND request builder.
#[derive(Debug, Default)]
pub struct PropFindRequest {
    props: Vec<Prop>,
}

/// Properties to request in PROPFIND.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop {
    /// Display name.
    DisplayName,
    /// Resource type.
    ResourceType,
    /// `ETag`.
    GetETag,
    /// Collection change tag.
    GetCTag,
    /// Collection sync token.
    SyncToken,
    /// POST target for new members.
    AddMember,
    /// Supported REPORT methods.
    SupportedReportSet,
    /// Principal of the authenticated user.
    CurrentUserPrincipal,
    /// Address book home set.
    AddressBookHomeSet,
    /// Address book description.
    AddressBookDescription,
    /// Maximum size of an address object.
    MaxResourceSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Dav,
    CardDav,
    CalendarServer,
}

impl Namespace {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Dav => "D",
            Self::CardDav => "C",
            Self::CalendarServer => "CS",
        }
    }

    const fn uri(self) -> &'static str {
        match self {
            Self::Dav => ns::DAV,
            Self::CardDav => ns::CARDDAV,
            Self::CalendarServer => ns::CALENDARSERVER,
        }
    }
}

impl Prop {
    const fn name(self) -> &'static str {
        match self {
            Self::DisplayName => "displayname",
            Self::ResourceType => "resourcetype",
            Self::GetETag => "getetag",
            Self::GetCTag => "getctag",
            Self::SyncToken => "sync-token",
            Self::AddMember => "add-member",
            Self::SupportedReportSet => "supported-report-set",
            Self::CurrentUserPrincipal => "current-user-principal",
            Self::AddressBookHomeSet => "addressbook-home-set",
            Self::AddressBookDescription => "addressbook-description",
            Self::MaxResourceSize => "max-resource-size",
        }
    }

    const fn namespace(self) -> Namespace {
        match self {
            Self::DisplayName
            | Self::ResourceType
            | Self::GetETag
            | Self::SyncToken
            | Self::AddMember
            | Self::SupportedReportSet
            | Self::CurrentUserPrincipal => Namespace::Dav,
            Self::AddressBookHomeSet
            | Self::AddressBookDescription
            | Self::MaxResourceSize => Namespace::CardDav,
            Self::GetCTag => Namespace::CalendarServer,
        }
    }
}

impl PropFindRequest {
    /// Creates a new PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self { props: Vec::new() }
    }

    /// Creates a request for the given properties.
    #[must_use]
    pub fn with_props(props: &[Prop]) -> Self {
        Self {
            props: props.to_vec(),
        }
    }

    /// Adds a property to the request.
    pub fn add_property(&mut self, prop: Prop) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Builds the XML body for the PROPFIND request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = xml::writer();

        // <D:propfind xmlns:D="DAV:" ...>
        let mut propfind = BytesStart::new("D:propfind");
        propfind.push_attribute(("xmlns:D", ns::DAV));
        for namespace in [Namespace::CardDav, Namespace::CalendarServer] {
            if self.props.iter().any(|p| p.namespace() == namespace) {
                let attr = format!("xmlns:{}", namespace.prefix());
                propfind.push_attribute((attr.as_str(), namespace.uri()));
            }
        }
        writer.write_event(Event::Start(propfind))?;

        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        for prop in &self.props {
            let name = format!("{}:{}", prop.namespace().prefix(), prop.name());
            writer.write_event(Event::Empty(BytesStart::new(name)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        writer.write_event(Event::End(BytesEnd::new("D:propfind")))?;
        xml::finish(writer)
    }
}

/// Combination of the conditions inside a filter (RFC 6352 10.5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FilterTest {
    /// Any condition must match.
    #[default]
    AnyOf,
    /// All conditions must match.
    AllOf,
}

impl FilterTest {
    const fn as_str(self) -> &'static str {
        match self {
            Self::AnyOf => "anyof",
            Self::AllOf => "allof",
        }
    }
}

/// How a text-match compares against the property value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchType {
    /// Whole value equals the text.
    Equals,
    /// Value contains the text.
    #[default]
    Contains,
    /// Value starts with the text.
    StartsWith,
    /// Value ends with the text.
    EndsWith,
}

impl MatchType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::StartsWith => "starts-with",
            Self::EndsWith => "ends-with",
        }
    }
}

/// Text match filter for address book queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMatch {
    /// Text to search for.
    pub text: String,
    /// Comparison mode.
    pub match_type: MatchType,
    /// Collation to use, `i;unicode-casemap` if unset.
    pub collation: Option<String>,
    /// Whether to negate the match.
    pub negate: bool,
}

impl TextMatch {
    /// Creates a text match with the given comparison.
    #[must_use]
    pub fn new(text: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            text: text.into(),
            match_type,
            collation: None,
            negate: false,
        }
    }

    /// Matches values containing `text`.
    #[must_use]
    pub fn contains(text: impl Into<String>) -> Self {
        Self::new(text, MatchType::Contains)
    }

    /// Matches values equal to `text`.
    #[must_use]
    pub fn equals(text: impl Into<String>) -> Self {
        Self::new(text, MatchType::Equals)
    }

    /// Negates the match.
    #[must_use]
    pub const fn negate(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Sets the collation.
    #[must_use]
    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.collation = Some(collation.into());
        self
    }

    fn write(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        let mut elem = BytesStart::new("C:text-match");
        elem.push_attribute((
            "collation",
            self.collation.as_deref().unwrap_or("i;unicode-casemap"),
        ));
        elem.push_attribute(("match-type", self.match_type.as_str()));
        if self.negate {
            elem.push_attribute(("negate-condition", "yes"));
        }
        writer.write_event(Event::Start(elem))?;
        writer.write_event(Event::Text(BytesText::new(&self.text)))?;
        writer.write_event(Event::End(BytesEnd::new("C:text-match")))?;
        Ok(())
    }
}

/// Condition on a property parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamCondition {
    /// The parameter is present.
    Defined,
    /// The parameter is absent.
    NotDefined,
    /// The parameter value matches.
    TextMatch(TextMatch),
}

/// Filter on a parameter of a vCard property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamFilter {
    /// Parameter name, e.g. `TYPE`.
    pub name: String,
    /// Condition on the parameter.
    pub condition: ParamCondition,
}

impl ParamFilter {
    /// Creates a parameter filter.
    #[must_use]
    pub fn new(name: impl Into<String>, condition: ParamCondition) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }

    fn write(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        let mut elem = BytesStart::new("C:param-filter");
        elem.push_attribute(("name", self.name.as_str()));
        match &self.condition {
            ParamCondition::Defined => writer.write_event(Event::Empty(elem))?,
            ParamCondition::NotDefined => {
                writer.write_event(Event::Start(elem))?;
                writer.write_event(Event::Empty(BytesStart::new("C:is-not-defined")))?;
                writer.write_event(Event::End(BytesEnd::new("C:param-filter")))?;
            }
            ParamCondition::TextMatch(text_match) => {
                writer.write_event(Event::Start(elem))?;
                text_match.write(writer)?;
                writer.write_event(Event::End(BytesEnd::new("C:param-filter")))?;
            }
        }
        Ok(())
    }
}

/// Filter on one vCard property.
///
/// Without conditions the filter matches cards that have the property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropFilter {
    /// Property name, e.g. `EMAIL`.
    pub name: String,
    /// Combination of the conditions below.
    pub test: FilterTest,
    /// Matches cards without the property; excludes the other conditions.
    pub is_not_defined: bool,
    /// Conditions on the property value.
    pub text_matches: Vec<TextMatch>,
    /// Conditions on the property parameters.
    pub param_filters: Vec<ParamFilter>,
}

impl PropFilter {
    /// Matches cards that have the property.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            test: FilterTest::AnyOf,
            is_not_defined: false,
            text_matches: Vec::new(),
            param_filters: Vec::new(),
        }
    }

    /// Matches cards that lack the property.
    #[must_use]
    pub fn not_defined(name: impl Into<String>) -> Self {
        Self {
            is_not_defined: true,
            ..Self::new(name)
        }
    }

    /// Adds a text match on the property value.
    #[must_use]
    pub fn text_match(mut self, text_match: TextMatch) -> Self {
        self.text_matches.push(text_match);
        self
    }

    /// Adds a parameter filter.
    #[must_use]
    pub fn param(mut self, param: ParamFilter) -> Self {
        self.param_filters.push(param);
        self
    }

    /// Requires all conditions to match.
    #[must_use]
    pub const fn all_of(mut self) -> Self {
        self.test = FilterTest::AllOf;
        self
    }

    fn write(&self, writer: &mut XmlWriter) -> Result<(), CardDavError> {
        let mut elem = BytesStart::new("C:prop-filter");
        elem.push_attribute(("name", self.name.as_str()));
        elem.push_attribute(("test", self.test.as_str()));

        if self.is_not_defined {
            writer.write_event(Event::Start(elem))?;
            writer.write_event(Event::Empty(BytesStart::new("C:is-not-defined")))?;
            writer.write_event(Event::End(BytesEnd::new("C:prop-filter")))?;
            return Ok(());
        }
        if self.text_matches.is_empty() && self.param_filters.is_empty() {
            writer.write_event(Event::Empty(elem))?;
            return Ok(());
        }

        writer.write_event(Event::Start(elem))?;
        for text_match in &self.text_matches {
            text_match.write(writer)?;
        }
        for param in &self.param_filters {
            param.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:prop-filter")))?;
        Ok(())
    }
}

/// Filter tree of an addressbook-query REPORT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryFilter {
    /// Combination of the property filters.
    pub test: FilterTest,
    /// Property filters. An empty list matches every card.
    pub prop_filters: Vec<PropFilter>,
}

impl QueryFilter {
    /// Matches cards satisfying any of the filters.
    #[must_use]
    pub const fn any_of(prop_filters: Vec<PropFilter>) -> Self {
        Self {
            test: FilterTest::AnyOf,
            prop_filters,
        }
    }

    /// Matches cards satisfying all of the filters.
    #[must_use]
    pub const fn all_of(prop_filters: Vec<PropFilter>) -> Self {
        Self {
            test: FilterTest::AllOf,
            prop_filters,
        }
    }

    /// Sets whether all filters must match.
    #[must_use]
    pub const fn match_all(mut self, match_all: bool) -> Self {
        self.test = if match_all {
            FilterTest::AllOf
        } else {
            FilterTest::AnyOf
        };
        self
    }
}

/// Address book query request builder.
#[derive(Debug, Default)]
pub struct AddressBookQueryRequest {
    filter: QueryFilter,
    card_props: Vec<String>,
    limit: Option<u32>,
}

impl AddressBookQueryRequest {
    /// Creates a query with the given filter.
    #[must_use]
    pub fn new(filter: QueryFilter) -> Self {
        Self {
            filter,
            card_props: Vec::new(),
            limit: None,
        }
    }

    /// Restricts the returned vCards to the named properties.
    #[must_use]
    pub fn card_props<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.card_props = props.into_iter().map(Into::into).collect();
        self
    }

    /// Limits the number of results.
    #[must_use]
    pub const fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Builds the XML body for the addressbook-query request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = xml::writer();

        // <C:addressbook-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:carddav">
        let mut query = BytesStart::new("C:addressbook-query");
        query.push_attribute(("xmlns:D", ns::DAV));
        query.push_attribute(("xmlns:C", ns::CARDDAV));
        writer.write_event(Event::Start(query))?;

        write_object_props(&mut writer, Some(self.card_props.as_slice()))?;

        let mut filter = BytesStart::new("C:filter");
        filter.push_attribute(("test", self.filter.test.as_str()));
        if self.filter.prop_filters.is_empty() {
            writer.write_event(Event::Empty(filter))?;
        } else {
            writer.write_event(Event::Start(filter))?;
            for prop_filter in &self.filter.prop_filters {
                prop_filter.write(&mut writer)?;
            }
            writer.write_event(Event::End(BytesEnd::new("C:filter")))?;
        }

        if let Some(limit) = self.limit {
            writer.write_event(Event::Start(BytesStart::new("C:limit")))?;
            xml::write_text_element(&mut writer, "C:nresults", &limit.to_string())?;
            writer.write_event(Event::End(BytesEnd::new("C:limit")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("C:addressbook-query")))?;
        xml::finish(writer)
    }
}

/// Address book multiget request builder.
#[derive(Debug, Default)]
pub struct AddressBookMultiGetRequest {
    hrefs: Vec<Href>,
    card_props: Vec<String>,
}

impl AddressBookMultiGetRequest {
    /// Creates a new multiget request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an href to the request.
    pub fn add_href(&mut self, href: Href) -> &mut Self {
        self.hrefs.push(href);
        self
    }

    /// Restricts the returned vCards to the named properties.
    pub fn set_card_props(&mut self, props: &[String]) -> &mut Self {
        self.card_props = props.to_vec();
        self
    }

    /// Builds the XML body for the addressbook-multiget request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = xml::writer();

        let mut multiget = BytesStart::new("C:addressbook-multiget");
        multiget.push_attribute(("xmlns:D", ns::DAV));
        multiget.push_attribute(("xmlns:C", ns::CARDDAV));
        writer.write_event(Event::Start(multiget))?;

        write_object_props(&mut writer, Some(self.card_props.as_slice()))?;

        for href in &self.hrefs {
            xml::write_text_element(&mut writer, "D:href", href.as_str())?;
        }

        writer.write_event(Event::End(BytesEnd::new("C:addressbook-multiget")))?;
        xml::finish(writer)
    }
}

/// Sync-collection REPORT builder (RFC 6578).
#[derive(Debug)]
pub struct SyncCollectionRequest {
    token: SyncToken,
    card_props: Option<Vec<String>>,
}

impl SyncCollectionRequest {
    /// Creates a request continuing from `token`; an empty token asks for
    /// the full collection state.
    #[must_use]
    pub const fn new(token: SyncToken) -> Self {
        Self {
            token,
            card_props: None,
        }
    }

    /// Also requests `address-data` restricted to the named properties.
    #[must_use]
    pub fn with_address_data(mut self, props: Vec<String>) -> Self {
        self.card_props = Some(props);
        self
    }

    /// Builds the XML body for the sync-collection request.
    ///
    /// # Errors
    ///
    /// Returns an error if XML building fails.
    pub fn build(&self) -> Result<String, CardDavError> {
        let mut writer = xml::writer();

        let mut sync = BytesStart::new("D:sync-collection");
        sync.push_attribute(("xmlns:D", ns::DAV));
        sync.push_attribute(("xmlns:C", ns::CARDDAV));
        writer.write_event(Event::Start(sync))?;

        if self.token.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new("D:sync-token")))?;
        } else {
            xml::write_text_element(&mut writer, "D:sync-token", self.token.as_str())?;
        }
        xml::write_text_element(&mut writer, "D:sync-level", "1")?;

        write_object_props(&mut writer, self.card_props.as_deref())?;

        writer.write_event(Event::End(BytesEnd::new("D:sync-collection")))?;
        xml::finish(writer)
    }
}

/// Writes `<D:prop>` with `getetag` and, if `card_props` is set,
/// `address-data` limited to those vCard properties.
fn write_object_props(
    writer: &mut XmlWriter,
    card_props: Option<&[String]>,
) -> Result<(), CardDavError> {
    writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
    writer.write_event(Event::Empty(BytesStart::new("D:getetag")))?;
    match card_props {
        None => {}
        Some([]) => writer.write_event(Event::Empty(BytesStart::new("C:address-data")))?,
        Some(props) => {
            writer.write_event(Event::Start(BytesStart::new("C:address-data")))?;
            for name in props {
                let mut prop = BytesStart::new("C:prop");
                prop.push_attribute(("name", name.as_str()));
                writer.write_event(Event::Empty(prop))?;
            }
            writer.write_event(Event::End(BytesEnd::new("C:address-data")))?;
        }
    }
    writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
    Ok(())
}
