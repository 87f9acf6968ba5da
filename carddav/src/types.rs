// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Deref;

use percent_encoding::percent_decode_str;
use reqwest::Url;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new `", stringify!($name), "` from a string.")]
            #[must_use]
            pub const fn new(value: String) -> Self {
                Self(value)
            }

            /// Returns the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the value, returning the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_newtype!(
    /// Resource href (path) as reported by the server.
    ///
    /// Usually an absolute path such as `/dav/addressbooks/user/default/1.vcf`,
    /// but servers may also report full URLs.
    Href
);

string_newtype!(
    /// Entity tag identifying one version of a resource.
    ETag
);

string_newtype!(
    /// Opaque synchronization cursor returned by [`synchronize`](crate::synchronize).
    ///
    /// An empty token requests a full initial synchronization. Tokens issued
    /// by the server are never interpreted. For collections without
    /// sync-collection support the token is a marker derived from the
    /// collection's ctag, which only this crate reads back.
    SyncToken
);

const CTAG_MARKER: &str = "x-aimcal-ctag:";

impl SyncToken {
    /// Token requesting a full synchronization.
    #[must_use]
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Builds a marker token from a collection ctag.
    #[must_use]
    pub fn from_ctag(ctag: &str) -> Self {
        Self(format!("{CTAG_MARKER}{ctag}"))
    }

    /// Returns the ctag if this token is a ctag marker.
    #[must_use]
    pub fn ctag(&self) -> Option<&str> {
        self.0.strip_prefix(CTAG_MARKER)
    }

    /// Returns `true` if the token was issued by the server.
    #[must_use]
    pub fn is_server_token(&self) -> bool {
        !self.0.is_empty() && self.ctag().is_none()
    }
}

impl Href {
    /// Compares two hrefs by their percent-decoded path, ignoring scheme,
    /// host and a trailing slash.
    #[must_use]
    pub fn same_resource(&self, other: &str) -> bool {
        decoded_path(&self.0) == decoded_path(other)
    }
}

fn decoded_path(href: &str) -> Cow<'_, str> {
    percent_decode_str(path_of(href)).decode_utf8_lossy()
}

fn path_of(href: &str) -> &str {
    let path = match href.split_once("://") {
        Some((_, rest)) => rest.find('/').and_then(|i| rest.get(i..)).unwrap_or("/"),
        None => href,
    };
    path.trim_end_matches('/')
}

/// A vCard address object stored on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressObject {
    /// The href of the resource.
    pub href: Href,
    /// The entity tag of the resource.
    pub etag: ETag,
    /// Raw vCard data.
    pub card: String,
}

impl AddressObject {
    /// Creates a new `AddressObject`.
    #[must_use]
    pub const fn new(href: Href, etag: ETag, card: String) -> Self {
        Self { href, etag, card }
    }
}

/// Property snapshot of an address book collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBookProperties {
    /// `DAV:displayname`.
    pub display_name: Option<String>,
    /// `CARDDAV:addressbook-description`.
    pub description: Option<String>,
    /// `CS:getctag`, changes whenever any member changes.
    pub ctag: Option<String>,
    /// `DAV:sync-token` as a property of the collection.
    pub sync_token: Option<String>,
    /// `DAV:add-member` (RFC 5995), target for POST-based creation.
    pub add_member: Option<Href>,
    /// `CARDDAV:max-resource-size` in octets.
    pub max_resource_size: Option<u64>,
    /// Local names of the reports in `DAV:supported-report-set`.
    pub supported_reports: BTreeSet<String>,
    /// Properties without a typed field, keyed by local name.
    pub other: BTreeMap<String, String>,
}

impl AddressBookProperties {
    /// Returns `true` if the server advertises the named report.
    #[must_use]
    pub fn supports_report(&self, name: &str) -> bool {
        self.supported_reports.contains(name)
    }

    /// Returns `true` if the server advertises the sync-collection report.
    #[must_use]
    pub fn supports_sync_collection(&self) -> bool {
        self.supports_report("sync-collection")
    }
}

/// An address book collection found on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBookInfo {
    /// Absolute URL of the collection.
    pub url: Url,
    /// The href as reported by the server.
    pub href: Href,
    /// The display name of the address book.
    pub display_name: Option<String>,
    /// The description of the address book.
    pub description: Option<String>,
}
