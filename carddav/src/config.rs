// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// `CardDAV` authentication method.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(tag = "type")]
pub enum AuthMethod {
    /// No authentication.
    #[serde(rename = "none")]
    #[default]
    None,
    /// Basic authentication (username/password).
    #[serde(rename = "basic")]
    Basic {
        /// Username for authentication.
        username: String,
        /// Password for authentication.
        password: String,
    },
    /// Bearer token authentication (OAuth).
    #[serde(rename = "bearer")]
    Bearer {
        /// Bearer token.
        token: String,
    },
}

/// Value of the `Depth` request header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
pub enum Depth {
    /// `Depth: 0`
    #[default]
    #[serde(rename = "0")]
    Zero,
    /// `Depth: 1`
    #[serde(rename = "1")]
    One,
    /// `Depth: infinity`
    #[serde(rename = "infinity")]
    Infinity,
}

impl Depth {
    /// Returns the header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Zero => "0",
            Self::One => "1",
            Self::Infinity => "infinity",
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known deviations of a server from the `CardDAV` and sync-collection RFCs.
///
/// Quirks are attached to the account through [`CardDavConfig::quirks`] and
/// can be overridden per address book with
/// [`AddressBook::with_quirks`](crate::AddressBook::with_quirks).
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ServerQuirks {
    /// `Depth` header sent with the sync-collection REPORT. RFC 6578 mandates
    /// `0`, some servers only accept `1`.
    pub sync_collection_depth: Depth,
    /// Never use sync-collection even if the server advertises it.
    pub disable_sync_collection: bool,
    /// Always enumerate the collection, even if its ctag did not change.
    pub skip_ctag_fast_path: bool,
    /// Maximum number of hrefs per addressbook-multiget REPORT.
    pub multiget_batch_size: usize,
}

impl Default for ServerQuirks {
    fn default() -> Self {
        Self {
            sync_collection_depth: Depth::Zero,
            disable_sync_collection: false,
            skip_ctag_fast_path: false,
            multiget_batch_size: default_multiget_batch_size(),
        }
    }
}

const fn default_multiget_batch_size() -> usize {
    100
}

/// `CardDAV` server configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CardDavConfig {
    /// Base URL of the `CardDAV` server, used to resolve relative hrefs.
    pub base_url: String,
    /// Authentication method.
    #[serde(default)]
    pub auth: AuthMethod,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// User agent string.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum number of redirects followed for a single request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Server quirks applied to every address book of this account.
    #[serde(default)]
    pub quirks: ServerQuirks,
}

const fn default_timeout() -> u64 {
    30
}

const fn default_max_redirects() -> usize {
    5
}

fn default_user_agent() -> String {
    concat!("aimcal-carddav/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for CardDavConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth: AuthMethod::default(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
            quirks: ServerQuirks::default(),
        }
    }
}
