// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `CardDAV` client with incremental address book synchronization (RFC 6352, RFC 6578).

#![warn(
    trivial_casts,
    trivial_numeric_casts,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::dbg_macro,
    clippy::indexing_slicing,
    clippy::pedantic
)]
// Allow certain clippy lints that are too restrictive for this crate
#![allow(
    clippy::option_option,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::match_bool
)]

mod addressbook;
mod client;
mod config;
mod discovery;
mod error;
mod http;
mod request;
mod response;
mod sync;
mod types;
mod vcard;
mod xml;

pub use crate::addressbook::{AddressBook, CreatedCard, Listing, Member, QueryResult};
pub use crate::client::CardDavClient;
pub use crate::config::{AuthMethod, CardDavConfig, Depth, ServerQuirks};
pub use crate::discovery::{Discovery, NoServiceResolver, ServiceResolver, SrvRecord};
pub use crate::error::CardDavError;
pub use crate::http::{DavRequest, DavResponse, HttpTransport, Transport};
pub use crate::request::{
    AddressBookMultiGetRequest, AddressBookQueryRequest, FilterTest, MatchType, ParamCondition,
    ParamFilter, Prop, PropFilter, PropFindRequest, QueryFilter, SyncCollectionRequest, TextMatch,
};
pub use crate::response::{MultiStatusResponse, PropStat, Properties, ResponseItem};
pub use crate::sync::{
    CacheError, CachedCard, CardCache, Change, MemoryCache, RecordFailure, SyncOptions,
    SyncOutcome, SyncStrategy, synchronize,
};
pub use crate::types::{
    AddressBookInfo, AddressBookProperties, AddressObject, ETag, Href, SyncToken,
};
pub use crate::vcard::{ensure_uid, uid, validate};
