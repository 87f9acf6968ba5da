// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use reqwest::{Method, StatusCode};

use crate::types::Href;

/// `CardDAV` client errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CardDavError {
    /// Connection, TLS or timeout failure below the HTTP layer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or unexpected server response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// XML parsing/writing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// A precondition still failed after all retries.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The vCard misses a mandatory property.
    #[error("Invalid vCard: {0}")]
    Validation(String),

    /// Resource not found (404 or 410).
    #[error("Resource not found: {0}")]
    NotFound(Href),

    /// The server answered with a status the operation does not accept.
    #[error("{method} {href} failed with status {status}")]
    UnexpectedStatus {
        /// Request method.
        method: Method,
        /// Target of the request.
        href: String,
        /// Status returned by the server.
        status: StatusCode,
    },

    /// The server rejected the sync token (RFC 6578 `valid-sync-token`).
    #[error("Sync token rejected by server")]
    InvalidSyncToken,

    /// Redirect chain longer than the configured limit.
    #[error("Too many redirects (limit {0})")]
    TooManyRedirects(usize),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The cache signalled a fatal error during reconciliation.
    #[error("Cache error: {0}")]
    Cache(String),
}

impl From<reqwest::Error> for CardDavError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<quick_xml::Error> for CardDavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for CardDavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("IO error: {e}"))
    }
}
