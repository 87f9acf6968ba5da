// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Address book discovery (RFC 6352 section 11, RFC 6764).
//!
//! Starting from a URL, a domain or an email address, discovery tries a list
//! of context URLs and for each one follows
//! `current-user-principal -> addressbook-home-set -> address books`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;

use crate::client::CardDavClient;
use crate::config::Depth;
use crate::error::CardDavError;
use crate::request::Prop;
use crate::types::AddressBookInfo;

const WELL_KNOWN: &str = "/.well-known/carddav";

/// A DNS SRV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    /// Priority, lower is preferred.
    pub priority: u16,
    /// Weight among records of the same priority, higher is preferred.
    pub weight: u16,
    /// Target port.
    pub port: u16,
    /// Target host.
    pub target: String,
}

/// Resolves the DNS records used for service discovery (RFC 6764).
///
/// Lookup failures are reported as empty results.
#[async_trait]
pub trait ServiceResolver: fmt::Debug + Send + Sync {
    /// Returns the SRV records of `name`, e.g. `_carddavs._tcp.example.com`.
    async fn srv(&self, name: &str) -> Vec<SrvRecord>;

    /// Returns the TXT strings of `name`.
    async fn txt(&self, name: &str) -> Vec<String>;
}

/// [`ServiceResolver`] that never finds a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoServiceResolver;

#[async_trait]
impl ServiceResolver for NoServiceResolver {
    async fn srv(&self, _name: &str) -> Vec<SrvRecord> {
        Vec::new()
    }

    async fn txt(&self, _name: &str) -> Vec<String> {
        Vec::new()
    }
}

/// Address book discovery for one account.
#[derive(Debug, Clone)]
pub struct Discovery {
    client: CardDavClient,
    resolver: Arc<dyn ServiceResolver>,
}

impl Discovery {
    /// Creates a discovery engine.
    #[must_use]
    pub fn new(client: CardDavClient, resolver: Arc<dyn ServiceResolver>) -> Self {
        Self { client, resolver }
    }

    /// Finds the address books reachable from `input`, a URL, a domain or
    /// an email address.
    ///
    /// Each candidate context URL is tried in turn and the address books of
    /// the first one that yields any are returned. Failing candidates are
    /// logged and skipped, so an empty result means nothing was found.
    #[tracing::instrument(skip(self))]
    pub async fn discover(&self, input: &str) -> Vec<AddressBookInfo> {
        for candidate in self.candidates(input).await {
            match self.address_books_at(&candidate).await {
                Ok(books) if !books.is_empty() => {
                    tracing::debug!(url = %candidate, count = books.len(), "address books found");
                    return books;
                }
                Ok(_) => tracing::debug!(url = %candidate, "no address books"),
                Err(err) => tracing::debug!(url = %candidate, error = %err, "candidate failed"),
            }
        }
        tracing::info!("no address books discovered");
        Vec::new()
    }

    /// Returns the context URLs to try for `input`, in order.
    async fn candidates(&self, input: &str) -> Vec<Url> {
        let input = input.trim();
        let mut urls = Vec::new();

        let domain = if input.contains("://") {
            match Url::parse(input) {
                Ok(url) => {
                    let host = url.host_str().map(str::to_string);
                    urls.push(url);
                    host
                }
                Err(err) => {
                    tracing::warn!(input, error = %err, "invalid discovery URL");
                    None
                }
            }
        } else {
            let host = input.rsplit_once('@').map_or(input, |(_, domain)| domain);
            let host = host.split('/').next().unwrap_or(host);
            (!host.is_empty()).then(|| host.to_string())
        };

        if let Some(domain) = domain {
            urls.extend(self.srv_candidates(&domain).await);
            for path in [WELL_KNOWN, "/"] {
                match Url::parse(&format!("https://{domain}{path}")) {
                    Ok(url) => urls.push(url),
                    Err(err) => tracing::debug!(%domain, error = %err, "invalid domain"),
                }
            }
        }

        let mut unique: Vec<Url> = Vec::with_capacity(urls.len());
        for url in urls {
            if !unique.contains(&url) {
                unique.push(url);
            }
        }
        unique
    }

    async fn srv_candidates(&self, domain: &str) -> Vec<Url> {
        let mut urls = Vec::new();
        for (service, scheme) in [("_carddavs._tcp", "https"), ("_carddav._tcp", "http")] {
            let name = format!("{service}.{domain}");
            let mut records = self.resolver.srv(&name).await;
            if records.is_empty() {
                continue;
            }
            records.sort_by(|a, b| a.priority.cmp(&b.priority).then(b.weight.cmp(&a.weight)));

            let path = self
                .resolver
                .txt(&name)
                .await
                .iter()
                .find_map(|txt| txt.strip_prefix("path=").map(str::to_string))
                .unwrap_or_else(|| WELL_KNOWN.to_string());

            for record in records {
                let target = record.target.trim_end_matches('.');
                // A target of "." means the service is not offered.
                if target.is_empty() {
                    continue;
                }
                let url = format!("{scheme}://{target}:{}{path}", record.port);
                match Url::parse(&url) {
                    Ok(url) => urls.push(url),
                    Err(err) => tracing::debug!(%url, error = %err, "invalid SRV target"),
                }
            }
        }
        urls
    }

    async fn address_books_at(&self, context: &Url) -> Result<Vec<AddressBookInfo>, CardDavError> {
        let (multistatus, url) = self
            .client
            .propfind(context, Depth::Zero, &[Prop::CurrentUserPrincipal])
            .await?;
        let principal = multistatus
            .responses
            .iter()
            .find_map(|r| r.ok_props()?.current_user_principal)
            .ok_or_else(|| CardDavError::Protocol("No current-user-principal".to_string()))?;
        let principal = join(&url, principal.as_str())?;
        tracing::debug!(principal = %principal, "found principal");

        let (multistatus, url) = self
            .client
            .propfind(&principal, Depth::Zero, &[Prop::AddressBookHomeSet])
            .await?;
        let homes: Vec<_> = multistatus
            .responses
            .iter()
            .filter_map(|r| r.ok_props())
            .flat_map(|props| props.addressbook_home_set)
            .collect();
        if homes.is_empty() {
            return Err(CardDavError::Protocol("No addressbook-home-set".to_string()));
        }

        let mut books = Vec::new();
        for home in homes {
            let home = match join(&url, home.as_str()) {
                Ok(home) => home,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping invalid address book home");
                    continue;
                }
            };
            match self.client.list_address_books(&home).await {
                Ok(found) => books.extend(found),
                Err(err) => tracing::debug!(home = %home, error = %err, "address book home failed"),
            }
        }
        Ok(books)
    }
}

fn join(base: &Url, href: &str) -> Result<Url, CardDavError> {
    base.join(href)
        .map_err(|e| CardDavError::Protocol(format!("Invalid href {href}: {e}")))
}
