// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Address book synchronization.
//!
//! [`synchronize`] brings a caller-owned [`CardCache`] up to date with an
//! address book and returns the token to pass to the next call. The engine
//! keeps no state of its own between passes.
//!
//! A pass uses the sync-collection REPORT (RFC 6578) when the server
//! supports it. Otherwise it compares the collection ctag with the one
//! recorded in the previous token and, if that changed, lists the whole
//! collection and diffs the entity tags against the cache.
//!
//! Card bodies are fetched before the cache sees any change, so a failed
//! request never leaves a pass half applied.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::addressbook::AddressBook;
use crate::error::CardDavError;
use crate::types::{ETag, Href, SyncToken};

/// Error returned by a [`CardCache`] callback.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The record could not be stored; the pass continues.
    #[error("Record rejected: {0}")]
    Record(String),
    /// The cache is unusable; the pass is aborted.
    #[error("Cache failure: {0}")]
    Fatal(String),
}

/// Local store of address objects, owned by the caller.
///
/// Callbacks are invoked one at a time in the order the server reported
/// the changes. They must be idempotent: a pass aborted by a fatal error
/// is repeated from the previous token.
#[async_trait]
pub trait CardCache: Send {
    /// Returns the href and entity tag of every cached card.
    async fn existing_etags(&mut self) -> Result<HashMap<Href, ETag>, CacheError>;

    /// Stores a new or changed card. `card` is `None` if bodies were not
    /// requested.
    async fn on_upserted(
        &mut self,
        href: &Href,
        etag: &ETag,
        card: Option<&str>,
    ) -> Result<(), CacheError>;

    /// Removes a card.
    async fn on_deleted(&mut self, href: &Href) -> Result<(), CacheError>;

    /// Called once after every record of a successful pass.
    async fn finish_sync(&mut self, _token: &SyncToken) -> Result<(), CacheError> {
        Ok(())
    }
}

/// A card held by [`MemoryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCard {
    /// Entity tag of the stored version.
    pub etag: ETag,
    /// The vCard, if it was fetched.
    pub card: Option<String>,
}

/// [`CardCache`] keeping everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    cards: BTreeMap<Href, CachedCard>,
    token: Option<SyncToken>,
}

impl MemoryCache {
    /// Returns the cached card at `href`.
    #[must_use]
    pub fn get(&self, href: &Href) -> Option<&CachedCard> {
        self.cards.get(href)
    }

    /// Iterates over the cached cards in href order.
    pub fn iter(&self) -> impl Iterator<Item = (&Href, &CachedCard)> {
        self.cards.iter()
    }

    /// Returns the number of cached cards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Returns `true` if no card is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Returns the token of the last successful pass.
    #[must_use]
    pub const fn token(&self) -> Option<&SyncToken> {
        self.token.as_ref()
    }
}

#[async_trait]
impl CardCache for MemoryCache {
    async fn existing_etags(&mut self) -> Result<HashMap<Href, ETag>, CacheError> {
        Ok(self
            .cards
            .iter()
            .map(|(href, cached)| (href.clone(), cached.etag.clone()))
            .collect())
    }

    async fn on_upserted(
        &mut self,
        href: &Href,
        etag: &ETag,
        card: Option<&str>,
    ) -> Result<(), CacheError> {
        self.cards.insert(
            href.clone(),
            CachedCard {
                etag: etag.clone(),
                card: card.map(str::to_string),
            },
        );
        Ok(())
    }

    async fn on_deleted(&mut self, href: &Href) -> Result<(), CacheError> {
        self.cards.remove(href);
        Ok(())
    }

    async fn finish_sync(&mut self, token: &SyncToken) -> Result<(), CacheError> {
        self.token = Some(token.clone());
        Ok(())
    }
}

/// Options of a synchronization pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Fetch card bodies for new and changed cards.
    pub fetch_cards: bool,
    /// Restricts fetched cards to these vCard properties; empty fetches
    /// full cards.
    pub card_props: Vec<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch_cards: true,
            card_props: Vec::new(),
        }
    }
}

/// How a pass determined the changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// sync-collection REPORT.
    DeltaFetch,
    /// The ctag did not change; nothing was fetched.
    CtagUnchanged,
    /// Full listing of the collection.
    EnumerateAll,
}

/// A change to apply to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// The card is new or changed.
    Upserted {
        /// Href of the card.
        href: Href,
        /// Its current entity tag.
        etag: ETag,
        /// The card, if fetched.
        card: Option<String>,
    },
    /// The card was removed from the server.
    Deleted {
        /// Href of the card.
        href: Href,
    },
}

impl Change {
    /// Returns the href the change applies to.
    #[must_use]
    pub const fn href(&self) -> &Href {
        match self {
            Self::Upserted { href, .. } | Self::Deleted { href } => href,
        }
    }
}

/// A record that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Href of the record.
    pub href: Href,
    /// What went wrong.
    pub reason: String,
}

/// Result of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Token to pass to the next [`synchronize`] call.
    pub token: SyncToken,
    /// The server returned only part of the changes. Passing `token` to the
    /// next call continues from where this pass stopped.
    pub truncated: bool,
    /// How the changes were determined.
    pub strategy: SyncStrategy,
    /// Number of cards stored in the cache.
    pub upserted: usize,
    /// Number of cards removed from the cache.
    pub deleted: usize,
    /// Records that were skipped.
    pub failures: Vec<RecordFailure>,
}

/// Changes collected by a pass, not yet applied.
#[derive(Debug)]
struct Plan {
    strategy: SyncStrategy,
    token: SyncToken,
    truncated: bool,
    changes: Vec<Change>,
    failures: Vec<RecordFailure>,
}

impl Plan {
    fn new(strategy: SyncStrategy, token: SyncToken) -> Self {
        Self {
            strategy,
            token,
            truncated: false,
            changes: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn fail(&mut self, href: Href, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%href, %reason, "skipping record");
        self.failures.push(RecordFailure { href, reason });
    }
}

/// Synchronizes `cache` with the address book, starting at `token`.
///
/// Pass [`SyncToken::empty`] for the first pass and the returned
/// [`SyncOutcome::token`] afterwards.
///
/// # Errors
///
/// Returns an error if a request fails, the server response is malformed,
/// or the cache reports [`CacheError::Fatal`]. No token is returned then and
/// the pass should be repeated with the previous one.
#[tracing::instrument(skip_all, fields(href = %book.href(), token = %token))]
pub async fn synchronize<C>(
    book: &mut AddressBook,
    token: &SyncToken,
    cache: &mut C,
    options: &SyncOptions,
) -> Result<SyncOutcome, CardDavError>
where
    C: CardCache + ?Sized,
{
    let fresh = book.cached_properties().is_none();
    let supports_sync = book.properties(false).await?.supports_sync_collection();
    let quirks = book.quirks().clone();

    let mut plan = if supports_sync && !quirks.disable_sync_collection {
        delta_fetch(book, token, cache, options).await?
    } else {
        if let (false, Some(ctag)) = (quirks.skip_ctag_fast_path, token.ctag()) {
            if !fresh {
                book.properties(true).await?;
            }
            let current = book.cached_properties().and_then(|p| p.ctag.as_deref());
            if current == Some(ctag) {
                tracing::debug!(ctag, "ctag unchanged");
                let plan = Plan::new(SyncStrategy::CtagUnchanged, token.clone());
                return apply(plan, cache).await;
            }
        }
        enumerate_all(book, cache).await?
    };

    if options.fetch_cards {
        fetch_bodies(book, &mut plan, options).await?;
    }
    apply(plan, cache).await
}

async fn delta_fetch<C>(
    book: &AddressBook,
    token: &SyncToken,
    cache: &mut C,
    options: &SyncOptions,
) -> Result<Plan, CardDavError>
where
    C: CardCache + ?Sized,
{
    let inline = (options.fetch_cards && !options.card_props.is_empty())
        .then_some(options.card_props.as_slice());

    let mut start = if token.is_server_token() {
        token.clone()
    } else {
        SyncToken::empty()
    };
    let report = book.sync_report(&start, inline).await;
    let multistatus = match report {
        Err(CardDavError::InvalidSyncToken) => {
            tracing::warn!("sync token rejected by server, restarting from empty state");
            start = SyncToken::empty();
            book.sync_report(&start, inline).await?
        }
        result => result?,
    };

    let new_token = multistatus
        .sync_token
        .clone()
        .ok_or_else(|| CardDavError::Protocol("sync-collection response without sync-token".to_string()))?;
    let mut plan = Plan::new(SyncStrategy::DeltaFetch, new_token);

    let mut seen = HashSet::new();
    for response in multistatus.responses {
        let Some(href) = response.href().cloned() else {
            continue;
        };
        if href.same_resource(book.href()) {
            if response.has_status(StatusCode::INSUFFICIENT_STORAGE) {
                tracing::debug!("sync-collection result truncated");
                plan.truncated = true;
            }
            continue;
        }

        if response.is_gone() {
            for href in response.hrefs {
                seen.insert(href.clone());
                plan.changes.push(Change::Deleted { href });
            }
            continue;
        }

        match response.ok_props() {
            Some(props) => match props.etag {
                Some(etag) => {
                    seen.insert(href.clone());
                    plan.changes.push(Change::Upserted {
                        href,
                        etag,
                        card: props.address_data,
                    });
                }
                None => {
                    seen.insert(href.clone());
                    plan.fail(href, "no etag in sync-collection response");
                }
            },
            None => {
                // Still on the server, so the full-state reconcile must keep it.
                seen.insert(href.clone());
                let status = response.status.as_deref().unwrap_or("no status");
                plan.fail(href, format!("unexpected response: {status}"));
            }
        }
    }

    if start.is_empty() {
        let existing = cache.existing_etags().await.map_err(cache_error)?;
        reconcile_full_state(&mut plan, &existing, &seen);
    }
    Ok(plan)
}

/// Drops unchanged cards from a full-state report and deletes cached cards
/// the server no longer has.
fn reconcile_full_state(plan: &mut Plan, existing: &HashMap<Href, ETag>, seen: &HashSet<Href>) {
    plan.changes.retain(|change| match change {
        Change::Upserted { href, etag, .. } => existing.get(href) != Some(etag),
        Change::Deleted { .. } => true,
    });

    if plan.truncated {
        return;
    }
    let mut gone: Vec<&Href> = existing.keys().filter(|href| !seen.contains(*href)).collect();
    gone.sort();
    plan.changes.extend(gone.into_iter().map(|href| Change::Deleted { href: href.clone() }));
}

async fn enumerate_all<C>(book: &AddressBook, cache: &mut C) -> Result<Plan, CardDavError>
where
    C: CardCache + ?Sized,
{
    let listing = book.list_members().await?;
    let token = listing
        .properties
        .ctag
        .as_deref()
        .map(SyncToken::from_ctag)
        .unwrap_or_default();
    let mut plan = Plan::new(SyncStrategy::EnumerateAll, token);

    let existing = cache.existing_etags().await.map_err(cache_error)?;
    let mut seen = HashSet::new();
    for member in listing.members {
        seen.insert(member.href.clone());
        match member.etag {
            Some(etag) if existing.get(&member.href) == Some(&etag) => {}
            Some(etag) => plan.changes.push(Change::Upserted {
                href: member.href,
                etag,
                card: None,
            }),
            None => plan.fail(member.href, "no etag in listing"),
        }
    }

    let mut gone: Vec<&Href> = existing.keys().filter(|href| !seen.contains(*href)).collect();
    gone.sort();
    plan.changes.extend(gone.into_iter().map(|href| Change::Deleted { href: href.clone() }));
    Ok(plan)
}

/// Fills in the bodies of upserted cards that came without one.
async fn fetch_bodies(
    book: &AddressBook,
    plan: &mut Plan,
    options: &SyncOptions,
) -> Result<(), CardDavError> {
    let hrefs: Vec<Href> = plan
        .changes
        .iter()
        .filter_map(|change| match change {
            Change::Upserted {
                href, card: None, ..
            } => Some(href.clone()),
            _ => None,
        })
        .collect();
    if hrefs.is_empty() {
        return Ok(());
    }

    let mut fetched = book.multi_get(&hrefs, &options.card_props).await?;
    let missing: HashSet<Href> = fetched.missing.drain(..).collect();

    let mut changes = Vec::with_capacity(plan.changes.len());
    for change in std::mem::take(&mut plan.changes) {
        match change {
            Change::Upserted {
                href, card: None, ..
            } => {
                if let Some(object) = fetched.objects.remove(&href) {
                    changes.push(Change::Upserted {
                        href,
                        etag: object.etag,
                        card: Some(object.card),
                    });
                } else if missing.contains(&href) {
                    tracing::debug!(%href, "card vanished before it could be fetched");
                    changes.push(Change::Deleted { href });
                } else {
                    plan.fail(href, "card not returned by addressbook-multiget");
                }
            }
            change => changes.push(change),
        }
    }
    plan.changes = changes;
    Ok(())
}

/// Hands the changes to the cache, in order.
async fn apply<C>(plan: Plan, cache: &mut C) -> Result<SyncOutcome, CardDavError>
where
    C: CardCache + ?Sized,
{
    let mut outcome = SyncOutcome {
        token: plan.token,
        truncated: plan.truncated,
        strategy: plan.strategy,
        upserted: 0,
        deleted: 0,
        failures: plan.failures,
    };

    for change in plan.changes {
        let result = match &change {
            Change::Upserted { href, etag, card } => {
                cache.on_upserted(href, etag, card.as_deref()).await
            }
            Change::Deleted { href } => cache.on_deleted(href).await,
        };
        match (result, &change) {
            (Ok(()), Change::Upserted { .. }) => outcome.upserted += 1,
            (Ok(()), Change::Deleted { .. }) => outcome.deleted += 1,
            (Err(CacheError::Record(reason)), _) => {
                tracing::warn!(href = %change.href(), %reason, "cache rejected record");
                outcome.failures.push(RecordFailure {
                    href: change.href().clone(),
                    reason,
                });
            }
            (Err(err @ CacheError::Fatal(_)), _) => return Err(cache_error(err)),
        }
    }

    cache.finish_sync(&outcome.token).await.map_err(cache_error)?;
    tracing::info!(
        strategy = ?outcome.strategy,
        upserted = outcome.upserted,
        deleted = outcome.deleted,
        failures = outcome.failures.len(),
        truncated = outcome.truncated,
        "synchronization finished"
    );
    Ok(outcome)
}

fn cache_error(err: CacheError) -> CardDavError {
    CardDavError::Cache(err.to_string())
}
