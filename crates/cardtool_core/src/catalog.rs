use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::extract::Card;
use crate::storage::StorageBackend;

pub const CATALOG_STORAGE_KEY: &str = "badianiSearchCatalog.v2";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_pages")]
    pub pages: BTreeMap<String, CatalogEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub href: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_cards")]
    pub cards: Vec<CatalogCard>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCard {
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub card_key: String,
    #[serde(default, deserialize_with = "lenient_signals")]
    pub signals: CardSignals,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Content flags carried alongside each card. Never consulted for matching.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CardSignals {
    #[serde(deserialize_with = "lenient_bool")]
    pub sicurezza: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub chiusura: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub upselling: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub pages: usize,
    pub cards: usize,
    pub updated_at: Option<String>,
    pub by_page: BTreeMap<String, usize>,
}

// Stored catalogs are written by browsers as well as by this crate. Damage
// is contained to the smallest unit: a non-object page or card is dropped,
// a mistyped field falls back to its default.

fn lenient_pages<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, CatalogEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(raw) = Value::deserialize(deserializer)? else {
        warn!("stored catalog pages are not an object; ignoring them");
        return Ok(BTreeMap::new());
    };
    Ok(raw
        .into_iter()
        .filter_map(|(page_key, value)| {
            if !value.is_object() {
                warn!(page = %page_key, "dropping malformed catalog page");
                return None;
            }
            match serde_json::from_value::<CatalogEntry>(value) {
                Ok(entry) => Some((page_key, entry)),
                Err(err) => {
                    warn!(page = %page_key, error = %err, "dropping malformed catalog page");
                    None
                }
            }
        })
        .collect())
}

fn lenient_cards<'de, D>(deserializer: D) -> std::result::Result<Vec<CatalogCard>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(raw) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(raw
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|value| serde_json::from_value::<CatalogCard>(value).ok())
        .collect())
}

fn lenient_signals<'de, D>(deserializer: D) -> std::result::Result<CardSignals, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(CardSignals::default());
    }
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Strings pass through, numbers are stringified, anything else is empty.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) if !text.is_empty() => Some(text),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn card_count(&self) -> usize {
        self.pages.values().map(|entry| entry.cards.len()).sum()
    }

    pub fn stats(&self) -> CatalogStats {
        CatalogStats {
            pages: self.pages.len(),
            cards: self.card_count(),
            updated_at: self.updated_at.clone(),
            by_page: self
                .pages
                .iter()
                .map(|(page, entry)| (page.clone(), entry.cards.len()))
                .collect(),
        }
    }

    /// Catalog holding a single page entry.
    pub fn single(page_key: &str, entry: CatalogEntry) -> Self {
        Self {
            pages: BTreeMap::from([(page_key.to_string(), entry)]),
            ..Self::default()
        }
    }
}

impl CatalogEntry {
    /// Build an entry from extractor output. Cards without a key are dropped
    /// and only the first card for each key is kept.
    pub fn from_cards(href: &str, category: &str, updated_at: Option<String>, cards: &[Card]) -> Self {
        let mut seen = HashSet::new();
        let cards = cards
            .iter()
            .filter(|card| card.has_key())
            .filter(|card| seen.insert(card.card_key.as_str()))
            .map(|card| CatalogCard {
                title: card.title.clone().unwrap_or_default(),
                card_key: card.card_key.clone(),
                ..CatalogCard::default()
            })
            .collect();
        Self {
            href: href.to_string(),
            category: category.to_string(),
            updated_at,
            cards,
            extra: Map::new(),
        }
    }

    pub fn has_card(&self, card_key: &str) -> bool {
        self.cards.iter().any(|card| card.card_key == card_key)
    }
}

/// Union `incoming` into `existing`.
///
/// Pages missing from `existing` are inserted as-is. For pages already
/// present, empty `href`/`category`/`updatedAt` are filled from `incoming` and
/// incoming cards whose key is not yet present are appended in order.
/// Existing cards are never removed or rewritten.
pub fn merge(mut existing: Catalog, incoming: &Catalog) -> Catalog {
    for (page_key, entry) in &incoming.pages {
        merge_entry(&mut existing, page_key, entry);
    }
    if existing.updated_at.is_none() {
        existing.updated_at.clone_from(&incoming.updated_at);
    }
    existing
}

pub fn merge_page(existing: Catalog, page_key: &str, entry: &CatalogEntry) -> Catalog {
    let mut merged = existing;
    merge_entry(&mut merged, page_key, entry);
    merged
}

fn merge_entry(catalog: &mut Catalog, page_key: &str, incoming: &CatalogEntry) {
    let Some(current) = catalog.pages.get_mut(page_key) else {
        catalog
            .pages
            .insert(page_key.to_string(), incoming.clone());
        return;
    };

    if current.href.is_empty() {
        current.href.clone_from(&incoming.href);
    }
    if current.category.is_empty() {
        current.category.clone_from(&incoming.category);
    }
    if current.updated_at.is_none() {
        current.updated_at.clone_from(&incoming.updated_at);
    }

    let mut known = current
        .cards
        .iter()
        .filter(|card| !card.card_key.is_empty())
        .map(|card| card.card_key.clone())
        .collect::<HashSet<_>>();
    for card in &incoming.cards {
        if card.card_key.is_empty() || known.contains(&card.card_key) {
            continue;
        }
        known.insert(card.card_key.clone());
        current.cards.push(card.clone());
    }
}

pub struct CatalogStore<B> {
    backend: B,
    key: String,
}

impl<B: StorageBackend> CatalogStore<B> {
    pub fn new(backend: B) -> Self {
        Self::with_key(backend, CATALOG_STORAGE_KEY)
    }

    pub fn with_key(backend: B, key: &str) -> Self {
        Self {
            backend,
            key: key.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Read the stored catalog. Missing, unreadable or corrupt data yields an
    /// empty catalog.
    pub fn load(&self) -> Catalog {
        let raw = match self.backend.get_item(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Catalog::default(),
            Err(err) => {
                warn!(key = %self.key, error = %err, "catalog storage unreadable; starting empty");
                return Catalog::default();
            }
        };
        match serde_json::from_str::<Catalog>(&raw) {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(key = %self.key, error = %err, "stored catalog is corrupt; starting empty");
                Catalog::default()
            }
        }
    }

    pub fn save(&mut self, catalog: &Catalog) -> Result<Catalog> {
        self.save_at(catalog, Utc::now())
    }

    /// Overwrite the storage key with `catalog` stamped at `now`.
    pub fn save_at(&mut self, catalog: &Catalog, now: DateTime<Utc>) -> Result<Catalog> {
        let mut stamped = catalog.clone();
        stamped.updated_at = Some(iso_timestamp(now));
        let serialized =
            serde_json::to_string(&stamped).context("failed to serialize catalog")?;
        self.backend.set_item(&self.key, &serialized)?;
        info!(
            key = %self.key,
            pages = stamped.pages.len(),
            cards = stamped.card_count(),
            "saved catalog"
        );
        Ok(stamped)
    }

    /// `load`, `merge` with `incoming`, then `save`.
    pub fn merge_and_save(&mut self, incoming: &Catalog) -> Result<Catalog> {
        let merged = merge(self.load(), incoming);
        self.save(&merged)
    }
}

/// Millisecond-precision UTC timestamp, e.g. `2026-01-02T03:04:05.000Z`.
pub fn iso_timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
