use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::catalog::{Catalog, CatalogEntry, CatalogStore, iso_timestamp, merge};
use crate::config::CardConfig;
use crate::extract::extract_cards_from;
use crate::filesystem::{ScanOptions, ScannedPage, locate_page, scan_pages};
use crate::markup::PageMarkup;
use crate::runtime::ResolvedPaths;
use crate::seed::page_category;
use crate::storage::StorageBackend;

#[derive(Debug, Clone, Serialize)]
pub struct SyncedPage {
    pub page_key: String,
    pub extracted: usize,
    /// Cards new to the stored catalog after this sync.
    pub added: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub pages: Vec<SyncedPage>,
    pub total_pages: usize,
    pub total_cards: usize,
    pub updated_at: Option<String>,
}

/// Extract `pages` (every scanned page when empty) and merge them into the
/// stored catalog, the way a visitor's page loads would.
pub fn sync_catalog<B: StorageBackend>(
    paths: &ResolvedPaths,
    config: &CardConfig,
    store: &mut CatalogStore<B>,
    pages: &[String],
) -> Result<SyncReport> {
    sync_catalog_at(paths, config, store, pages, Utc::now())
}

pub fn sync_catalog_at<B: StorageBackend>(
    paths: &ResolvedPaths,
    config: &CardConfig,
    store: &mut CatalogStore<B>,
    pages: &[String],
    now: DateTime<Utc>,
) -> Result<SyncReport> {
    let targets = if pages.is_empty() {
        scan_pages(
            paths,
            &ScanOptions {
                recursive: config.audit.recursive,
                exclude: config.audit.exclude.clone(),
            },
        )?
    } else {
        pages
            .iter()
            .map(|page| locate_page(paths, page))
            .collect::<Result<Vec<_>>>()?
    };

    let stamp = iso_timestamp(now);
    let mut catalog = store.load();
    let mut synced = Vec::with_capacity(targets.len());
    for page in &targets {
        let entry = page_entry(page, config, &stamp)?;
        let before = catalog
            .pages
            .get(&page.page_key)
            .map_or(0, |current| current.cards.len());
        let extracted = entry.cards.len();
        catalog = merge(catalog, &Catalog::single(&page.page_key, entry));
        let after = catalog
            .pages
            .get(&page.page_key)
            .map_or(0, |current| current.cards.len());
        synced.push(SyncedPage {
            page_key: page.page_key.clone(),
            extracted,
            added: after - before,
        });
    }

    let saved = store.save_at(&catalog, now)?;
    info!(
        pages = synced.len(),
        cards = saved.card_count(),
        "synced catalog"
    );
    Ok(SyncReport {
        total_pages: saved.pages.len(),
        total_cards: saved.card_count(),
        updated_at: saved.updated_at,
        pages: synced,
    })
}

fn page_entry(page: &ScannedPage, config: &CardConfig, stamp: &str) -> Result<CatalogEntry> {
    let source = page.read()?;
    let parsed = PageMarkup::parse(&source);
    let cards = extract_cards_from(&page.page_key, &parsed, &config.cards);
    Ok(CatalogEntry::from_cards(
        &page.page_key,
        &page_category(&page.page_key, &parsed),
        Some(stamp.to_string()),
        &cards,
    ))
}
