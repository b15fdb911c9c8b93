use serde::Serialize;
use tracing::debug;

use crate::catalog::{Catalog, CatalogCard, CatalogEntry};
use crate::extract::{Card, DEFAULT_ID_PREFIX};
use crate::slug::slug;

/// Name of the URL query parameter carrying a deep link.
pub const DEEP_LINK_PARAM: &str = "q";

/// Anything a deep link can land on.
pub trait Linkable {
    fn explicit_id(&self) -> Option<&str>;
    fn card_key(&self) -> &str;
    fn title(&self) -> Option<&str>;
}

impl Linkable for Card {
    fn explicit_id(&self) -> Option<&str> {
        self.explicit_id.as_deref()
    }

    fn card_key(&self) -> &str {
        &self.card_key
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

impl Linkable for CatalogCard {
    fn explicit_id(&self) -> Option<&str> {
        None
    }

    fn card_key(&self) -> &str {
        &self.card_key
    }

    fn title(&self) -> Option<&str> {
        Some(self.title.as_str()).filter(|title| !title.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchRule {
    ExactId,
    CardKey,
    Title,
}

impl MatchRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ExactId => "exact-id",
            Self::CardKey => "card-key",
            Self::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a, T> {
    pub card: &'a T,
    pub rule: MatchRule,
}

pub fn resolve<'a, T: Linkable>(query: &str, cards: &'a [T]) -> Option<&'a T> {
    resolve_match(query, cards, DEFAULT_ID_PREFIX).map(|resolved| resolved.card)
}

/// Locate the card a deep-link `query` points at.
///
/// Each rule is tried across the whole scope before the next one: explicit
/// `<id_prefix><query>` id, then `slug(query)` against card keys, then against
/// slugged titles. Within a rule the first card in document order wins.
pub fn resolve_match<'a, T: Linkable>(
    query: &str,
    cards: &'a [T],
    id_prefix: &str,
) -> Option<Resolved<'a, T>> {
    if query.is_empty() {
        return None;
    }

    let wanted_id = format!("{id_prefix}{query}");
    if let Some(card) = cards
        .iter()
        .find(|card| card.explicit_id() == Some(wanted_id.as_str()))
    {
        return Some(Resolved {
            card,
            rule: MatchRule::ExactId,
        });
    }

    let key = slug(query);
    if key.is_empty() {
        debug!(query, "deep link query has no usable key");
        return None;
    }
    if let Some(card) = cards.iter().find(|card| card.card_key() == key) {
        return Some(Resolved {
            card,
            rule: MatchRule::CardKey,
        });
    }
    if let Some(card) = cards
        .iter()
        .find(|card| card.title().is_some_and(|title| slug(title) == key))
    {
        return Some(Resolved {
            card,
            rule: MatchRule::Title,
        });
    }

    debug!(query, scope = cards.len(), "no card matched deep link");
    None
}

#[derive(Debug, Clone, Copy)]
pub struct CatalogHit<'a> {
    pub page_key: &'a str,
    pub entry: &'a CatalogEntry,
    pub card: &'a CatalogCard,
    pub rule: MatchRule,
}

impl CatalogHit<'_> {
    pub fn href(&self) -> String {
        let href = if self.entry.href.is_empty() {
            self.page_key
        } else {
            self.entry.href.as_str()
        };
        deep_link_href(href, &self.card.card_key)
    }
}

#[derive(Clone, Copy)]
struct CatalogSlot<'a> {
    page_key: &'a str,
    entry: &'a CatalogEntry,
    card: &'a CatalogCard,
}

impl Linkable for CatalogSlot<'_> {
    fn explicit_id(&self) -> Option<&str> {
        self.card.explicit_id()
    }

    fn card_key(&self) -> &str {
        self.card.card_key()
    }

    fn title(&self) -> Option<&str> {
        Linkable::title(self.card)
    }
}

/// Resolve against stored catalog cards, either within `page` or across all
/// pages in page-key order.
pub fn resolve_in_catalog<'a>(
    query: &str,
    catalog: &'a Catalog,
    page: Option<&str>,
) -> Option<CatalogHit<'a>> {
    let slots = catalog
        .pages
        .iter()
        .filter(|(page_key, _)| page.is_none_or(|wanted| wanted == page_key.as_str()))
        .flat_map(|(page_key, entry)| {
            entry.cards.iter().map(move |card| CatalogSlot {
                page_key: page_key.as_str(),
                entry,
                card,
            })
        })
        .collect::<Vec<_>>();
    let resolved = resolve_match(query, &slots, DEFAULT_ID_PREFIX)?;
    let slot = *resolved.card;
    Some(CatalogHit {
        page_key: slot.page_key,
        entry: slot.entry,
        card: slot.card,
        rule: resolved.rule,
    })
}

/// `href?q=<key>` with the key percent-encoded.
pub fn deep_link_href(href: &str, card_key: &str) -> String {
    let separator = if href.contains('?') { '&' } else { '?' };
    format!(
        "{href}{separator}{DEEP_LINK_PARAM}={}",
        urlencoding::encode(card_key)
    )
}
