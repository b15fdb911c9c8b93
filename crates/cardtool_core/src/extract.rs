use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::markup::PageMarkup;
use crate::slug::slug;

pub const DEFAULT_CLASS_MARKER: &str = "guide-card";
pub const DEFAULT_HEADING_TAG: &str = "h3";
pub const DEFAULT_ID_PREFIX: &str = "card-";

/// Which markup identifies a card, its title and its explicit key.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CardMarkup {
    pub class_marker: String,
    pub heading: String,
    pub id_prefix: String,
}

impl Default for CardMarkup {
    fn default() -> Self {
        Self {
            class_marker: DEFAULT_CLASS_MARKER.to_string(),
            heading: DEFAULT_HEADING_TAG.to_string(),
            id_prefix: DEFAULT_ID_PREFIX.to_string(),
        }
    }
}

impl CardMarkup {
    /// The element id a card with `card_key` is expected to carry.
    pub fn canonical_id(&self, card_key: &str) -> String {
        format!("{}{card_key}", self.id_prefix)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Card {
    pub page: String,
    pub ordinal_index: usize,
    pub explicit_id: Option<String>,
    pub title: Option<String>,
    pub card_key: String,
}

impl Card {
    pub fn has_key(&self) -> bool {
        !self.card_key.is_empty()
    }

    /// The explicit id with the canonical prefix removed, if it has one.
    pub fn prefixed_key<'a>(&'a self, markup: &CardMarkup) -> Option<&'a str> {
        self.explicit_id
            .as_deref()
            .and_then(|id| id.strip_prefix(markup.id_prefix.as_str()))
    }
}

pub fn extract_cards(page: &str, source: &str, markup: &CardMarkup) -> Vec<Card> {
    let parsed = PageMarkup::parse(source);
    extract_cards_from(page, &parsed, markup)
}

pub fn extract_cards_from(page: &str, parsed: &PageMarkup, markup: &CardMarkup) -> Vec<Card> {
    let cards = parsed
        .elements_with_class(&markup.class_marker)
        .enumerate()
        .map(|(index, element)| {
            let explicit_id = element
                .attr("id")
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string);
            let title = element.first_descendant_text(&markup.heading);
            let card_key = match explicit_id
                .as_deref()
                .and_then(|id| id.strip_prefix(markup.id_prefix.as_str()))
            {
                // Kept verbatim so non-canonical ids stay detectable.
                Some(stripped) => stripped.trim().to_string(),
                None => slug(title.as_deref().unwrap_or_default()),
            };
            Card {
                page: page.to_string(),
                ordinal_index: index + 1,
                explicit_id,
                title,
                card_key,
            }
        })
        .collect::<Vec<_>>();
    debug!(page, cards = cards.len(), "extracted cards");
    cards
}

#[cfg(test)]
mod tests {
    use super::{CardMarkup, extract_cards};

    #[test]
    fn extract_cards_prefers_prefixed_ids_then_slugged_titles() {
        let source = r#"<main>
<article class="guide-card" id="card-latte"><h3>Caffè Latte</h3></article>
<article class="guide-card"><div><h3>Cappuccino <small>grande</small></h3><h3>Second</h3></div></article>
<article class="guide-card" id="card-Flat_White"><h3>Flat White</h3></article>
<article class="guide-card" id="mocha"><h3>Mocha &amp; Co</h3></article>
</main>"#;
        let cards = extract_cards("caffe.html", source, &CardMarkup::default());

        assert_eq!(cards.len(), 4);
        assert_eq!(cards[0].ordinal_index, 1);
        assert_eq!(cards[0].card_key, "latte");
        assert_eq!(cards[0].title.as_deref(), Some("Caffè Latte"));
        assert_eq!(cards[1].explicit_id, None);
        assert_eq!(cards[1].title.as_deref(), Some("Cappuccino grande"));
        assert_eq!(cards[1].card_key, "cappuccino-grande");
        assert_eq!(cards[2].card_key, "Flat_White");
        assert_eq!(cards[3].explicit_id.as_deref(), Some("mocha"));
        assert_eq!(cards[3].card_key, "mocha-co");
        assert!(cards.iter().all(|card| card.page == "caffe.html"));
    }

    #[test]
    fn extract_cards_keeps_cards_without_title_or_key() {
        let source = r#"<div class="guide-card"><p>Body only</p></div>
<div class="guide-card"><h3> !!! </h3></div>"#;
        let cards = extract_cards("festive.html", source, &CardMarkup::default());

        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].title, None);
        assert!(!cards[0].has_key());
        assert_eq!(cards[1].title.as_deref(), Some("!!!"));
        assert!(!cards[1].has_key());
        assert_eq!(cards[1].ordinal_index, 2);
    }

    #[test]
    fn extract_cards_honors_custom_markup() {
        let markup = CardMarkup {
            class_marker: "recipe".to_string(),
            heading: "h2".to_string(),
            id_prefix: "r-".to_string(),
        };
        let source = r#"<section class="recipe" id="r-waffles"><h2>Waffles</h2></section>
<section class="guide-card"><h3>Ignored</h3></section>"#;
        let cards = extract_cards("sweet-treats.html", source, &markup);

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].card_key, "waffles");
        assert_eq!(cards[0].prefixed_key(&markup), Some("waffles"));
        assert_eq!(markup.canonical_id("waffles"), "r-waffles");
    }
}
