use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogCard, CatalogEntry};
use crate::resolve::deep_link_href;

/// Italian and English function words ignored when tokenizing titles.
const STOPWORDS: &[&str] = &[
    "della", "delle", "degli", "dello", "dell", "d", "del", "dei", "di", "da", "a", "al", "allo",
    "alla", "alle", "ai", "il", "lo", "la", "i", "gli", "le", "un", "uno", "una", "and", "or",
    "the", "of", "to", "in", "on", "for",
];

const MISENCODED_APOSTROPHE: &str = "â€™";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub exact: i64,
    pub title_in_query: i64,
    pub query_in_title: i64,
    pub token: i64,
    pub all_tokens: i64,
    pub single_token_query: i64,
    /// Shortest title token considered for token matching.
    pub min_token_chars: usize,
    /// Shortest text allowed to match by containment.
    pub min_containment_chars: usize,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            exact: 15,
            title_in_query: 12,
            query_in_title: 10,
            token: 4,
            all_tokens: 5,
            single_token_query: 8,
            min_token_chars: 3,
            min_containment_chars: 4,
        }
    }
}

pub fn normalize_text(value: &str) -> String {
    value
        .to_lowercase()
        .replace(MISENCODED_APOSTROPHE, "'")
        .replace('\u{2019}', "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn score(query: &str, title: &str) -> i64 {
    score_with(query, title, &ScoreWeights::default())
}

pub fn score_with(query: &str, title: &str, weights: &ScoreWeights) -> i64 {
    let query = normalize_text(query);
    let title = normalize_text(title);
    if query.is_empty() || title.is_empty() {
        return 0;
    }
    let query_chars = query.chars().count();

    let mut total = 0i64;
    if query == title {
        total += weights.exact;
    } else if query.contains(&title) {
        total += weights.title_in_query;
    } else if title.contains(&query) && query_chars >= weights.min_containment_chars {
        total += weights.query_in_title;
    }

    let tokens = title_tokens(&title, weights);
    let mut hits = 0usize;
    for token in &tokens {
        let token_chars = token.chars().count();
        let matched = contains_word(&query, token)
            || (token_chars >= weights.min_containment_chars && token.contains(&query))
            || (query_chars >= weights.min_containment_chars && query.contains(token));
        if matched {
            hits += 1;
            total += weights.token;
        }
    }

    if hits > 0 && hits == tokens.len() {
        total += weights.all_tokens;
    }
    if tokens.len() > 1 && tokens.iter().any(|token| *token == query) {
        total += weights.single_token_query;
    }
    total
}

fn title_tokens<'a>(title: &'a str, weights: &ScoreWeights) -> Vec<&'a str> {
    title
        .split(' ')
        .filter(|token| token.chars().count() >= weights.min_token_chars)
        .filter(|token| !STOPWORDS.contains(token))
        .collect()
}

/// `needle` occurs in `haystack` delimited by word boundaries on both sides.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    // Every start offset is tried; overlapping occurrences can each be the
    // one that sits on word boundaries.
    let first = needle.chars().next();
    let last = needle.chars().next_back();
    haystack.char_indices().any(|(start, _)| {
        if !haystack[start..].starts_with(needle) {
            return false;
        }
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        is_boundary(before, first) && is_boundary(last, after)
    })
}

fn is_boundary(left: Option<char>, right: Option<char>) -> bool {
    left.is_some_and(is_word_char) != right.is_some_and(is_word_char)
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[derive(Debug, Clone, Copy)]
pub struct Ranked<'a, T> {
    pub item: &'a T,
    pub score: i64,
}

/// Score every candidate and sort by descending score. Equal scores keep
/// their input order.
pub fn rank<'a, T, F>(
    query: &str,
    candidates: &'a [T],
    title_of: F,
    weights: &ScoreWeights,
) -> Vec<Ranked<'a, T>>
where
    F: Fn(&T) -> &str,
{
    let mut ranked = candidates
        .iter()
        .map(|item| Ranked {
            item,
            score: score_with(query, title_of(item), weights),
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|left, right| right.score.cmp(&left.score));
    ranked
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<'a> {
    pub page_key: &'a str,
    pub category: &'a str,
    pub title: &'a str,
    pub card_key: &'a str,
    pub score: i64,
    pub href: String,
}

struct SearchSlot<'a> {
    page_key: &'a str,
    entry: &'a CatalogEntry,
    card: &'a CatalogCard,
}

/// Rank every catalog card against `query`, dropping non-matching cards.
pub fn search_catalog<'a>(
    query: &str,
    catalog: &'a Catalog,
    weights: &ScoreWeights,
    limit: Option<usize>,
) -> Vec<SearchHit<'a>> {
    let slots = catalog
        .pages
        .iter()
        .flat_map(|(page_key, entry)| {
            entry.cards.iter().map(move |card| SearchSlot {
                page_key: page_key.as_str(),
                entry,
                card,
            })
        })
        .collect::<Vec<_>>();

    rank(query, &slots, |slot| slot.card.title.as_str(), weights)
        .into_iter()
        .filter(|ranked| ranked.score > 0)
        .take(limit.unwrap_or(usize::MAX))
        .map(|ranked| {
            let slot = ranked.item;
            let href = if slot.entry.href.is_empty() {
                slot.page_key
            } else {
                slot.entry.href.as_str()
            };
            SearchHit {
                page_key: slot.page_key,
                category: slot.entry.category.as_str(),
                title: slot.card.title.as_str(),
                card_key: slot.card.card_key.as_str(),
                score: ranked.score,
                href: deep_link_href(href, &slot.card.card_key),
            }
        })
        .collect()
}
