use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use serde_json::Map;
use tracing::info;

use crate::catalog::{Catalog, CatalogCard, CatalogEntry};
use crate::extract::{CardMarkup, extract_cards_from};
use crate::filesystem::locate_page;
use crate::markup::PageMarkup;
use crate::runtime::ResolvedPaths;
use crate::slug::slug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedFormat {
    Json,
    Js,
}

impl SeedFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "js" | "javascript" => Ok(Self::Js),
            other => bail!("unknown seed format `{other}` (expected `json` or `js`)"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Js => "js",
        }
    }
}

/// Build a catalog seed from the given pages.
///
/// Seed entries carry no timestamps; the rendered script stamps them when it
/// runs in the browser.
pub fn build_seed(paths: &ResolvedPaths, pages: &[String], markup: &CardMarkup) -> Result<Catalog> {
    let mut catalog = Catalog::default();
    for page in pages {
        let located = locate_page(paths, page).with_context(|| format!("missing page: {page}"))?;
        let source = located.read()?;
        let entry = seed_entry(page, &source, markup);
        info!(page = %page, cards = entry.cards.len(), "seeded page");
        catalog.pages.insert(page.clone(), entry);
    }
    Ok(catalog)
}

pub fn seed_entry(page: &str, source: &str, markup: &CardMarkup) -> CatalogEntry {
    let parsed = PageMarkup::parse(source);
    let category = page_category(page, &parsed);

    let mut seen_titles = HashSet::new();
    let cards = extract_cards_from(page, &parsed, markup)
        .into_iter()
        .filter_map(|card| card.title.map(|title| collapse_whitespace(&title)))
        .filter(|title| seen_titles.insert(title.clone()))
        .filter_map(|title| {
            let card_key = slug(&title);
            (!card_key.is_empty()).then(|| CatalogCard {
                title,
                card_key,
                ..CatalogCard::default()
            })
        })
        .collect();

    CatalogEntry {
        href: page.to_string(),
        category,
        updated_at: None,
        cards,
        extra: Map::new(),
    }
}

/// First `<h1>` text, or the page name without `.html`.
pub fn page_category(page: &str, parsed: &PageMarkup) -> String {
    parsed
        .first_text("h1")
        .map(|text| collapse_whitespace(&text))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| page.strip_suffix(".html").unwrap_or(page).to_string())
}

pub fn render_seed_json(catalog: &Catalog) -> Result<String> {
    let mut rendered =
        serde_json::to_string_pretty(catalog).context("failed to serialize catalog seed")?;
    rendered.push('\n');
    Ok(rendered)
}

/// Render a self-executing script that merges the seed into `localStorage`
/// without dropping cards already stored there.
pub fn render_seed_js(catalog: &Catalog, storage_key: &str) -> Result<String> {
    let mut pages = String::new();
    for (index, (page_key, entry)) in catalog.pages.iter().enumerate() {
        if index > 0 {
            pages.push(',');
        }
        let cards = entry
            .cards
            .iter()
            .filter(|card| !card.title.trim().is_empty() && !card.card_key.trim().is_empty())
            .map(serde_json::to_string)
            .collect::<serde_json::Result<Vec<_>>>()
            .context("failed to serialize seed cards")?;
        let href = if entry.href.is_empty() { page_key } else { &entry.href };
        let category = if entry.category.is_empty() {
            page_key
        } else {
            &entry.category
        };
        pages.push_str(&format!(
            "{}:{{\"href\":{},\"category\":{},\"updatedAt\":nowIso,\"cards\":[{}]}}",
            js_string(page_key)?,
            js_string(href)?,
            js_string(category)?,
            cards.join(",")
        ));
    }

    let mut out = String::from("(function(){\n  'use strict';\n");
    out.push_str(&format!("  var KEY = {};\n", js_string(storage_key)?));
    out.push_str("  var nowIso = new Date().toISOString();\n");
    out.push_str(&format!(
        "  var SEED = {{ updatedAt: nowIso, pages: {{{pages}}} }};\n"
    ));
    out.push_str(SEED_MERGE_JS);
    Ok(out)
}

fn js_string(value: &str) -> Result<String> {
    serde_json::to_string(value).context("failed to encode string literal")
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

const SEED_MERGE_JS: &str = r#"
  try { window.__BADIANI_SEARCH_CATALOG_SEED__ = SEED; } catch (e) {}

  function safeParse(raw) {
    try { return JSON.parse(raw); } catch (e) { return null; }
  }

  try {
    var catalog = safeParse(localStorage.getItem(KEY));
    if (!catalog || typeof catalog !== 'object') catalog = {};
    if (!catalog.pages || typeof catalog.pages !== 'object') catalog.pages = {};

    Object.keys(SEED.pages).forEach(function(pageKey) {
      var sp = SEED.pages[pageKey];
      var ep = catalog.pages[pageKey];
      if (!ep || typeof ep !== 'object') {
        catalog.pages[pageKey] = sp;
        return;
      }
      if (!ep.href) ep.href = sp.href;
      if (!ep.category) ep.category = sp.category;
      if (!ep.updatedAt) ep.updatedAt = sp.updatedAt;

      var ec = Array.isArray(ep.cards) ? ep.cards : [];
      var known = {};
      ec.forEach(function(c) { if (c && c.cardKey) known[String(c.cardKey)] = true; });
      sp.cards.forEach(function(c) {
        if (c && c.cardKey && !known[String(c.cardKey)]) {
          ec.push(c);
          known[String(c.cardKey)] = true;
        }
      });
      ep.cards = ec;
    });

    catalog.updatedAt = nowIso;
    localStorage.setItem(KEY, JSON.stringify(catalog));
  } catch (e) {}
})();
"#;

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use super::{SeedFormat, build_seed, render_seed_js, render_seed_json, seed_entry};
    use crate::catalog::Catalog;
    use crate::extract::CardMarkup;
    use crate::runtime::{ResolvedPaths, ValueSource};

    fn paths(root: &Path) -> ResolvedPaths {
        let state_dir = root.join(".cardtool");
        ResolvedPaths {
            data_dir: state_dir.join("data"),
            db_path: state_dir.join("data").join("cardtool.db"),
            storage_dir: state_dir.join("data").join("storage"),
            config_path: state_dir.join("config.toml"),
            state_dir,
            project_root: root.to_path_buf(),
            root_source: ValueSource::Flag,
            data_source: ValueSource::Default,
            config_source: ValueSource::Default,
        }
    }

    #[test]
    fn seed_entry_uses_h1_category_and_drops_duplicate_titles() {
        let entry = seed_entry(
            "caffe.html",
            r#"<h1>Caffè <em>Bar</em></h1>
<article class="guide-card" id="card-custom"><h3>Espresso</h3></article>
<article class="guide-card"><h3>Espresso</h3></article>
<article class="guide-card"><h3>Flat   White</h3></article>
<article class="guide-card"><h3>!!!</h3></article>
<article class="guide-card"><p>no heading</p></article>"#,
            &CardMarkup::default(),
        );
        assert_eq!(entry.href, "caffe.html");
        assert_eq!(entry.category, "Caffè Bar");
        assert_eq!(entry.updated_at, None);
        let cards = entry
            .cards
            .iter()
            .map(|card| (card.title.as_str(), card.card_key.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            cards,
            vec![("Espresso", "espresso"), ("Flat White", "flat-white")]
        );
    }

    #[test]
    fn seed_entry_falls_back_to_page_name_for_category() {
        let entry = seed_entry("festive.html", "<p>no heading</p>", &CardMarkup::default());
        assert_eq!(entry.category, "festive");
        assert!(entry.cards.is_empty());
    }

    #[test]
    fn build_seed_requires_every_page() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join("caffe.html"),
            r#"<h1>Caffè</h1><div class="guide-card"><h3>Latte</h3></div>"#,
        )
        .expect("write");

        let seed = build_seed(
            &paths(temp.path()),
            &["caffe.html".to_string()],
            &CardMarkup::default(),
        )
        .expect("seed");
        assert_eq!(seed.card_count(), 1);
        assert_eq!(seed.updated_at, None);

        let err = build_seed(
            &paths(temp.path()),
            &["caffe.html".to_string(), "gelato-lab.html".to_string()],
            &CardMarkup::default(),
        )
        .expect_err("must fail");
        assert!(format!("{err:#}").contains("missing page: gelato-lab.html"));
    }

    #[test]
    fn rendered_seeds_carry_the_storage_key_and_cards() {
        let catalog = Catalog::single(
            "caffe.html",
            seed_entry(
                "caffe.html",
                r#"<h1>Caffè "Bar"</h1><div class="guide-card"><h3>Latte</h3></div>"#,
                &CardMarkup::default(),
            ),
        );

        let js = render_seed_js(&catalog, "badianiSearchCatalog.v2").expect("render js");
        assert!(js.starts_with("(function(){"));
        assert!(js.contains("var KEY = \"badianiSearchCatalog.v2\";"));
        assert!(js.contains(r#""caffe.html":{"href":"caffe.html","category":"Caffè \"Bar\"","updatedAt":nowIso"#));
        assert!(js.contains(r#"{"title":"Latte","cardKey":"latte","signals":{"sicurezza":false,"chiusura":false,"upselling":false}}"#));
        assert!(js.trim_end().ends_with("})();"));

        let json = render_seed_json(&catalog).expect("render json");
        let parsed: Catalog = serde_json::from_str(&json).expect("parse seed json");
        assert_eq!(parsed, catalog);
    }

    #[test]
    fn rendered_seed_lists_pages_on_one_line() {
        let mut catalog = Catalog::single(
            "caffe.html",
            seed_entry(
                "caffe.html",
                r#"<div class="guide-card"><h3>Latte</h3></div>"#,
                &CardMarkup::default(),
            ),
        );
        catalog.pages.insert(
            "festive.html".to_string(),
            seed_entry("festive.html", "<p>none</p>", &CardMarkup::default()),
        );

        let js = render_seed_js(&catalog, "seed.key").expect("render js");
        let lines = js.lines().take(4).collect::<Vec<_>>();
        assert_eq!(lines[0], "(function(){");
        assert_eq!(lines[1], "  'use strict';");
        assert_eq!(lines[2], "  var KEY = \"seed.key\";");
        assert_eq!(lines[3], "  var nowIso = new Date().toISOString();");
        let seed_line = js.lines().nth(4).expect("seed line");
        assert!(seed_line.starts_with(r#"  var SEED = { updatedAt: nowIso, pages: {"caffe.html":{"href":"caffe.html","category":"caffe""#));
        assert!(seed_line.ends_with(
            r#"},"festive.html":{"href":"festive.html","category":"festive","updatedAt":nowIso,"cards":[]}} };"#
        ));
    }

    #[test]
    fn seed_format_parses_names() {
        assert_eq!(SeedFormat::parse("JSON").expect("parse"), SeedFormat::Json);
        assert_eq!(SeedFormat::parse("js").expect("parse"), SeedFormat::Js);
        assert!(SeedFormat::parse("yaml").is_err());
    }
}
