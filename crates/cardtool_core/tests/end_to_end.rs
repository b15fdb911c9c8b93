use std::fs;
use std::path::Path;

use cardtool_core::audit::{AuditIssueKind, audit_pages, render_report};
use cardtool_core::config::{BackendKind, CardConfig};
use cardtool_core::extract::extract_cards;
use cardtool_core::resolve::{MatchRule, resolve_in_catalog, resolve_match};
use cardtool_core::runtime::{ResolvedPaths, ValueSource, open_catalog_store};
use cardtool_core::score::search_catalog;
use cardtool_core::sync::sync_catalog;
use tempfile::tempdir;

const CAFFE: &str = r#"<!doctype html>
<html>
<head>
  <script src="scripts/site.js" defer></script>
  <script src="scripts/deep-link.js" defer></script>
</head>
<body>
  <h1>Caffè</h1>
  <article class="guide-card" id="card-latte"><h3>Latte</h3></article>
  <article class="guide-card"><h3>Cappuccino</h3></article>
</body>
</html>"#;

const FESTIVE: &str = r#"<h1>Festive</h1>
<article class="guide-card" id="card-churros"><h3>Churros</h3></article>"#;

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
fn pages_flow_through_catalog_resolution_search_and_audit() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path();
    fs::write(root.join("caffe.html"), CAFFE).expect("write caffe");
    fs::write(root.join("festive.html"), FESTIVE).expect("write festive");
    let paths = paths(root);

    let mut config = CardConfig::default();
    config.catalog.backend = BackendKind::File;

    let cards = extract_cards("caffe.html", CAFFE, &config.cards);
    let latte = resolve_match("latte", &cards, &config.cards.id_prefix).expect("latte");
    assert_eq!(latte.rule, MatchRule::ExactId);
    assert_eq!(latte.card.ordinal_index, 1);

    let mut store = open_catalog_store(&paths, &config).expect("open store");
    let report = sync_catalog(&paths, &config, &mut store, &[]).expect("sync");
    assert_eq!(report.total_pages, 2);
    assert_eq!(report.total_cards, 3);
    assert!(
        paths
            .storage_dir
            .join("badianiSearchCatalog.v2.json")
            .is_file()
    );

    let reopened = open_catalog_store(&paths, &config).expect("reopen store");
    let catalog = reopened.load();
    assert_eq!(catalog.card_count(), 3);
    assert_eq!(catalog.pages["caffe.html"].category, "Caffè");

    let hit = resolve_in_catalog("Cappuccino", &catalog, Some("caffe.html")).expect("hit");
    assert_eq!(hit.rule, MatchRule::CardKey);
    assert_eq!(hit.href(), "caffe.html?q=cappuccino");
    assert!(resolve_in_catalog("churros", &catalog, Some("caffe.html")).is_none());
    let across = resolve_in_catalog("churros", &catalog, None).expect("across pages");
    assert_eq!(across.page_key, "festive.html");

    let hits = search_catalog("latte", &catalog, &config.search, None);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Latte");
    assert_eq!(hits[0].href, "caffe.html?q=latte");

    let audit = audit_pages(&paths, &config).expect("audit");
    assert!(audit.passed());
    assert_eq!(audit.total_cards, 3);
    assert_eq!(audit.total_errors, 0);
    assert_eq!(audit.total_warnings, 1);
    assert_eq!(audit.pages[0].issues[0].kind, AuditIssueKind::MissingId);
    assert!(render_report(&audit).contains("Result: PASS"));
}

#[test]
fn reversed_scripts_fail_the_audit() {
    let temp = tempdir().expect("tempdir");
    let root = temp.path();
    fs::write(
        root.join("caffe.html"),
        CAFFE.replace(
            r#"<script src="scripts/site.js" defer></script>
  <script src="scripts/deep-link.js" defer></script>"#,
            r#"<script src="scripts/deep-link.js" defer></script>
  <script src="scripts/site.js" defer></script>"#,
        ),
    )
    .expect("write caffe");

    let audit = audit_pages(&paths(root), &CardConfig::default()).expect("audit");
    assert!(!audit.passed());
    assert_eq!(audit.total_errors, 1);
    assert_eq!(
        audit.pages[0].issues[0].kind,
        AuditIssueKind::ScriptOrderViolation
    );
    assert!(render_report(&audit).contains("Result: FAIL (errors found)"));
}
