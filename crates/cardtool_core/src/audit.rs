use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::config::{CardConfig, ScriptsSection};
use crate::extract::{Card, CardMarkup, extract_cards_from};
use crate::filesystem::{ScanOptions, scan_pages};
use crate::markup::PageMarkup;
use crate::runtime::ResolvedPaths;
use crate::slug::{is_canonical_slug, slug};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditIssueKind {
    MissingTitle,
    UnderivableKey,
    DuplicateKey,
    MissingId,
    NonCanonicalId,
    MissingCanonicalPrefix,
    DuplicateTitle,
    ScriptOrderViolation,
}

impl AuditIssueKind {
    pub fn severity(self) -> Severity {
        match self {
            Self::MissingTitle
            | Self::UnderivableKey
            | Self::DuplicateKey
            | Self::ScriptOrderViolation => Severity::Error,
            Self::MissingId
            | Self::NonCanonicalId
            | Self::MissingCanonicalPrefix
            | Self::DuplicateTitle => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditIssue {
    pub kind: AuditIssueKind,
    pub severity: Severity,
    /// Ordinal of the card raising the issue; `None` for page-level issues.
    pub card: Option<usize>,
    /// Ordinal of the earlier card a duplicate collides with.
    pub first_card: Option<usize>,
    pub message: String,
}

impl AuditIssue {
    fn new(kind: AuditIssueKind, card: Option<usize>, first_card: Option<usize>, message: String) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            card,
            first_card,
            message,
        }
    }

    pub fn render(&self) -> String {
        format!("{}: {}", self.severity.label(), self.message)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageAudit {
    pub page: String,
    pub cards_found: usize,
    pub errors: usize,
    pub warnings: usize,
    pub issues: Vec<AuditIssue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub pages_scanned: usize,
    pub total_cards: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub pages: Vec<PageAudit>,
}

impl AuditReport {
    pub fn from_pages(pages: Vec<PageAudit>) -> Self {
        Self {
            pages_scanned: pages.len(),
            total_cards: pages.iter().map(|page| page.cards_found).sum(),
            total_errors: pages.iter().map(|page| page.errors).sum(),
            total_warnings: pages.iter().map(|page| page.warnings).sum(),
            pages,
        }
    }

    /// Warnings never fail a run; errors do, and so does scanning nothing.
    pub fn passed(&self) -> bool {
        self.pages_scanned > 0 && self.total_errors == 0
    }

    pub fn exit_code(&self) -> u8 {
        if self.passed() { 0 } else { 1 }
    }
}

/// Audit every page under the project root.
pub fn audit_pages(paths: &ResolvedPaths, config: &CardConfig) -> Result<AuditReport> {
    let pages = scan_pages(
        paths,
        &ScanOptions {
            recursive: config.audit.recursive,
            exclude: config.audit.exclude.clone(),
        },
    )?;
    let mut audits = Vec::with_capacity(pages.len());
    for page in &pages {
        let source = page.read()?;
        audits.push(audit_page(&page.page_key, &source, &config.cards, &config.scripts));
    }
    Ok(AuditReport::from_pages(audits))
}

pub fn audit_page(
    page: &str,
    source: &str,
    markup: &CardMarkup,
    scripts: &ScriptsSection,
) -> PageAudit {
    let parsed = PageMarkup::parse(source);
    let mut issues = check_script_order(&parsed, scripts);
    let cards = extract_cards_from(page, &parsed, markup);
    issues.extend(check_cards(&cards, markup));

    let errors = issues
        .iter()
        .filter(|issue| issue.severity == Severity::Error)
        .count();
    debug!(page, cards = cards.len(), errors, "audited page");
    PageAudit {
        page: page.to_string(),
        cards_found: cards.len(),
        errors,
        warnings: issues.len() - errors,
        issues,
    }
}

/// The hydration script must run before the deep-link script; with `defer`
/// execution follows source order.
fn check_script_order(parsed: &PageMarkup, scripts: &ScriptsSection) -> Vec<AuditIssue> {
    let Some(deep_link) = parsed.script_position(&scripts.deep_link) else {
        return Vec::new();
    };
    let message = match parsed.script_position(&scripts.hydration) {
        None => format!(
            "{} is included but {} is missing (catalog hydration won't run before deep linking).",
            scripts.deep_link, scripts.hydration
        ),
        Some(hydration) if hydration > deep_link => format!(
            "{} appears before {} (deferred scripts execute in source order).",
            scripts.deep_link, scripts.hydration
        ),
        Some(_) => return Vec::new(),
    };
    vec![AuditIssue::new(
        AuditIssueKind::ScriptOrderViolation,
        None,
        None,
        message,
    )]
}

fn check_cards(cards: &[Card], markup: &CardMarkup) -> Vec<AuditIssue> {
    let mut issues = Vec::new();
    let mut seen_keys: HashMap<&str, usize> = HashMap::new();
    let mut seen_titles: HashMap<String, usize> = HashMap::new();

    for card in cards {
        let index = card.ordinal_index;
        let id_display = format!("{:?}", card.explicit_id.as_deref());

        if card.title.is_none() {
            issues.push(AuditIssue::new(
                AuditIssueKind::MissingTitle,
                Some(index),
                None,
                format!("card #{index} has no <{}> title, missing title (id={id_display}).", markup.heading),
            ));
        }
        if !card.has_key() {
            issues.push(AuditIssue::new(
                AuditIssueKind::UnderivableKey,
                Some(index),
                None,
                format!(
                    "card #{index} could not derive a cardKey, missing key (id={id_display}, title={:?}).",
                    card.title.as_deref()
                ),
            ));
        }

        if card.has_key() {
            let key = card.card_key.as_str();
            if let Some(first) = seen_keys.get(key).copied() {
                issues.push(AuditIssue::new(
                    AuditIssueKind::DuplicateKey,
                    Some(index),
                    Some(first),
                    format!("duplicate key '{key}' (cards #{first} and #{index})."),
                ));
            } else {
                seen_keys.insert(key, index);
            }

            match card.explicit_id.as_deref() {
                None => issues.push(AuditIssue::new(
                    AuditIssueKind::MissingId,
                    Some(index),
                    None,
                    format!(
                        "card #{index} is missing id, should be '{}' for stable deep-linking.",
                        markup.canonical_id(key)
                    ),
                )),
                Some(id) if card.prefixed_key(markup).is_some() => {
                    if !is_canonical_slug(key) {
                        issues.push(AuditIssue::new(
                            AuditIssueKind::NonCanonicalId,
                            Some(index),
                            None,
                            format!(
                                "non-canonical key '{key}' in id '{id}' (suggest: '{}').",
                                markup.canonical_id(&slug(key))
                            ),
                        ));
                    }
                }
                Some(id) => issues.push(AuditIssue::new(
                    AuditIssueKind::MissingCanonicalPrefix,
                    Some(index),
                    None,
                    format!(
                        "card #{index} id '{id}' does not use canonical prefix '{}'.",
                        markup.id_prefix
                    ),
                )),
            }
        }

        if let Some(title) = card.title.as_deref() {
            let normalized = slug(title);
            if let Some(first) = seen_titles.get(&normalized).copied() {
                issues.push(AuditIssue::new(
                    AuditIssueKind::DuplicateTitle,
                    Some(index),
                    Some(first),
                    format!("duplicate title '{normalized}' (cards #{first} and #{index})."),
                ));
            } else {
                seen_titles.insert(normalized, index);
            }
        }
    }
    issues
}

/// Plain-text report: page headers, issue lines, summaries and the verdict.
pub fn render_report(report: &AuditReport) -> String {
    let mut out = String::new();
    if report.pages_scanned == 0 {
        out.push_str("No HTML pages found in project root.\n");
    }
    for page in &report.pages {
        out.push_str(&format!("\n=== {} ===\n", page.page));
        if page.issues.is_empty() {
            out.push_str("OK: no issues.\n");
        }
        for issue in &page.issues {
            out.push_str(&issue.render());
            out.push('\n');
        }
        out.push_str(&format!("cards found: {}\n", page.cards_found));
    }
    out.push_str(&format!(
        "\npages scanned: {}\ntotal cards: {}\nerrors: {} | warnings: {}\n",
        report.pages_scanned, report.total_cards, report.total_errors, report.total_warnings
    ));
    if report.passed() {
        out.push_str("\nResult: PASS\n");
    } else if report.pages_scanned == 0 {
        out.push_str("\nResult: FAIL (no pages scanned)\n");
    } else {
        out.push_str("\nResult: FAIL (errors found)\n");
    }
    out
}
