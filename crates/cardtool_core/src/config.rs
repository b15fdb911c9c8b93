use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::catalog::CATALOG_STORAGE_KEY;
use crate::extract::CardMarkup;
use crate::score::ScoreWeights;

pub const DEFAULT_DEEP_LINK_SCRIPT: &str = "scripts/deep-link.js";
pub const DEFAULT_HYDRATION_SCRIPT: &str = "scripts/site.js";

pub const DEFAULT_AUDIT_EXCLUDES: &[&str] = &["debug-carousel.html", "quiz-solution.html"];

pub const DEFAULT_SEED_PAGES: &[&str] = &[
    "caffe.html",
    "gelato-lab.html",
    "operations.html",
    "pastries.html",
    "sweet-treats.html",
    "festive.html",
    "slitti-yoyo.html",
    "story-orbit.html",
];

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct CardConfig {
    #[serde(default)]
    pub cards: CardMarkup,
    #[serde(default)]
    pub scripts: ScriptsSection,
    #[serde(default)]
    pub audit: AuditSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub search: ScoreWeights,
    #[serde(default)]
    pub seed: SeedSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScriptsSection {
    pub deep_link: String,
    pub hydration: String,
}

impl Default for ScriptsSection {
    fn default() -> Self {
        Self {
            deep_link: DEFAULT_DEEP_LINK_SCRIPT.to_string(),
            hydration: DEFAULT_HYDRATION_SCRIPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuditSection {
    pub exclude: Vec<String>,
    pub recursive: bool,
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            exclude: DEFAULT_AUDIT_EXCLUDES
                .iter()
                .map(ToString::to_string)
                .collect(),
            recursive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    File,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::File => "file",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" => Ok(Self::File),
            other => bail!("unknown catalog backend `{other}` (expected `sqlite` or `file`)"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogSection {
    pub backend: BackendKind,
    pub storage_key: String,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            storage_key: CATALOG_STORAGE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SeedSection {
    pub pages: Vec<String>,
}

impl Default for SeedSection {
    fn default() -> Self {
        Self {
            pages: DEFAULT_SEED_PAGES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl CardConfig {
    /// Resolve the catalog backend: env CARDTOOL_CATALOG_BACKEND > config.
    pub fn catalog_backend(&self) -> Result<BackendKind> {
        if let Ok(value) = env::var("CARDTOOL_CATALOG_BACKEND") {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return BackendKind::parse(trimmed);
            }
        }
        Ok(self.catalog.backend)
    }

    /// Resolve the storage key: env CARDTOOL_STORAGE_KEY > config > default.
    pub fn storage_key(&self) -> String {
        if let Ok(value) = env::var("CARDTOOL_STORAGE_KEY") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        if self.catalog.storage_key.trim().is_empty() {
            CATALOG_STORAGE_KEY.to_string()
        } else {
            self.catalog.storage_key.clone()
        }
    }

    pub fn is_excluded(&self, page: &str) -> bool {
        self.audit.exclude.iter().any(|excluded| excluded == page)
    }
}

/// Load and parse a CardConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<CardConfig> {
    if !config_path.exists() {
        return Ok(CardConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: CardConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    if parsed.cards.class_marker.trim().is_empty() {
        bail!(
            "[cards].class_marker cannot be empty in {}",
            config_path.display()
        );
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_matches_site_conventions() {
        let config = CardConfig::default();
        assert_eq!(config.cards.class_marker, "guide-card");
        assert_eq!(config.cards.heading, "h3");
        assert_eq!(config.cards.id_prefix, "card-");
        assert_eq!(config.scripts.deep_link, "scripts/deep-link.js");
        assert_eq!(config.scripts.hydration, "scripts/site.js");
        assert!(config.is_excluded("quiz-solution.html"));
        assert_eq!(config.catalog.backend, BackendKind::Sqlite);
        assert_eq!(config.search, ScoreWeights::default());
        assert_eq!(config.seed.pages.len(), 8);
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert_eq!(config, CardConfig::default());
    }

    #[test]
    fn load_config_parses_partial_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[cards]
heading = "h2"

[audit]
exclude = ["draft.html"]

[catalog]
backend = "file"

[search]
exact = 20
token = 3

[seed]
pages = ["caffe.html"]
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.cards.heading, "h2");
        assert_eq!(config.cards.class_marker, "guide-card");
        assert_eq!(config.audit.exclude, vec!["draft.html".to_string()]);
        assert!(!config.is_excluded("quiz-solution.html"));
        assert_eq!(config.catalog.backend, BackendKind::File);
        assert_eq!(config.catalog.storage_key, "badianiSearchCatalog.v2");
        assert_eq!(config.search.exact, 20);
        assert_eq!(config.search.token, 3);
        assert_eq!(config.search.all_tokens, 5);
        assert_eq!(config.seed.pages, vec!["caffe.html".to_string()]);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[cards\nheading = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn load_config_rejects_empty_class_marker() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[cards]\nclass_marker = \"  \"\n").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("class_marker cannot be empty"));
    }

    #[test]
    fn backend_kind_parses_names() {
        assert_eq!(BackendKind::parse("SQLite").expect("parse"), BackendKind::Sqlite);
        assert_eq!(BackendKind::parse(" file ").expect("parse"), BackendKind::File);
        assert!(BackendKind::parse("redis").is_err());
    }
}
