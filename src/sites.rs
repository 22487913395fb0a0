//! Site table: one [`SiteConfig`] per scraped outlet.
//!
//! Adding a site means adding a YAML entry, not code. The built-in table is
//! embedded from `data/sites.yaml`; a user-supplied file replaces it entirely.

use crate::discovery::DiscoveryConfig;
use crate::error::ScrapeError;
use crate::selectors::{ContentRecipe, FieldRules, ImageRecipe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

const BUILTIN_SITES_YAML: &str = include_str!("../data/sites.yaml");

/// Wait rule for pages that need a headless browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRule {
    /// CSS selector that must appear before the page is considered rendered.
    pub wait_for: String,
    #[serde(default = "RenderRule::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RenderRule {
    const MIN_SECS: u64 = 5;
    const MAX_SECS: u64 = 10;

    fn default_timeout_secs() -> u64 {
        Self::MAX_SECS
    }

    /// Configured timeout clamped to 5..=10 seconds.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.clamp(Self::MIN_SECS, Self::MAX_SECS))
    }
}

/// Everything the pipeline and discovery need to know about one outlet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Short identifier, also used in output file names.
    pub name: String,
    pub base_url: String,
    /// Constant `source_country` for every record.
    pub source_country: String,
    /// `<html lang>` value to `source_language`.
    #[serde(default)]
    pub languages: BTreeMap<String, String>,
    /// Used when the page has no `lang` attribute.
    #[serde(default)]
    pub default_language: Option<String>,
    #[serde(default)]
    pub fields: FieldRules,
    #[serde(default)]
    pub content: ContentRecipe,
    #[serde(default)]
    pub images: ImageRecipe,
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub render: Option<RenderRule>,
}

impl SiteConfig {
    /// Map an `<html lang>` value: exact key, then lower-cased primary subtag,
    /// then the raw value.
    pub fn language_for(&self, lang: Option<&str>) -> Option<String> {
        let Some(lang) = lang.map(str::trim).filter(|l| !l.is_empty()) else {
            return self.default_language.clone();
        };
        if let Some(mapped) = self.languages.get(lang) {
            return Some(mapped.clone());
        }
        let primary = lang
            .split(['-', '_'])
            .next()
            .unwrap_or(lang)
            .to_ascii_lowercase();
        Some(
            self.languages
                .get(&primary)
                .cloned()
                .unwrap_or_else(|| lang.to_string()),
        )
    }
}

/// All configured sites, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct SiteTable {
    sites: BTreeMap<String, SiteConfig>,
}

impl SiteTable {
    /// Parse a YAML list of site entries.
    pub fn from_yaml(yaml: &str) -> Result<Self, ScrapeError> {
        let entries: Vec<SiteConfig> = serde_yaml::from_str(yaml)
            .map_err(|e| ScrapeError::Config(format!("invalid site table: {e}")))?;
        let mut sites = BTreeMap::new();
        for site in entries {
            if sites.contains_key(&site.name) {
                return Err(ScrapeError::Config(format!(
                    "duplicate site entry {:?}",
                    site.name
                )));
            }
            sites.insert(site.name.clone(), site);
        }
        Ok(Self { sites })
    }

    /// The table compiled into the binary.
    pub fn builtin() -> Result<Self, ScrapeError> {
        Self::from_yaml(BUILTIN_SITES_YAML)
    }

    /// Load a site table from a YAML file on disk.
    ///
    /// # Arguments
    ///
    /// * `path` - YAML file holding a list of site entries
    ///
    /// # Returns
    ///
    /// The parsed table, or an error when the file is unreadable or invalid.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ScrapeError> {
        let yaml = tokio::fs::read_to_string(path.as_ref()).await?;
        let table = Self::from_yaml(&yaml)?;
        info!(count = table.len(), "Loaded site table");
        Ok(table)
    }

    /// Look up a site by name.
    ///
    /// # Arguments
    ///
    /// * `name` - the site's short identifier, as in `--site`
    ///
    /// # Returns
    ///
    /// The site entry, or a config error listing the known names.
    pub fn get(&self, name: &str) -> Result<&SiteConfig, ScrapeError> {
        self.sites.get(name).ok_or_else(|| {
            ScrapeError::Config(format!(
                "unknown site {name:?}; known sites: {}",
                self.names().join(", ")
            ))
        })
    }

    /// Site names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.sites.keys().map(String::as_str).collect()
    }

    /// Number of configured sites.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
