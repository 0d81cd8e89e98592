use crate::dictionary::LabelPattern;
use crate::model::CanonicalField;
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub portal: PortalConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.portal.name.trim().is_empty() {
            bail!("portal.name must not be empty");
        }
        if self.portal.start_url.trim().is_empty() {
            bail!("portal.start_url must not be empty");
        }
        self.start_url()?;
        if let Some(base) = &self.portal.base_url {
            Url::parse(base).with_context(|| format!("invalid portal.base_url {base}"))?;
        }

        if self.traversal.max_pages == 0 {
            bail!("traversal.max_pages must be at least 1");
        }

        if self.fetch.mode == FetchMode::File && self.fetch.fixture_dir.is_none() {
            bail!("fetch.fixture_dir is required for file mode");
        }

        if self.locale.next_labels.iter().any(|l| l.trim().is_empty()) {
            bail!("locale.next_labels must not contain empty labels");
        }

        for (field, labels) in &self.labels.synonyms {
            for label in labels {
                LabelPattern::parse(label)
                    .with_context(|| format!("invalid label for {}", field.key()))?;
            }
        }

        Ok(())
    }

    pub fn start_url(&self) -> Result<Url> {
        Url::parse(self.portal.start_url.trim())
            .with_context(|| format!("invalid portal.start_url {}", self.portal.start_url))
    }

    pub fn base_url(&self) -> Result<Url> {
        match &self.portal.base_url {
            Some(base) => {
                Url::parse(base).with_context(|| format!("invalid portal.base_url {base}"))
            }
            None => self.start_url(),
        }
    }

    pub fn sanitized_portal_name(&self) -> String {
        sanitize_for_path(&self.portal.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub name: String,
    pub start_url: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    #[default]
    Http,
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub mode: FetchMode,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u8,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub fixture_dir: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::Http,
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            user_agent: None,
            fixture_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocaleConfig {
    #[serde(default = "default_next_labels")]
    pub next_labels: Vec<String>,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            next_labels: default_next_labels(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LabelsConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub synonyms: BTreeMap<CanonicalField, Vec<String>>,
    #[serde(default)]
    pub link_keywords: BTreeMap<CanonicalField, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReviewConfig {
    #[serde(default)]
    pub expected_contract_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_records_path")]
    pub records_path: PathBuf,
    #[serde(default = "default_diagnostics_dir")]
    pub diagnostics_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            records_path: default_records_path(),
            diagnostics_dir: default_diagnostics_dir(),
        }
    }
}

pub fn load_configs_from_dir(config_dir: &Path) -> Result<Vec<LoadedConfig>> {
    if !config_dir.exists() {
        bail!("config dir does not exist: {}", config_dir.display());
    }

    let mut loaded = Vec::new();
    for entry in WalkDir::new(config_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("toml") {
            continue;
        }
        loaded.push(load_config_file(path)?);
    }

    loaded.sort_by(|a, b| a.config.portal.name.cmp(&b.config.portal.name));
    Ok(loaded)
}

pub fn load_config_file(config_path: &Path) -> Result<LoadedConfig> {
    let text = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config: {}", config_path.display()))?;
    let config = parse_config(&text)
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    Ok(LoadedConfig {
        path: config_path.to_path_buf(),
        config,
    })
}

pub fn parse_config(text: &str) -> Result<RunConfig> {
    let config: RunConfig = toml::from_str(text).context("failed to parse toml")?;
    config.validate()?;
    Ok(config)
}

pub fn resolve_path(base_config_path: &Path, maybe_relative: &Path) -> Result<PathBuf> {
    if maybe_relative.is_absolute() {
        return Ok(maybe_relative.to_path_buf());
    }

    let parent = base_config_path.parent().ok_or_else(|| {
        anyhow!(
            "config has no parent directory: {}",
            base_config_path.display()
        )
    })?;

    Ok(parent.join(maybe_relative))
}

pub fn sanitize_for_path(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u8 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    400
}

fn default_max_pages() -> usize {
    50
}

pub fn default_next_labels() -> Vec<String> {
    ["Siguiente", "Hurrengoa", "Next", "Suivant", "›", "»"]
        .iter()
        .map(|l| l.to_string())
        .collect()
}

fn default_records_path() -> PathBuf {
    PathBuf::from("data/out/records.jsonl")
}

fn default_diagnostics_dir() -> PathBuf {
    PathBuf::from("data/out/diagnostics")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_ascii_alphanumerics() {
        assert_eq!(sanitize_for_path("Euskadi: contratación"), "Euskadi--contrataci-n");
    }

    #[test]
    fn relative_paths_resolve_beside_the_config() {
        let config = Path::new("/etc/rtender/portal.toml");
        assert_eq!(
            resolve_path(config, Path::new("site")).unwrap(),
            PathBuf::from("/etc/rtender/site")
        );
        assert_eq!(
            resolve_path(config, Path::new("/srv/site")).unwrap(),
            PathBuf::from("/srv/site")
        );
    }
}
