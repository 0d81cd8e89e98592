use crate::config::{
    FetchMode, LoadedConfig, RunConfig, load_config_file, load_configs_from_dir, resolve_path,
};
use crate::dictionary::LabelDictionary;
use crate::extract::{RecordExtractor, ReviewPolicy};
use crate::fetch::HttpNavigator;
use crate::model::{CanonicalRecord, TraversalReport};
use crate::navigator::{Navigator, PageSnapshot, StaticSite};
use crate::pagination::PaginationController;
use crate::store::{JsonLinesSink, MemorySink, RecordSink};
use crate::traversal::{Traversal, TraversalOptions};
use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub config_path: PathBuf,
    pub max_pages: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub config_path: Option<PathBuf>,
    pub url: Option<String>,
    pub file: Option<PathBuf>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub config_dir: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub portal: String,
    pub dictionary_version: String,
    pub records_path: Option<PathBuf>,
    pub diagnostics: usize,
    #[serde(flatten)]
    pub report: TraversalReport,
}

pub fn crawl(options: &CrawlOptions) -> Result<RunSummary> {
    let loaded = load_config_file(&options.config_path)?;
    let config = &loaded.config;
    let traversal_options = TraversalOptions {
        max_pages: options.max_pages.unwrap_or(config.traversal.max_pages),
    };
    if traversal_options.max_pages == 0 {
        bail!("--max-pages must be at least 1");
    }

    let mut traversal = build_traversal(config, traversal_options)?;
    let dictionary_version = traversal.extractor().dictionary().version.clone();
    info!(
        portal = %config.portal.name,
        labels = %dictionary_version,
        mode = ?config.fetch.mode,
        "crawl start"
    );

    if options.dry_run {
        let mut sink = MemorySink::default();
        let report = run_with_navigator(&loaded, &mut traversal, &mut sink)?;
        info!(records = sink.records.len(), "dry run enabled; records not persisted");
        return Ok(RunSummary {
            portal: config.portal.name.clone(),
            dictionary_version,
            records_path: None,
            diagnostics: sink.diagnostics.len(),
            report,
        });
    }

    let records_path = resolve_path(&loaded.path, &config.output.records_path)?;
    let diagnostics_dir = resolve_path(&loaded.path, &config.output.diagnostics_dir)?
        .join(config.sanitized_portal_name());
    let mut sink = JsonLinesSink::create(&records_path, &diagnostics_dir)?;
    let report = run_with_navigator(&loaded, &mut traversal, &mut sink)?;
    sink.flush()?;
    info!(records = %records_path.display(), "records written");

    Ok(RunSummary {
        portal: config.portal.name.clone(),
        dictionary_version,
        records_path: Some(records_path),
        diagnostics: sink.diagnostics_written(),
        report,
    })
}

pub fn build_traversal(config: &RunConfig, options: TraversalOptions) -> Result<Traversal> {
    let extractor = build_extractor(config)?;
    let pagination = PaginationController::from_locale(&config.locale);
    Ok(Traversal::new(extractor, pagination, options))
}

pub fn build_extractor(config: &RunConfig) -> Result<RecordExtractor> {
    let dictionary = effective_dictionary(config)?;
    Ok(RecordExtractor::new(
        dictionary,
        ReviewPolicy::from(&config.review),
    ))
}

pub fn effective_dictionary(config: &RunConfig) -> Result<LabelDictionary> {
    LabelDictionary::builtin()
        .with_overrides(&config.labels)
        .context("invalid [labels] overrides")
}

pub fn run_with_navigator<S: RecordSink>(
    loaded: &LoadedConfig,
    traversal: &mut Traversal,
    sink: &mut S,
) -> Result<TraversalReport> {
    let config = &loaded.config;
    let start_url = config.start_url()?;
    match config.fetch.mode {
        FetchMode::Http => {
            let mut navigator = HttpNavigator::new(&config.fetch, start_url)?;
            traversal.run(&mut navigator, sink)
        }
        FetchMode::File => {
            let mut navigator = fixture_site(loaded, start_url)?;
            traversal.run(&mut navigator, sink)
        }
    }
}

pub fn fixture_site(loaded: &LoadedConfig, start_url: Url) -> Result<StaticSite> {
    let config = &loaded.config;
    let Some(dir) = &config.fetch.fixture_dir else {
        bail!("fetch.fixture_dir is required for file mode");
    };
    let dir = resolve_path(&loaded.path, dir)?;
    StaticSite::from_dir(&dir, &config.base_url()?, start_url)
}

pub fn extract_document(options: &ExtractOptions) -> Result<CanonicalRecord> {
    let loaded = options
        .config_path
        .as_deref()
        .map(load_config_file)
        .transpose()?;
    let extractor = match &loaded {
        Some(loaded) => build_extractor(&loaded.config)?,
        None => RecordExtractor::default(),
    };

    let snapshot = match (&options.url, &options.file) {
        (Some(_), Some(_)) => bail!("--url and --file are mutually exclusive"),
        (None, None) => bail!("either --url or --file must be provided"),
        (Some(url), None) => {
            let url = Url::parse(url).with_context(|| format!("invalid --url {url}"))?;
            let fetch = loaded
                .as_ref()
                .map(|l| l.config.fetch.clone())
                .unwrap_or_default();
            let mut navigator = HttpNavigator::new(&fetch, url.clone())?;
            navigator.open_document(&url)?
        }
        (None, Some(path)) => read_snapshot(path, options.base_url.as_deref())?,
    };

    let record = extractor.from_detail(&snapshot, None)?;
    info!(
        source_id = %record.source_id,
        fields = record.fields.len(),
        "document extracted"
    );
    Ok(record)
}

fn read_snapshot(path: &Path, base_url: Option<&str>) -> Result<PageSnapshot> {
    let markup = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read document {}", path.display()))?;
    let url = match base_url {
        Some(base) => Url::parse(base).with_context(|| format!("invalid --base-url {base}"))?,
        None => {
            let absolute = std::path::absolute(path)
                .with_context(|| format!("cannot resolve {}", path.display()))?;
            Url::from_file_path(&absolute)
                .map_err(|_| anyhow::anyhow!("cannot address {}", absolute.display()))?
        }
    };
    Ok(PageSnapshot { url, markup })
}

pub fn validate_configs(options: &ValidateOptions) -> Result<Vec<String>> {
    let mut messages = Vec::new();

    if let Some(file) = &options.config_file {
        let loaded = load_config_file(file)?;
        effective_dictionary(&loaded.config)?;
        messages.push(format!(
            "OK: {} ({})",
            loaded.config.portal.name,
            file.display()
        ));
        return Ok(messages);
    }

    if let Some(dir) = &options.config_dir {
        let configs = load_configs_from_dir(dir)?;
        for loaded in configs {
            effective_dictionary(&loaded.config)
                .with_context(|| format!("invalid config {}", loaded.path.display()))?;
            messages.push(format!(
                "OK: {} ({})",
                loaded.config.portal.name,
                loaded.path.display()
            ));
        }
        return Ok(messages);
    }

    bail!("either --config-dir or --config must be provided");
}
