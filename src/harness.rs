use crate::config::{FetchMode, load_config_file};
use crate::pipeline::{build_traversal, fixture_site};
use crate::store::MemorySink;
use crate::traversal::TraversalOptions;
use anyhow::{Result, bail};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub config_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub first_run_pages: usize,
    pub first_run_emitted: usize,
    pub first_run_duplicates: usize,
    pub second_run_pages: usize,
    pub second_run_emitted: usize,
    pub changed_records: usize,
    pub stable: bool,
}

pub fn run_harness(options: &HarnessOptions) -> Result<HarnessReport> {
    let loaded = load_config_file(&options.config_path)?;
    if loaded.config.fetch.mode != FetchMode::File {
        bail!("harness needs fetch.mode = \"file\"");
    }
    let start_url = loaded.config.start_url()?;
    let mut traversal = build_traversal(
        &loaded.config,
        TraversalOptions {
            max_pages: loaded.config.traversal.max_pages,
        },
    )?;

    let mut first_sink = MemorySink::default();
    let first = traversal.run(&mut fixture_site(&loaded, start_url.clone())?, &mut first_sink)?;

    let mut second_sink = MemorySink::default();
    let second = traversal.run(&mut fixture_site(&loaded, start_url)?, &mut second_sink)?;

    let changed_records = first_sink
        .records
        .iter()
        .zip(&second_sink.records)
        .filter(|(a, b)| a != b)
        .count()
        + first_sink.records.len().abs_diff(second_sink.records.len());

    Ok(HarnessReport {
        first_run_pages: first.pages_visited,
        first_run_emitted: first.emitted,
        first_run_duplicates: first.duplicates,
        second_run_pages: second.pages_visited,
        second_run_emitted: second.emitted,
        changed_records,
        stable: changed_records == 0 && first.outcome == second.outcome,
    })
}
