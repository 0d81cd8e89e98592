use crate::error::ExtractError;
use crate::extract::RecordExtractor;
use crate::listing::{find_detail_link, find_record_units, listing_title};
use crate::model::{CanonicalRecord, DiagnosticArtifact, TraversalOutcome, TraversalReport};
use crate::navigator::Navigator;
use crate::pagination::{PageAdvance, PageCursor, PaginationController};
use crate::store::RecordSink;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use url::Url;

pub const EMPTY_FIRST_PAGE: &str = "empty-first-page";

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub max_pages: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self { max_pages: 50 }
    }
}

#[derive(Debug, Default)]
pub struct VisitedSet {
    ids: HashSet<String>,
}

impl VisitedSet {
    pub fn contains(&self, source_id: &str) -> bool {
        self.ids.contains(source_id)
    }

    /// Returns `false` when the identifier was already present.
    pub fn insert(&mut self, source_id: &str) -> bool {
        self.ids.insert(source_id.to_string())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

enum UnitPlan {
    Detail {
        url: Url,
        listing_title: Option<String>,
    },
    Listing(CanonicalRecord),
}

pub struct Traversal {
    extractor: RecordExtractor,
    pagination: PaginationController,
    options: TraversalOptions,
    visited: VisitedSet,
}

impl Traversal {
    pub fn new(
        extractor: RecordExtractor,
        pagination: PaginationController,
        options: TraversalOptions,
    ) -> Self {
        Self {
            extractor,
            pagination,
            options,
            visited: VisitedSet::default(),
        }
    }

    pub fn visited(&self) -> &VisitedSet {
        &self.visited
    }

    pub fn extractor(&self) -> &RecordExtractor {
        &self.extractor
    }

    /// Walks the results view from its current page until pagination is
    /// exhausted or the page bound is hit. Each run starts with an empty
    /// visited set. Only a failure to read the starting view is an error.
    pub fn run<N: Navigator, S: RecordSink>(
        &mut self,
        navigator: &mut N,
        sink: &mut S,
    ) -> Result<TraversalReport> {
        if self.options.max_pages == 0 {
            bail!("max_pages must be at least 1");
        }
        self.visited = VisitedSet::default();

        let first = navigator
            .snapshot()
            .context("failed to read the starting results view")?;
        let mut cursor = PageCursor::capture(first, 1);
        let mut report = TraversalReport::default();

        info!(url = %cursor.url(), max_pages = self.options.max_pages, "traversal start");

        loop {
            let page = cursor.page_number();

            let plans = self.plan_page(&cursor);
            if plans.is_empty() {
                if page == 1 {
                    warn!(
                        url = %cursor.url(),
                        "first page shows no record units; filters or selectors likely failed"
                    );
                    sink.diagnostic(&DiagnosticArtifact {
                        name: EMPTY_FIRST_PAGE.to_string(),
                        url: cursor.url().to_string(),
                        page_number: page,
                        digest: cursor.digest().to_string(),
                        captured_at: Utc::now(),
                        markup: cursor.markup().to_string(),
                    })?;
                    report.outcome = TraversalOutcome::EmptyFirstPage;
                } else {
                    info!(page, "page shows no record units; end of results");
                    report.outcome = TraversalOutcome::Exhausted;
                }
                break;
            }

            info!(page, units = plans.len(), url = %cursor.url(), "processing page");
            report.pages_visited += 1;
            report.record_units += plans.len();
            for plan in plans {
                self.process_unit(plan, navigator, sink, &mut report)?;
            }

            if page >= self.options.max_pages {
                if self.pagination.has_next(&cursor) {
                    warn!(
                        max_pages = self.options.max_pages,
                        "page bound reached before the last page"
                    );
                    report.outcome = TraversalOutcome::SafetyBoundReached;
                } else {
                    report.outcome = TraversalOutcome::Exhausted;
                }
                break;
            }

            match self.pagination.advance(navigator, &cursor) {
                Ok(PageAdvance::HasMore(next)) => cursor = next,
                Ok(PageAdvance::Exhausted) => {
                    info!(page, "no further pages");
                    report.outcome = TraversalOutcome::Exhausted;
                    break;
                }
                Err(err) => {
                    warn!(page, error = %err, "could not read the next page; stopping");
                    report.outcome = TraversalOutcome::AdvanceFailed;
                    break;
                }
            }
        }

        info!(
            pages = report.pages_visited,
            emitted = report.emitted,
            duplicates = report.duplicates,
            failed = report.failed,
            outcome = ?report.outcome,
            "traversal complete"
        );
        Ok(report)
    }

    fn plan_page(&self, cursor: &PageCursor) -> Vec<UnitPlan> {
        let page = cursor.page_number();
        find_record_units(cursor.document())
            .into_iter()
            .enumerate()
            .map(|(index, unit)| match find_detail_link(unit, cursor.url()) {
                Some(url) => UnitPlan::Detail {
                    url,
                    listing_title: listing_title(unit),
                },
                None => {
                    let source_id = format!("{}#page-{page}-record-{}", cursor.url(), index + 1);
                    UnitPlan::Listing(self.extractor.from_listing_unit(
                        unit,
                        cursor.url(),
                        source_id,
                    ))
                }
            })
            .collect()
    }

    fn process_unit<N: Navigator, S: RecordSink>(
        &mut self,
        plan: UnitPlan,
        navigator: &mut N,
        sink: &mut S,
        report: &mut TraversalReport,
    ) -> Result<()> {
        let record = match plan {
            UnitPlan::Listing(record) => {
                if self.visited.contains(&record.source_id) {
                    report.duplicates += 1;
                    return Ok(());
                }
                record
            }
            UnitPlan::Detail { url, listing_title } => {
                if self.visited.contains(url.as_str()) {
                    debug!(source_id = %url, "already emitted; skipping");
                    report.duplicates += 1;
                    return Ok(());
                }
                match self.open_detail(navigator, &url, listing_title) {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(source_id = %url, error = %err, "record skipped");
                        report.failed += 1;
                        return Ok(());
                    }
                }
            }
        };

        // Opening the detail may have redirected the identifier; check again.
        if !self.visited.insert(&record.source_id) {
            report.duplicates += 1;
            return Ok(());
        }
        sink.emit(&record)?;
        report.emitted += 1;
        Ok(())
    }

    fn open_detail<N: Navigator>(
        &self,
        navigator: &mut N,
        url: &Url,
        listing_title: Option<String>,
    ) -> Result<CanonicalRecord, ExtractError> {
        let snapshot = navigator
            .open_document(url)
            .map_err(|source| ExtractError::Unreachable {
                url: url.to_string(),
                source,
            })?;
        self.extractor.from_detail(&snapshot, listing_title)
    }
}
