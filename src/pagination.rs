use crate::config::{LocaleConfig, default_next_labels};
use crate::dom::{
    css_path, element_text, fold, has_class_containing, parent_element, resolve_link, selector,
};
use crate::error::NavigationError;
use crate::listing::find_record_units;
use crate::navigator::{Navigator, PageSnapshot};
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

static REL_NEXT: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[rel~="next"], link[rel~="next"]"#));
static ARIA_LABELLED: LazyLock<Selector> = LazyLock::new(|| selector("a[aria-label], button[aria-label]"));
static PAGER_NEXT: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        ".next, .pagination-next, .ui-paginator-next, .paginacion-siguiente, .siguiente, td.next",
    )
});
static PAGER_TARGET: LazyLock<Selector> = LazyLock::new(|| selector("a, button"));
static TEXT_CONTROLS: LazyLock<Selector> = LazyLock::new(|| {
    selector(r#"a, button, input[type="submit"], input[type="button"]"#)
});
static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a"));

const ARROWS: [char; 6] = ['>', '»', '›', '<', '«', '‹'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextConvention {
    RelNext,
    AriaLabel,
    TablePager,
    LocaleText,
    PageNumber,
}

impl NextConvention {
    pub const ALL: [NextConvention; 5] = [
        NextConvention::RelNext,
        NextConvention::AriaLabel,
        NextConvention::TablePager,
        NextConvention::LocaleText,
        NextConvention::PageNumber,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub convention: NextConvention,
    pub href: Option<Url>,
    pub label: String,
    pub css_path: String,
}

/// The current results view. Replaced wholesale after every page advance.
pub struct PageCursor {
    url: Url,
    markup: String,
    document: Html,
    page_number: usize,
    unit_count: usize,
    digest: String,
}

impl PageCursor {
    pub fn capture(snapshot: PageSnapshot, page_number: usize) -> Self {
        let document = Html::parse_document(&snapshot.markup);
        let unit_count = find_record_units(&document).len();
        let digest = view_digest(&snapshot.url, &snapshot.markup);
        Self {
            url: snapshot.url,
            markup: snapshot.markup,
            document,
            page_number,
            unit_count,
            digest,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn unit_count(&self) -> usize {
        self.unit_count
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

pub enum PageAdvance {
    HasMore(PageCursor),
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct PaginationController {
    next_labels: Vec<String>,
}

impl Default for PaginationController {
    fn default() -> Self {
        Self::new(&default_next_labels())
    }
}

impl PaginationController {
    pub fn new(next_labels: &[String]) -> Self {
        Self {
            next_labels: next_labels
                .iter()
                .map(|l| fold(l))
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }

    pub fn from_locale(locale: &LocaleConfig) -> Self {
        Self::new(&locale.next_labels)
    }

    /// The first enabled control of each convention, in priority order.
    /// ARIA, text and page-number matches inside a record unit are ignored.
    pub fn candidates(&self, cursor: &PageCursor) -> Vec<Control> {
        let root = cursor.document().root_element();
        let units = find_record_units(cursor.document());
        NextConvention::ALL
            .iter()
            .filter_map(|convention| self.locate(*convention, root, &units, cursor))
            .collect()
    }

    pub fn has_next(&self, cursor: &PageCursor) -> bool {
        !self.candidates(cursor).is_empty()
    }

    /// Activates the first usable next control and captures the view it
    /// leads to. Never re-applies filters or re-issues the search.
    pub fn advance<N: Navigator>(
        &self,
        navigator: &mut N,
        cursor: &PageCursor,
    ) -> Result<PageAdvance, NavigationError> {
        for control in self.candidates(cursor) {
            if let Err(err) = navigator.activate(&control) {
                warn!(
                    page = cursor.page_number(),
                    convention = ?control.convention,
                    control = %control.css_path,
                    error = %err,
                    "next control could not be activated; trying next convention"
                );
                continue;
            }
            navigator.wait_until_settled()?;

            let next = PageCursor::capture(navigator.snapshot()?, cursor.page_number() + 1);
            if next.digest() == cursor.digest() {
                warn!(
                    page = cursor.page_number(),
                    convention = ?control.convention,
                    "next control left the view unchanged; treating as last page"
                );
                return Ok(PageAdvance::Exhausted);
            }

            info!(
                page = next.page_number(),
                convention = ?control.convention,
                url = %next.url(),
                units = next.unit_count(),
                "advanced to next page"
            );
            return Ok(PageAdvance::HasMore(next));
        }

        debug!(page = cursor.page_number(), "no enabled next control");
        Ok(PageAdvance::Exhausted)
    }

    fn locate(
        &self,
        convention: NextConvention,
        root: ElementRef<'_>,
        units: &[ElementRef<'_>],
        cursor: &PageCursor,
    ) -> Option<Control> {
        let found = match convention {
            NextConvention::RelNext => root
                .select(&REL_NEXT)
                .find(|el| !is_disabled(*el, None)),
            NextConvention::AriaLabel => root.select(&ARIA_LABELLED).find(|el| {
                el.value()
                    .attr("aria-label")
                    .is_some_and(|label| self.describes_next(label))
                    && !is_disabled(*el, None)
                    && !inside_any(*el, units)
            }),
            NextConvention::TablePager => root.select(&PAGER_NEXT).find_map(|wrapper| {
                let target = if matches!(wrapper.value().name(), "a" | "button") {
                    wrapper
                } else {
                    wrapper.select(&PAGER_TARGET).next()?
                };
                (!is_disabled(target, Some(wrapper))).then_some(target)
            }),
            NextConvention::LocaleText => root.select(&TEXT_CONTROLS).find(|el| {
                let text = match el.value().name() {
                    "input" => el.value().attr("value").unwrap_or_default().to_string(),
                    _ => element_text(*el),
                };
                self.is_next_label(&text) && !is_disabled(*el, None) && !inside_any(*el, units)
            }),
            NextConvention::PageNumber => {
                let wanted = (cursor.page_number() + 1).to_string();
                root.select(&ANCHORS).find(|el| {
                    element_text(*el) == wanted
                        && !is_disabled(*el, None)
                        && !inside_any(*el, units)
                })
            }
        }?;

        Some(control_for(convention, found, cursor.url()))
    }

    /// Visible text must be exactly a next word, arrows aside. "Next
    /// Generation EU" is a title, not a control.
    fn is_next_label(&self, text: &str) -> bool {
        let folded = fold(text);
        if folded.is_empty() {
            return false;
        }
        let core = folded.trim_matches(|c: char| c.is_whitespace() || ARROWS.contains(&c));
        self.next_labels
            .iter()
            .any(|label| folded == *label || core == label.as_str())
    }

    /// Accessible names may add a noun: "Página siguiente", "Next page".
    fn describes_next(&self, label: &str) -> bool {
        if self.is_next_label(label) {
            return true;
        }
        let folded = fold(label);
        let words = folded.split_whitespace().collect::<Vec<_>>();
        words.len() == 2
            && self
                .next_labels
                .iter()
                .any(|label| words.contains(&label.as_str()))
    }
}

fn control_for(convention: NextConvention, element: ElementRef<'_>, page_url: &Url) -> Control {
    let href = element
        .value()
        .attr("href")
        .and_then(|href| resolve_link(page_url, href));
    let label = match element.value().attr("aria-label") {
        Some(label) => label.trim().to_string(),
        None => element_text(element),
    };
    Control {
        convention,
        href,
        label,
        css_path: css_path(element),
    }
}

fn is_disabled(element: ElementRef<'_>, wrapper: Option<ElementRef<'_>>) -> bool {
    let own = element.value().attr("disabled").is_some()
        || element
            .value()
            .attr("aria-disabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    own || has_disabled_class(element)
        || parent_element(element).is_some_and(has_disabled_class)
        || wrapper.is_some_and(has_disabled_class)
}

fn inside_any(element: ElementRef<'_>, units: &[ElementRef<'_>]) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| units.iter().any(|unit| unit.id() == el.id()))
}

fn has_disabled_class(element: ElementRef<'_>) -> bool {
    has_class_containing(element, "disabled")
}

fn view_digest(url: &Url, markup: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hasher.update(markup.as_bytes());
    hex::encode(hasher.finalize())[..24].to_string()
}
