use crate::dom::{child_elements, element_text, resolve_link, selector, without_fragment};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static TABLE_ROWS: LazyLock<Selector> = LazyLock::new(|| selector("table tr"));
static TAGGED_ITEMS: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[role="list"] > [role="listitem"], ul[class*="result"] > li, ol[class*="result"] > li, article"#,
    )
});
static CLASSED: LazyLock<Selector> = LazyLock::new(|| selector("div[class], li[class], section[class], article[class], tr[class]"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3, h4"));
static PAGER_CELLS: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"td.next, td.prev, td.previous, .ui-paginator-next, .ui-paginator-prev, [rel~="next"], [rel~="prev"]"#,
    )
});

const RESULT_CLASSES: [&str; 11] = [
    "result",
    "result-item",
    "search-result",
    "resultado",
    "resultado-item",
    "card",
    "anuncio",
    "item-anuncio",
    "listado-item",
    "list-item",
    "ficha",
];

const PAGER_CLASS_MARKERS: [&str; 3] = ["pager", "paginat", "paginac"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingGuess {
    TableRows,
    TaggedListItems,
    ResultClassNames,
}

impl ListingGuess {
    pub const ALL: [ListingGuess; 3] = [
        ListingGuess::TableRows,
        ListingGuess::TaggedListItems,
        ListingGuess::ResultClassNames,
    ];

    fn select<'a>(self, root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let found: Vec<ElementRef<'a>> = match self {
            ListingGuess::TableRows => root
                .select(&TABLE_ROWS)
                .filter(|row| !in_table_section(*row, &["thead", "tfoot"]))
                .filter(|row| child_elements(*row).any(|c| c.value().name() == "td"))
                .filter(|row| row.select(&LINKS).next().is_some())
                .filter(|row| !is_pager_row(*row))
                .collect(),
            ListingGuess::TaggedListItems => root.select(&TAGGED_ITEMS).collect(),
            ListingGuess::ResultClassNames => outermost(
                root.select(&CLASSED)
                    .filter(|el| {
                        el.value().classes().any(|class| {
                            RESULT_CLASSES.contains(&class.to_ascii_lowercase().as_str())
                        })
                    })
                    .collect(),
            ),
        };

        found.into_iter().filter(|el| !inside_pager(*el)).collect()
    }
}

/// Record units of a results page: the first guess that matches anything.
/// An empty vector means the page shows no results at all.
pub fn find_record_units(document: &Html) -> Vec<ElementRef<'_>> {
    let root = document.root_element();
    for guess in ListingGuess::ALL {
        let units = guess.select(root);
        if !units.is_empty() {
            debug!(guess = ?guess, units = units.len(), "record units found");
            return units;
        }
    }
    Vec::new()
}

pub fn find_detail_link(unit: ElementRef<'_>, listing_url: &Url) -> Option<Url> {
    let listing = without_fragment(listing_url);
    unit.select(&LINKS).find_map(|anchor| {
        let href = anchor.value().attr("href")?;
        let url = without_fragment(&resolve_link(listing_url, href)?);
        (url != listing).then_some(url)
    })
}

pub fn listing_title(unit: ElementRef<'_>) -> Option<String> {
    unit.select(&LINKS)
        .chain(unit.select(&HEADINGS))
        .map(element_text)
        .find(|text| !text.is_empty())
}

fn in_table_section(row: ElementRef<'_>, sections: &[&str]) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|el| el.value().name() != "table")
        .any(|el| sections.contains(&el.value().name()))
}

fn is_pager_row(row: ElementRef<'_>) -> bool {
    row.select(&PAGER_CELLS).next().is_some()
}

fn inside_pager(element: ElementRef<'_>) -> bool {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|el| {
            el.value().name() == "nav"
                || el.value().attr("role") == Some("navigation")
                || el.value().classes().any(|class| {
                    let class = class.to_ascii_lowercase();
                    PAGER_CLASS_MARKERS.iter().any(|m| class.contains(m))
                })
        })
}

fn outermost(elements: Vec<ElementRef<'_>>) -> Vec<ElementRef<'_>> {
    let ids = elements.iter().map(|el| el.id()).collect::<HashSet<_>>();
    elements
        .iter()
        .filter(|el| !el.ancestors().any(|a| ids.contains(&a.id())))
        .copied()
        .collect()
}
