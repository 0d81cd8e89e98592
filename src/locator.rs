use crate::dictionary::LabelPattern;
use crate::dom::{
    child_elements, element_text, has_class_containing, resolve_link, select_inclusive, selector,
};
use crate::model::DocumentLink;
use scraper::{ElementRef, Selector};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static ROWS: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
static TERMS: LazyLock<Selector> = LazyLock::new(|| selector("dt"));
static BLOCKS: LazyLock<Selector> = LazyLock::new(|| selector("p, li, div"));
static LINKS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

const EMPHASIS_TAGS: [&str; 4] = ["strong", "b", "em", "label"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Idiom {
    /// `<tr><th>Label</th><td>Value</td></tr>`
    PairedCell,
    /// `<dt>Label</dt><dd>Value</dd>`
    DefinitionPair,
    /// `<p><strong>Label:</strong> Value</p>`
    InlinePrefix,
}

impl Idiom {
    pub const ALL: [Idiom; 3] = [Idiom::PairedCell, Idiom::DefinitionPair, Idiom::InlinePrefix];

    fn sites<'a>(self, root: ElementRef<'a>, pattern: &LabelPattern) -> Vec<Site<'a>> {
        match self {
            Idiom::PairedCell => paired_cell_sites(root, pattern),
            Idiom::DefinitionPair => definition_pair_sites(root, pattern),
            Idiom::InlinePrefix => inline_prefix_sites(root, pattern),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Site<'a> {
    pub idiom: Idiom,
    pub label: ElementRef<'a>,
    pub value: ElementRef<'a>,
    pub text: String,
}

pub fn locate_value(root: ElementRef<'_>, pattern: &LabelPattern) -> Option<String> {
    search(root, pattern, |site| {
        (!site.text.is_empty()).then(|| site.text.clone())
    })
}

pub fn locate_link_value(
    root: ElementRef<'_>,
    pattern: &LabelPattern,
    document_url: &Url,
) -> Option<String> {
    search(root, pattern, |site| {
        first_link(site.value, document_url).or_else(|| first_link(site.label, document_url))
    })
}

/// All links inside the first value of `pattern` that holds any, with their
/// text. Agrees with [`locate_link_value`] on the first entry.
pub fn locate_links(
    root: ElementRef<'_>,
    pattern: &LabelPattern,
    document_url: &Url,
) -> Vec<DocumentLink> {
    search(root, pattern, |site| {
        let links = links_in(site.value, document_url);
        let links = if links.is_empty() {
            links_in(site.label, document_url)
        } else {
            links
        };
        (!links.is_empty()).then_some(links)
    })
    .unwrap_or_default()
}

fn search<T>(
    root: ElementRef<'_>,
    pattern: &LabelPattern,
    pick: impl Fn(&Site<'_>) -> Option<T>,
) -> Option<T> {
    for idiom in Idiom::ALL {
        for site in idiom.sites(root, pattern) {
            if let Some(found) = pick(&site) {
                debug!(idiom = ?site.idiom, label = %pattern.as_text(), "label located");
                return Some(found);
            }
        }
    }
    None
}

fn first_link(element: ElementRef<'_>, document_url: &Url) -> Option<String> {
    links_in(element, document_url)
        .into_iter()
        .next()
        .map(|link| link.url)
}

fn links_in(element: ElementRef<'_>, document_url: &Url) -> Vec<DocumentLink> {
    select_inclusive(element, &LINKS)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let url = resolve_link(document_url, href)?;
            Some(DocumentLink {
                text: element_text(anchor),
                url: url.to_string(),
            })
        })
        .collect()
}

fn paired_cell_sites<'a>(root: ElementRef<'a>, pattern: &LabelPattern) -> Vec<Site<'a>> {
    let mut sites = Vec::new();
    for row in select_inclusive(root, &ROWS) {
        let cells = child_elements(row)
            .filter(|c| matches!(c.value().name(), "th" | "td"))
            .collect::<Vec<_>>();

        let Some(label) = cells
            .iter()
            .find(|c| c.value().name() == "th")
            .or_else(|| cells.first())
            .copied()
        else {
            continue;
        };
        let Some(value) = cells
            .iter()
            .rev()
            .find(|c| c.value().name() == "td")
            .copied()
        else {
            continue;
        };
        if value == label {
            continue;
        }
        if !pattern.matches(&element_text(label)) {
            continue;
        }

        sites.push(Site {
            idiom: Idiom::PairedCell,
            label,
            value,
            text: element_text(value),
        });
    }
    sites
}

fn definition_pair_sites<'a>(root: ElementRef<'a>, pattern: &LabelPattern) -> Vec<Site<'a>> {
    let mut sites = Vec::new();
    for term in select_inclusive(root, &TERMS) {
        if !pattern.matches(&element_text(term)) {
            continue;
        }
        let Some(definition) = term.next_siblings().find_map(ElementRef::wrap) else {
            continue;
        };
        if definition.value().name() != "dd" {
            continue;
        }
        sites.push(Site {
            idiom: Idiom::DefinitionPair,
            label: term,
            value: definition,
            text: element_text(definition),
        });
    }
    sites
}

fn inline_prefix_sites<'a>(root: ElementRef<'a>, pattern: &LabelPattern) -> Vec<Site<'a>> {
    let mut sites = Vec::new();
    for block in select_inclusive(root, &BLOCKS) {
        let Some(lead) = emphasized_lead(block) else {
            continue;
        };
        let label_text = element_text(lead);
        if label_text.is_empty() || !pattern.matches(&label_text) {
            continue;
        }
        let block_text = element_text(block);
        sites.push(Site {
            idiom: Idiom::InlinePrefix,
            label: lead,
            value: block,
            text: strip_label_prefix(&block_text, &label_text),
        });
    }
    sites
}

/// The block's first child element when it is an emphasized label span and
/// no text precedes it.
fn emphasized_lead(block: ElementRef<'_>) -> Option<ElementRef<'_>> {
    for node in block.children() {
        if let Some(text) = node.value().as_text() {
            if text.trim().is_empty() {
                continue;
            }
            return None;
        }
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let name = element.value().name();
        let emphasized = EMPHASIS_TAGS.contains(&name)
            || (name == "span"
                && (has_class_containing(element, "label")
                    || has_class_containing(element, "etiqueta")));
        return emphasized.then_some(element);
    }
    None
}

fn strip_label_prefix(block_text: &str, label_text: &str) -> String {
    let rest = match block_text.find(label_text) {
        Some(pos) => &block_text[pos + label_text.len()..],
        None => block_text,
    };
    rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—'))
        .trim()
        .to_string()
}
