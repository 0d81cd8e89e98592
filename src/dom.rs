use scraper::{ElementRef, Selector};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use url::Url;

pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid built-in selector {css}: {err:?}"))
}

/// Like `element.select`, but `element` itself comes first when it matches.
pub fn select_inclusive<'a, 'b>(
    element: ElementRef<'a>,
    selector: &'b Selector,
) -> impl Iterator<Item = ElementRef<'a>> {
    std::iter::once(element)
        .filter(move |el| selector.matches(el))
        .chain(element.select(selector))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn fold(text: &str) -> String {
    let stripped = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    collapse_whitespace(&stripped)
}

pub fn is_pseudo_link(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return true;
    }
    let lowered = href.to_ascii_lowercase();
    ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
}

pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    if is_pseudo_link(href) {
        return None;
    }
    base.join(href.trim()).ok()
}

pub fn without_fragment(url: &Url) -> Url {
    let mut copy = url.clone();
    copy.set_fragment(None);
    copy
}

pub fn has_class_containing(element: ElementRef<'_>, needle: &str) -> bool {
    element
        .value()
        .classes()
        .any(|class| class.to_ascii_lowercase().contains(needle))
}

pub fn parent_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.parent().and_then(ElementRef::wrap)
}

pub fn child_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap)
}

pub fn css_path(element: ElementRef<'_>) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);

    while let Some(el) = current {
        if let Some(id) = el.value().id() {
            segments.push(format!("#{id}"));
            break;
        }

        let name = el.value().name();
        let parent = parent_element(el);
        match parent {
            Some(_) => {
                let position = el
                    .prev_siblings()
                    .filter(|node| node.value().is_element())
                    .count()
                    + 1;
                segments.push(format!("{name}:nth-child({position})"));
            }
            None => segments.push(name.to_string()),
        }
        current = parent;
    }

    segments.reverse();
    segments.join(" > ")
}
