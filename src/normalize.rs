//! Pure conversions from located text to typed values. Nothing here fails:
//! unusable input yields `None`.

use crate::dom::{element_text, fold, resolve_link, selector};
use crate::model::DocumentLink;
use regex::Regex;
use scraper::{ElementRef, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{2}/\d{2}/\d{4}\b").expect("date token regex must be valid"));

static AMOUNT_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d{1,3}(?:\.\d{3})+|\d+),\d{2}\b").expect("amount token regex must be valid")
});

static DIGIT_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+").expect("digit run regex must be valid"));

static ANCHORS: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));

const CLASSIFICATION_CODE_LEN: usize = 8;

pub fn first_date(text: &str) -> Option<String> {
    DATE_TOKEN.find(text).map(|m| m.as_str().to_string())
}

pub fn first_amount(text: &str) -> Option<String> {
    AMOUNT_TOKEN.find(text).map(|m| m.as_str().to_string())
}

pub fn parse_amount_minor(token: &str) -> Option<i64> {
    let (units, cents) = token.trim().split_once(',')?;
    if cents.len() != 2 {
        return None;
    }
    let units = units.replace('.', "").parse::<i64>().ok()?;
    let cents = cents.parse::<i64>().ok()?;
    units.checked_mul(100)?.checked_add(cents)
}

pub fn first_classification_code(text: &str) -> Option<String> {
    DIGIT_RUN
        .find_iter(text)
        .find(|m| m.as_str().len() == CLASSIFICATION_CODE_LEN)
        .map(|m| m.as_str().to_string())
}

pub fn first_matching_link(
    root: ElementRef<'_>,
    document_url: &Url,
    keywords: &[String],
) -> Option<String> {
    matching_links(root, document_url, keywords)
        .into_iter()
        .next()
        .map(|link| link.url)
}

pub fn matching_links(
    root: ElementRef<'_>,
    document_url: &Url,
    keywords: &[String],
) -> Vec<DocumentLink> {
    let keywords = keywords
        .iter()
        .map(|k| fold(k))
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>();
    if keywords.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    root.select(&ANCHORS)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let text = element_text(anchor);
            let folded_text = fold(&text);
            let folded_href = fold(href);
            let hit = keywords
                .iter()
                .any(|k| folded_text.contains(k.as_str()) || folded_href.contains(k.as_str()));
            if !hit {
                return None;
            }
            let url = resolve_link(document_url, href)?.to_string();
            seen.insert(url.clone()).then_some(DocumentLink { text, url })
        })
        .collect()
}
