use crate::config::ReviewConfig;
use crate::dictionary::{FieldLabels, LabelDictionary};
use crate::dom::{element_text, fold, selector, without_fragment};
use crate::error::ExtractError;
use crate::listing::listing_title;
use crate::locator::{locate_link_value, locate_links, locate_value};
use crate::model::{
    Amount, CanonicalField, CanonicalRecord, DocumentLink, FieldKind, FieldValue, RawFields,
    RecordOrigin, ReviewFlag,
};
use crate::navigator::PageSnapshot;
use crate::normalize::{
    first_amount, first_classification_code, first_date, first_matching_link, matching_links,
    parse_amount_minor,
};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;
use url::Url;

static HEADINGS: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2"));

const DATE_FORMAT: &str = "%d/%m/%Y";

pub fn extract_fields(
    root: ElementRef<'_>,
    document_url: &Url,
    dictionary: &LabelDictionary,
) -> RawFields {
    dictionary
        .iter()
        .filter_map(|(field, labels)| {
            let value = locate_field(root, document_url, labels)?;
            debug!(field = field.key(), value = %value, "field located");
            Some((field, value))
        })
        .collect()
}

fn locate_field(root: ElementRef<'_>, document_url: &Url, labels: &FieldLabels) -> Option<String> {
    if labels.kind == FieldKind::Url {
        return labels
            .patterns
            .iter()
            .find_map(|pattern| locate_link_value(root, pattern, document_url))
            .or_else(|| first_matching_link(root, document_url, &labels.link_keywords));
    }

    labels
        .patterns
        .iter()
        .find_map(|pattern| locate_value(root, pattern))
}

/// Every tender document the page links to: the labelled links first, then
/// anchors naming a document keyword. Each address appears once, and the
/// first entry is the tender documents field whenever that field is found.
pub fn tender_documents(
    root: ElementRef<'_>,
    document_url: &Url,
    dictionary: &LabelDictionary,
) -> Vec<DocumentLink> {
    let Some(labels) = dictionary.get(CanonicalField::TenderDocumentsUrl) else {
        return Vec::new();
    };
    let labelled = labels
        .patterns
        .iter()
        .map(|pattern| locate_links(root, pattern, document_url))
        .find(|links| !links.is_empty())
        .unwrap_or_default();

    let mut seen = HashSet::new();
    labelled
        .into_iter()
        .chain(matching_links(root, document_url, &labels.link_keywords))
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct ReviewPolicy {
    pub expected_contract_type: Option<String>,
}

impl From<&ReviewConfig> for ReviewPolicy {
    fn from(config: &ReviewConfig) -> Self {
        Self {
            expected_contract_type: config
                .expected_contract_type
                .clone()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

impl ReviewPolicy {
    pub fn flags(
        &self,
        fields: &BTreeMap<CanonicalField, FieldValue>,
        tender_documents: &[DocumentLink],
    ) -> Vec<ReviewFlag> {
        let mut flags = Vec::new();

        if let Some(expected) = &self.expected_contract_type {
            let matches = fields
                .get(&CanonicalField::ContractType)
                .and_then(FieldValue::as_text)
                .is_some_and(|actual| fold(actual).contains(&fold(expected)));
            if !matches {
                flags.push(ReviewFlag::ContractTypeMismatch);
            }
        }
        if !fields.contains_key(&CanonicalField::SubmissionDeadline) {
            flags.push(ReviewFlag::MissingDeadline);
        }
        if tender_documents.is_empty() {
            flags.push(ReviewFlag::MissingTenderDocuments);
        }
        flags
    }
}

#[derive(Debug, Clone)]
pub struct RecordContext {
    pub source_id: String,
    pub origin: RecordOrigin,
    pub heading: Option<String>,
    pub listing_title: Option<String>,
    pub tender_documents: Vec<DocumentLink>,
}

/// Normalizes raw field text into a finished record. Pure: the same input
/// always produces the same record, and nothing is located again.
pub fn build_record(raw: &RawFields, context: RecordContext, policy: &ReviewPolicy) -> CanonicalRecord {
    let fields = raw
        .iter()
        .filter_map(|(field, text)| normalize_value(field.kind(), text).map(|v| (field, v)))
        .collect::<BTreeMap<_, _>>();

    let title = context
        .heading
        .filter(|t| !t.is_empty())
        .or_else(|| raw.get(CanonicalField::Title).map(ToString::to_string))
        .or(context.listing_title.filter(|t| !t.is_empty()));

    let review = policy.flags(&fields, &context.tender_documents);
    let eligible = review.is_empty();

    CanonicalRecord {
        source_id: context.source_id,
        origin: context.origin,
        title,
        fields,
        tender_documents: context.tender_documents,
        review,
        eligible,
    }
}

pub fn normalize_value(kind: FieldKind, text: &str) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => Some(FieldValue::Text(text.to_string())),
        FieldKind::Date => {
            let token = first_date(text)?;
            NaiveDate::parse_from_str(&token, DATE_FORMAT)
                .ok()
                .map(FieldValue::Date)
        }
        FieldKind::Amount => {
            let token = first_amount(text)?;
            let minor_units = parse_amount_minor(&token)?;
            Some(FieldValue::Amount(Amount {
                text: token,
                minor_units,
            }))
        }
        FieldKind::Code => first_classification_code(text).map(FieldValue::Code),
        FieldKind::Url => Url::parse(text).ok().map(|url| FieldValue::Url(url.to_string())),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordExtractor {
    dictionary: LabelDictionary,
    policy: ReviewPolicy,
}

impl RecordExtractor {
    pub fn new(dictionary: LabelDictionary, policy: ReviewPolicy) -> Self {
        Self { dictionary, policy }
    }

    pub fn dictionary(&self) -> &LabelDictionary {
        &self.dictionary
    }

    /// Extracts from a detail document. Links resolve against the
    /// document's own address, never against the listing's.
    pub fn from_detail(
        &self,
        snapshot: &PageSnapshot,
        listing_title: Option<String>,
    ) -> Result<CanonicalRecord, ExtractError> {
        if snapshot.markup.trim().is_empty() {
            return Err(ExtractError::EmptyDocument {
                url: snapshot.url.to_string(),
            });
        }

        let document = Html::parse_document(&snapshot.markup);
        let root = document.root_element();
        if element_text(root).is_empty() {
            return Err(ExtractError::EmptyDocument {
                url: snapshot.url.to_string(),
            });
        }

        let raw = extract_fields(root, &snapshot.url, &self.dictionary);
        let documents = tender_documents(root, &snapshot.url, &self.dictionary);
        let heading = root
            .select(&HEADINGS)
            .map(element_text)
            .find(|text| !text.is_empty());

        Ok(build_record(
            &raw,
            RecordContext {
                source_id: without_fragment(&snapshot.url).to_string(),
                origin: RecordOrigin::Detail,
                heading,
                listing_title,
                tender_documents: documents,
            },
            &self.policy,
        ))
    }

    pub fn from_listing_unit(
        &self,
        unit: ElementRef<'_>,
        listing_url: &Url,
        source_id: String,
    ) -> CanonicalRecord {
        let raw = extract_fields(unit, listing_url, &self.dictionary);
        let documents = tender_documents(unit, listing_url, &self.dictionary);
        build_record(
            &raw,
            RecordContext {
                source_id,
                origin: RecordOrigin::Listing,
                heading: None,
                listing_title: listing_title(unit),
                tender_documents: documents,
            },
            &self.policy,
        )
    }
}
