use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    CaseNumber,
    Title,
    ContractSubject,
    FirstPublicationDate,
    LastPublicationDate,
    ContractType,
    Procedure,
    ProcessingState,
    ProcessingKind,
    SubmissionWindow,
    SubmissionDeadline,
    BudgetExclTax,
    EstimatedValue,
    ClassificationCode,
    ExecutionPlace,
    ContractingAuthority,
    SponsoringEntity,
    SubmissionMethod,
    ElectronicSubmissionUrl,
    TenderDocumentsUrl,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 20] = [
        CanonicalField::CaseNumber,
        CanonicalField::Title,
        CanonicalField::ContractSubject,
        CanonicalField::FirstPublicationDate,
        CanonicalField::LastPublicationDate,
        CanonicalField::ContractType,
        CanonicalField::Procedure,
        CanonicalField::ProcessingState,
        CanonicalField::ProcessingKind,
        CanonicalField::SubmissionWindow,
        CanonicalField::SubmissionDeadline,
        CanonicalField::BudgetExclTax,
        CanonicalField::EstimatedValue,
        CanonicalField::ClassificationCode,
        CanonicalField::ExecutionPlace,
        CanonicalField::ContractingAuthority,
        CanonicalField::SponsoringEntity,
        CanonicalField::SubmissionMethod,
        CanonicalField::ElectronicSubmissionUrl,
        CanonicalField::TenderDocumentsUrl,
    ];

    pub fn kind(self) -> FieldKind {
        match self {
            CanonicalField::FirstPublicationDate
            | CanonicalField::LastPublicationDate
            | CanonicalField::SubmissionDeadline => FieldKind::Date,
            CanonicalField::BudgetExclTax | CanonicalField::EstimatedValue => FieldKind::Amount,
            CanonicalField::ClassificationCode => FieldKind::Code,
            CanonicalField::ElectronicSubmissionUrl | CanonicalField::TenderDocumentsUrl => {
                FieldKind::Url
            }
            _ => FieldKind::Text,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            CanonicalField::CaseNumber => "caseNumber",
            CanonicalField::Title => "title",
            CanonicalField::ContractSubject => "contractSubject",
            CanonicalField::FirstPublicationDate => "firstPublicationDate",
            CanonicalField::LastPublicationDate => "lastPublicationDate",
            CanonicalField::ContractType => "contractType",
            CanonicalField::Procedure => "procedure",
            CanonicalField::ProcessingState => "processingState",
            CanonicalField::ProcessingKind => "processingKind",
            CanonicalField::SubmissionWindow => "submissionWindow",
            CanonicalField::SubmissionDeadline => "submissionDeadline",
            CanonicalField::BudgetExclTax => "budgetExclTax",
            CanonicalField::EstimatedValue => "estimatedValue",
            CanonicalField::ClassificationCode => "classificationCode",
            CanonicalField::ExecutionPlace => "executionPlace",
            CanonicalField::ContractingAuthority => "contractingAuthority",
            CanonicalField::SponsoringEntity => "sponsoringEntity",
            CanonicalField::SubmissionMethod => "submissionMethod",
            CanonicalField::ElectronicSubmissionUrl => "electronicSubmissionUrl",
            CanonicalField::TenderDocumentsUrl => "tenderDocumentsUrl",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Date,
    Amount,
    Code,
    Url,
}

/// Built once through [`FromIterator`]; there is no way to change a value
/// afterwards. Empty strings are dropped on construction, so a present key
/// always carries text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RawFields {
    values: BTreeMap<CanonicalField, String>,
}

impl RawFields {
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(CanonicalField, String)> for RawFields {
    fn from_iter<T: IntoIterator<Item = (CanonicalField, String)>>(iter: T) -> Self {
        let mut values = BTreeMap::new();
        for (field, value) in iter {
            let value = value.trim().to_string();
            if !value.is_empty() {
                values.entry(field).or_insert(value);
            }
        }
        Self { values }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    pub text: String,
    pub minor_units: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Amount(Amount),
    Code(String),
    Url(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(v) | FieldValue::Code(v) | FieldValue::Url(v) => Some(v),
            FieldValue::Amount(amount) => Some(&amount.text),
            FieldValue::Date(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    Detail,
    Listing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReviewFlag {
    ContractTypeMismatch,
    MissingDeadline,
    MissingTenderDocuments,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    pub source_id: String,
    pub origin: RecordOrigin,
    pub title: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<CanonicalField, FieldValue>,
    #[serde(default)]
    pub tender_documents: Vec<DocumentLink>,
    #[serde(default)]
    pub review: Vec<ReviewFlag>,
    pub eligible: bool,
}

impl CanonicalRecord {
    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticArtifact {
    pub name: String,
    pub url: String,
    pub page_number: usize,
    pub digest: String,
    pub captured_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub markup: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TraversalOutcome {
    #[default]
    Exhausted,
    SafetyBoundReached,
    EmptyFirstPage,
    AdvanceFailed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TraversalReport {
    /// Pages that showed at least one record unit.
    pub pages_visited: usize,
    pub record_units: usize,
    pub emitted: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub outcome: TraversalOutcome,
}
