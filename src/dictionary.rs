use crate::config::LabelsConfig;
use crate::dom::fold;
use crate::model::{CanonicalField, FieldKind};
use anyhow::{Context, Result, bail};
use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

pub const BUILTIN_VERSION: &str = "2024.1";

const REGEX_PREFIX: &str = "re:";

/// Plain text matches as a case- and diacritic-insensitive substring; a
/// `re:` prefix compiles the rest as a case-insensitive regular expression,
/// tried against both the visible and the folded label text.
#[derive(Debug, Clone)]
pub enum LabelPattern {
    Text { source: String, folded: String },
    Regex(Regex),
}

impl LabelPattern {
    pub fn parse(text: &str) -> Result<Self> {
        if let Some(pattern) = text.strip_prefix(REGEX_PREFIX) {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid label regex {pattern}"))?;
            return Ok(LabelPattern::Regex(regex));
        }

        let folded = fold(text);
        if folded.is_empty() {
            bail!("label pattern must not be empty");
        }
        Ok(LabelPattern::Text {
            source: text.to_string(),
            folded,
        })
    }

    pub fn matches(&self, label: &str) -> bool {
        match self {
            LabelPattern::Text { folded, .. } => fold(label).contains(folded.as_str()),
            LabelPattern::Regex(regex) => regex.is_match(label) || regex.is_match(&fold(label)),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            LabelPattern::Text { source, .. } => source.clone(),
            LabelPattern::Regex(regex) => format!("{REGEX_PREFIX}{}", regex.as_str()),
        }
    }
}

impl Serialize for LabelPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_text())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldLabels {
    pub kind: FieldKind,
    pub patterns: Vec<LabelPattern>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub link_keywords: Vec<String>,
}

/// Canonical field to ordered label synonyms. First matching synonym wins,
/// so more specific labels are listed before generic ones.
#[derive(Debug, Clone, Serialize)]
pub struct LabelDictionary {
    pub version: String,
    fields: BTreeMap<CanonicalField, FieldLabels>,
}

impl LabelDictionary {
    pub fn builtin() -> Self {
        let mut fields = BTreeMap::new();
        for field in CanonicalField::ALL {
            let patterns = builtin_synonyms(field)
                .iter()
                .filter_map(|text| LabelPattern::parse(text).ok())
                .collect();
            let link_keywords = builtin_link_keywords(field)
                .iter()
                .map(|k| k.to_string())
                .collect();
            fields.insert(
                field,
                FieldLabels {
                    kind: field.kind(),
                    patterns,
                    link_keywords,
                },
            );
        }

        Self {
            version: BUILTIN_VERSION.to_string(),
            fields,
        }
    }

    pub fn with_overrides(mut self, config: &LabelsConfig) -> Result<Self> {
        for (field, labels) in &config.synonyms {
            if labels.is_empty() {
                bail!("labels.synonyms.{} must list at least one label", field.key());
            }
            let patterns = labels
                .iter()
                .map(|text| LabelPattern::parse(text))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("invalid synonyms for {}", field.key()))?;
            if let Some(entry) = self.fields.get_mut(field) {
                entry.patterns = patterns;
            }
        }

        for (field, keywords) in &config.link_keywords {
            if field.kind() != FieldKind::Url {
                bail!(
                    "labels.link_keywords.{} is not a link field",
                    field.key()
                );
            }
            if let Some(entry) = self.fields.get_mut(field) {
                entry.link_keywords = keywords.clone();
            }
        }

        if let Some(version) = &config.version {
            self.version = version.clone();
        }
        Ok(self)
    }

    pub fn get(&self, field: CanonicalField) -> Option<&FieldLabels> {
        self.fields.get(&field)
    }

    pub fn patterns(&self, field: CanonicalField) -> &[LabelPattern] {
        self.fields
            .get(&field)
            .map(|entry| entry.patterns.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &FieldLabels)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

impl Default for LabelDictionary {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_synonyms(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::CaseNumber => &[
            "Número de expediente",
            "Nº de expediente",
            "Expediente",
            "Espediente zenbakia",
            "Espedientea",
        ],
        CanonicalField::Title => &["Título del contrato", "Título", "Denominación", "Izenburua"],
        CanonicalField::ContractSubject => &[
            "Objeto del contrato",
            "Objeto",
            "Kontratuaren xedea",
        ],
        CanonicalField::FirstPublicationDate => &[
            "Fecha de primera publicación",
            "Primera publicación",
            "Fecha de publicación",
            "Lehen argitalpen data",
        ],
        CanonicalField::LastPublicationDate => &[
            "Fecha de última publicación",
            "Última publicación",
            "Fecha de la última modificación",
            "Azken argitalpen data",
        ],
        CanonicalField::ContractType => &["Tipo de contrato", "Kontratu mota"],
        CanonicalField::Procedure => &[
            "Procedimiento de adjudicación",
            "Procedimiento",
            "Prozedura",
        ],
        CanonicalField::ProcessingState => &[
            "Estado de la tramitación",
            "Estado",
            "Egoera",
        ],
        CanonicalField::ProcessingKind => &[
            r"re:^tramitaci[oó]n\b",
            "Tipo de tramitación",
            "Izapidetza",
        ],
        CanonicalField::SubmissionWindow => &[
            r"re:^plazo de presentaci[oó]n",
            "Aurkezteko epea",
        ],
        CanonicalField::SubmissionDeadline => &[
            r"re:fecha\s+l[ií]mite.*presentaci[oó]n",
            "Fin del plazo de presentación",
            "Fecha límite",
            "Aurkezteko azken eguna",
        ],
        CanonicalField::BudgetExclTax => &[
            "Presupuesto base de licitación sin impuestos",
            "Presupuesto del contrato sin IVA",
            "Importe sin IVA",
            "Sin IVA",
            "BEZik gabe",
        ],
        CanonicalField::EstimatedValue => &[
            "Valor estimado del contrato",
            "Valor estimado",
            "Balio estimatua",
        ],
        CanonicalField::ClassificationCode => &["Código CPV", "CPV"],
        CanonicalField::ExecutionPlace => &[
            "Lugar de ejecución",
            "Gauzatze lekua",
        ],
        CanonicalField::ContractingAuthority => &[
            "Órgano de contratación",
            "Poder adjudicador",
            "Kontratazio-organoa",
        ],
        CanonicalField::SponsoringEntity => &[
            "Entidad impulsora",
            "Entidad promotora",
            "Erakunde sustatzailea",
        ],
        CanonicalField::SubmissionMethod => &[
            r"re:^m[eé]todo de presentaci[oó]n",
            "Forma de presentación",
            "Aurkezteko modua",
        ],
        CanonicalField::ElectronicSubmissionUrl => &[
            "Dirección de presentación electrónica",
            "Presentación electrónica",
            "Licitación electrónica",
        ],
        CanonicalField::TenderDocumentsUrl => &[
            "Pliego de cláusulas administrativas",
            "Pliegos",
            "Pliego",
            "Baldintza-agiriak",
        ],
    }
}

fn builtin_link_keywords(field: CanonicalField) -> &'static [&'static str] {
    match field {
        CanonicalField::ElectronicSubmissionUrl => &[
            "licitación electrónica",
            "presentación electrónica",
            "licitacion-electronica",
        ],
        CanonicalField::TenderDocumentsUrl => &["pliego", "pcap", "ppt", "condiciones"],
        _ => &[],
    }
}
