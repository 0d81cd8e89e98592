use anyhow::Result;
use chrono::NaiveDate;
use rtender::config::{LabelsConfig, ReviewConfig};
use rtender::dictionary::{LabelDictionary, LabelPattern};
use rtender::error::ExtractError;
use rtender::extract::{
    RecordContext, RecordExtractor, ReviewPolicy, build_record, extract_fields, normalize_value,
};
use rtender::locator::locate_value;
use rtender::model::{
    Amount, CanonicalField, DocumentLink, FieldKind, FieldValue, RawFields, RecordOrigin,
    ReviewFlag,
};
use rtender::navigator::PageSnapshot;
use rtender::normalize::{
    first_amount, first_classification_code, first_date, first_matching_link, parse_amount_minor,
};
use scraper::Html;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use url::Url;

const MIXED_IDIOMS: &str = r#"
<html><body>
  <table>
    <tr><th>Número de expediente</th><td>KM-2024-010</td></tr>
    <tr><td>Tipo de contrato</td><td>Obras</td></tr>
    <tr><td colspan="2">Fila sin etiqueta</td></tr>
  </table>
  <dl>
    <dt>Objeto del contrato</dt>
    <dd>Reforma de la plaza mayor</dd>
    <dt>Órgano de contratación</dt>
    <dd>  Ayuntamiento   de Getxo </dd>
  </dl>
  <div class="bloque">
    <p><strong>Procedimiento:</strong> Abierto</p>
    <li><label>Lugar de ejecución</label> – Getxo</li>
    <p>Texto previo <strong>Entidad impulsora:</strong> no es una etiqueta</p>
  </div>
</body></html>
"#;

fn fixture(relative: &str) -> Result<String> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/portal/site")
        .join(relative);
    Ok(fs::read_to_string(path)?)
}

fn snapshot(url: &str, markup: String) -> Result<PageSnapshot> {
    Ok(PageSnapshot {
        url: Url::parse(url)?,
        markup,
    })
}

#[test]
fn locator_reads_each_structural_idiom() -> Result<()> {
    let document = Html::parse_document(MIXED_IDIOMS);
    let root = document.root_element();

    let cases = [
        ("Número de expediente", "KM-2024-010"),
        ("Tipo de contrato", "Obras"),
        ("Objeto del contrato", "Reforma de la plaza mayor"),
        ("organo de contratacion", "Ayuntamiento de Getxo"),
        ("Procedimiento", "Abierto"),
        ("Lugar de ejecución", "Getxo"),
    ];
    for (label, expected) in cases {
        let pattern = LabelPattern::parse(label)?;
        assert_eq!(
            locate_value(root, &pattern).as_deref(),
            Some(expected),
            "label {label}"
        );
    }

    // A label that is not the leading element of its block is not a label.
    let pattern = LabelPattern::parse("Entidad impulsora")?;
    assert_eq!(locate_value(root, &pattern), None);

    Ok(())
}

#[test]
fn locator_is_idempotent() -> Result<()> {
    let document = Html::parse_document(MIXED_IDIOMS);
    let root = document.root_element();
    let pattern = LabelPattern::parse("re:^objeto")?;

    let first = locate_value(root, &pattern);
    let second = locate_value(root, &pattern);
    assert_eq!(first.as_deref(), Some("Reforma de la plaza mayor"));
    assert_eq!(first, second);

    Ok(())
}

#[test]
fn extract_fields_leaves_unmatched_fields_absent() -> Result<()> {
    let document = Html::parse_document(MIXED_IDIOMS);
    let url = Url::parse("https://contratacion.example.eus/anuncios/km-2024-010.html")?;
    let dictionary = LabelDictionary::builtin();

    let raw = extract_fields(document.root_element(), &url, &dictionary);
    assert_eq!(raw.get(CanonicalField::CaseNumber), Some("KM-2024-010"));
    assert_eq!(raw.get(CanonicalField::ContractType), Some("Obras"));
    assert_eq!(raw.get(CanonicalField::Procedure), Some("Abierto"));
    assert_eq!(raw.get(CanonicalField::SubmissionDeadline), None);
    assert_eq!(raw.get(CanonicalField::TenderDocumentsUrl), None);
    assert_eq!(raw.get(CanonicalField::SponsoringEntity), None);

    let again = extract_fields(document.root_element(), &url, &dictionary);
    assert_eq!(raw, again);

    let empty = Html::parse_document("<html><body><p>Nada que ver aquí</p></body></html>");
    assert!(extract_fields(empty.root_element(), &url, &dictionary).is_empty());

    Ok(())
}

#[test]
fn specific_synonyms_win_over_generic_ones() -> Result<()> {
    let markup = r#"
        <table>
          <tr><th>Estado</th><td>Publicado</td></tr>
          <tr><th>Estado de la tramitación</th><td>Adjudicado</td></tr>
          <tr><th>Tramitación</th><td>Ordinaria</td></tr>
          <tr><th>Plazo de presentación</th><td>Del 01/03/2024 al 15/03/2024</td></tr>
          <tr><th>Fin del plazo de presentación</th><td>15/03/2024</td></tr>
        </table>
    "#;
    let document = Html::parse_document(markup);
    let url = Url::parse("https://contratacion.example.eus/a.html")?;
    let raw = extract_fields(document.root_element(), &url, &LabelDictionary::builtin());

    assert_eq!(raw.get(CanonicalField::ProcessingState), Some("Adjudicado"));
    assert_eq!(raw.get(CanonicalField::ProcessingKind), Some("Ordinaria"));
    assert_eq!(
        raw.get(CanonicalField::SubmissionWindow),
        Some("Del 01/03/2024 al 15/03/2024")
    );
    assert_eq!(raw.get(CanonicalField::SubmissionDeadline), Some("15/03/2024"));

    Ok(())
}

#[test]
fn normalizers_pick_the_first_token() {
    assert_eq!(
        first_date("Plazo: 15/03/2024 a las 23:59").as_deref(),
        Some("15/03/2024")
    );
    assert_eq!(first_date("sin fecha"), None);
    assert_eq!(first_date("2024-03-15"), None);

    assert_eq!(
        first_amount("Importe: 12.345,67 €").as_deref(),
        Some("12.345,67")
    );
    assert_eq!(first_amount("Total 1234,56 EUR").as_deref(), Some("1234,56"));
    assert_eq!(first_amount("sin importe"), None);
    assert_eq!(parse_amount_minor("12.345,67"), Some(1_234_567));
    assert_eq!(parse_amount_minor("980,00"), Some(98_000));

    assert_eq!(
        first_classification_code("CPV 33600000 — productos").as_deref(),
        Some("33600000")
    );
    assert_eq!(
        first_classification_code("ref 123456789 y 45000000-7").as_deref(),
        Some("45000000")
    );
    assert_eq!(first_classification_code("1234567"), None);
}

#[test]
fn impossible_dates_normalize_to_absent() {
    assert_eq!(normalize_value(FieldKind::Date, "31/02/2024"), None);
    assert_eq!(
        normalize_value(FieldKind::Date, "Hasta el 29/02/2024 a las 14:00"),
        NaiveDate::from_ymd_opt(2024, 2, 29).map(FieldValue::Date)
    );
    assert_eq!(
        normalize_value(FieldKind::Amount, "Valor: 98.000,00 €"),
        Some(FieldValue::Amount(Amount {
            text: "98.000,00".to_string(),
            minor_units: 9_800_000,
        }))
    );
    assert_eq!(normalize_value(FieldKind::Code, "sin código"), None);
}

#[test]
fn links_resolve_against_the_document_address() -> Result<()> {
    let markup = r##"
        <table>
          <tr><th>Pliegos</th><td><a href="#">ver</a> <a href="docs/pcap.pdf">PCAP</a></td></tr>
        </table>
        <p><a href="mailto:info@example.eus">Contacto</a></p>
        <p><a href="/licitacion-electronica/acceso?exp=1">Acceso</a></p>
    "##;
    let document = Html::parse_document(markup);
    let url = Url::parse("https://contratacion.example.eus/anuncios/detalle/exp-1.html")?;
    let raw = extract_fields(document.root_element(), &url, &LabelDictionary::builtin());

    assert_eq!(
        raw.get(CanonicalField::TenderDocumentsUrl),
        Some("https://contratacion.example.eus/anuncios/detalle/docs/pcap.pdf")
    );
    assert_eq!(
        raw.get(CanonicalField::ElectronicSubmissionUrl),
        Some("https://contratacion.example.eus/licitacion-electronica/acceso?exp=1")
    );

    let keywords = vec!["contacto".to_string()];
    assert_eq!(
        first_matching_link(document.root_element(), &url, &keywords),
        None
    );

    Ok(())
}

#[test]
fn detail_record_from_paired_cells() -> Result<()> {
    let extractor = RecordExtractor::new(
        LabelDictionary::builtin(),
        ReviewPolicy::from(&ReviewConfig {
            expected_contract_type: Some("suministros".to_string()),
        }),
    );
    let page = snapshot(
        "https://contratacion.example.eus/anuncios/exp-001.html",
        fixture("anuncios/exp-001.html")?,
    )?;

    let record = extractor.from_detail(&page, Some("listado".to_string()))?;
    assert_eq!(record.source_id, page.url.to_string());
    assert_eq!(record.origin, RecordOrigin::Detail);
    assert_eq!(record.title.as_deref(), Some("Suministro de material sanitario"));
    assert_eq!(
        record.get(CanonicalField::SubmissionDeadline),
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .map(FieldValue::Date)
            .as_ref()
    );
    assert_eq!(
        record.get(CanonicalField::BudgetExclTax),
        Some(&FieldValue::Amount(Amount {
            text: "12.345,67".to_string(),
            minor_units: 1_234_567,
        }))
    );
    assert_eq!(
        record.get(CanonicalField::ClassificationCode),
        Some(&FieldValue::Code("33600000".to_string()))
    );
    assert_eq!(
        record.get(CanonicalField::TenderDocumentsUrl),
        Some(&FieldValue::Url(
            "https://contratacion.example.eus/anuncios/docs/km-2024-001-pcap.pdf".to_string()
        ))
    );
    assert_eq!(
        record.tender_documents,
        vec![
            DocumentLink {
                text: "PCAP".to_string(),
                url: "https://contratacion.example.eus/anuncios/docs/km-2024-001-pcap.pdf"
                    .to_string(),
            },
            DocumentLink {
                text: "PPT".to_string(),
                url: "https://contratacion.example.eus/anuncios/docs/km-2024-001-ppt.pdf"
                    .to_string(),
            },
        ]
    );
    assert!(record.review.is_empty());
    assert!(record.eligible);

    Ok(())
}

#[test]
fn review_flags_follow_normalized_values() -> Result<()> {
    let extractor = RecordExtractor::new(
        LabelDictionary::builtin(),
        ReviewPolicy {
            expected_contract_type: Some("Suministros".to_string()),
        },
    );

    let services = extractor.from_detail(
        &snapshot(
            "https://contratacion.example.eus/anuncios/exp-002.html",
            fixture("anuncios/exp-002.html")?,
        )?,
        None,
    )?;
    assert_eq!(services.review, vec![ReviewFlag::ContractTypeMismatch]);
    assert!(!services.eligible);
    assert_eq!(
        services.get(CanonicalField::ContractingAuthority),
        Some(&FieldValue::Text("Ayuntamiento de Bilbao".to_string()))
    );

    let inline = extractor.from_detail(
        &snapshot(
            "https://contratacion.example.eus/anuncios/exp-003.html",
            fixture("anuncios/exp-003.html")?,
        )?,
        None,
    )?;
    assert_eq!(inline.review, vec![ReviewFlag::MissingDeadline]);
    assert_eq!(
        inline.get(CanonicalField::TenderDocumentsUrl),
        Some(&FieldValue::Url(
            "https://contratacion.example.eus/documentos/km-2024-003-PCAP.pdf".to_string()
        ))
    );
    assert_eq!(
        inline.get(CanonicalField::ExecutionPlace),
        Some(&FieldValue::Text("Vitoria-Gasteiz".to_string()))
    );

    Ok(())
}

#[test]
fn title_falls_back_to_field_then_listing_text() -> Result<()> {
    let extractor = RecordExtractor::default();

    let from_field = extractor.from_detail(
        &snapshot(
            "https://contratacion.example.eus/anuncios/exp-004.html",
            fixture("anuncios/exp-004.html")?,
        )?,
        Some("Texto del listado".to_string()),
    )?;
    assert_eq!(
        from_field.title.as_deref(),
        Some("Suministro de vehículos eléctricos para la flota municipal")
    );
    assert_eq!(from_field.get(CanonicalField::SubmissionDeadline), None);
    assert!(from_field.review.contains(&ReviewFlag::MissingDeadline));

    let bare = extractor.from_detail(
        &snapshot(
            "https://contratacion.example.eus/anuncios/otro.html",
            "<html><body><p><strong>Expediente:</strong> X-1</p></body></html>".to_string(),
        )?,
        Some("Texto del listado".to_string()),
    )?;
    assert_eq!(bare.title.as_deref(), Some("Texto del listado"));

    Ok(())
}

#[test]
fn empty_documents_are_extraction_failures() -> Result<()> {
    let extractor = RecordExtractor::default();
    let err = extractor
        .from_detail(
            &snapshot("https://contratacion.example.eus/vacio.html", "  ".to_string())?,
            None,
        )
        .expect_err("blank markup must fail");
    assert!(matches!(err, ExtractError::EmptyDocument { .. }));

    let err = extractor
        .from_detail(
            &snapshot(
                "https://contratacion.example.eus/vacio.html",
                "<html><head></head><body>   </body></html>".to_string(),
            )?,
            None,
        )
        .expect_err("markup without text must fail");
    assert!(matches!(err, ExtractError::EmptyDocument { .. }));

    Ok(())
}

#[test]
fn build_record_is_a_pure_function_of_raw_fields() {
    let raw: RawFields = [
        (CanonicalField::Title, "Obra menor".to_string()),
        (CanonicalField::EstimatedValue, "Valor 1.500,00 €".to_string()),
        (CanonicalField::SubmissionDeadline, "  ".to_string()),
    ]
    .into_iter()
    .collect();
    assert_eq!(raw.len(), 2);

    let context = RecordContext {
        source_id: "https://contratacion.example.eus/a.html".to_string(),
        origin: RecordOrigin::Detail,
        heading: None,
        listing_title: None,
        tender_documents: Vec::new(),
    };
    let policy = ReviewPolicy::default();
    let first = build_record(&raw, context.clone(), &policy);
    let second = build_record(&raw, context.clone(), &policy);

    assert_eq!(first, second);
    assert_eq!(first.title.as_deref(), Some("Obra menor"));
    assert_eq!(
        first.review,
        vec![ReviewFlag::MissingDeadline, ReviewFlag::MissingTenderDocuments]
    );

    let with_documents = build_record(
        &raw,
        RecordContext {
            tender_documents: vec![DocumentLink {
                text: "Pliego".to_string(),
                url: "https://contratacion.example.eus/p.pdf".to_string(),
            }],
            ..context
        },
        &policy,
    );
    assert_eq!(with_documents.review, vec![ReviewFlag::MissingDeadline]);
}

#[test]
fn label_overrides_replace_builtin_synonyms() -> Result<()> {
    let mut synonyms = BTreeMap::new();
    synonyms.insert(
        CanonicalField::CaseNumber,
        vec!["re:^ref(erencia)?\\.?$".to_string()],
    );
    let dictionary = LabelDictionary::builtin().with_overrides(&LabelsConfig {
        version: Some("portal-2025".to_string()),
        synonyms,
        link_keywords: BTreeMap::new(),
    })?;
    assert_eq!(dictionary.version, "portal-2025");

    let document = Html::parse_document(
        "<table><tr><th>Expediente</th><td>A</td></tr><tr><th>Ref.</th><td>B</td></tr></table>",
    );
    let url = Url::parse("https://contratacion.example.eus/a.html")?;
    let raw = extract_fields(document.root_element(), &url, &dictionary);
    assert_eq!(raw.get(CanonicalField::CaseNumber), Some("B"));

    let mut keywords = BTreeMap::new();
    keywords.insert(CanonicalField::Title, vec!["titulo".to_string()]);
    let rejected = LabelDictionary::builtin().with_overrides(&LabelsConfig {
        version: None,
        synonyms: BTreeMap::new(),
        link_keywords: keywords,
    });
    assert!(rejected.is_err());

    Ok(())
}
