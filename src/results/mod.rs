//! Certificate records and results-page extraction.
//!
//! Extraction never fails: a page that is not a results page, or a results
//! page without certificates, still yields one sentinel record so every
//! identifier shows up in the output.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::challenges::detectors::{PageState, classify_document};

/// Output column order.
pub const CSV_FIELDNAMES: [&str; 8] = [
    "rfc",
    "razon_social",
    "numero_serie",
    "estado",
    "tipo",
    "fecha_inicial",
    "fecha_final",
    "url_certificado",
];

pub const STATUS_NO_CERTIFICATES: &str = "SIN CERTIFICADOS";
pub const STATUS_CAPTCHA_ERROR: &str = "CAPTCHA_ERROR";
pub const STATUS_ERROR_PREFIX: &str = "ERROR: ";

/// One output row. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub rfc: String,
    #[serde(rename = "razon_social")]
    pub company_name: String,
    #[serde(rename = "numero_serie")]
    pub serial_number: String,
    #[serde(rename = "estado")]
    pub status: String,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "fecha_inicial")]
    pub valid_from: String,
    #[serde(rename = "fecha_final")]
    pub valid_until: String,
    #[serde(rename = "url_certificado")]
    pub certificate_url: String,
}

impl CertificateRecord {
    /// Record carrying only the identifier and a sentinel status.
    pub fn sentinel(rfc: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            rfc: rfc.into(),
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn captcha_error(rfc: impl Into<String>) -> Self {
        Self::sentinel(rfc, STATUS_CAPTCHA_ERROR)
    }

    pub fn no_certificates(rfc: impl Into<String>, company_name: impl Into<String>) -> Self {
        Self {
            company_name: company_name.into(),
            ..Self::sentinel(rfc, STATUS_NO_CERTIFICATES)
        }
    }

    pub fn error(rfc: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::sentinel(rfc, format!("{STATUS_ERROR_PREFIX}{message}"))
    }

    /// `true` for rows that stand in for "no certificates" or a failed lookup.
    pub fn is_sentinel(&self) -> bool {
        self.status == STATUS_NO_CERTIFICATES
            || self.status == STATUS_CAPTCHA_ERROR
            || self.status.starts_with(STATUS_ERROR_PREFIX)
    }
}

static COMPANY_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"table[width="100%"]"#).expect("invalid company table selector"));
static FIELD_LABEL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("label.campos").expect("invalid label selector"));
static TBODY: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tbody[id]").expect("invalid tbody selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("invalid row selector"));
static CELL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.rf-edt-c-cnt").expect("invalid cell selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").expect("invalid link selector"));
static CERT_TBODY_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"tablaCert:tbn").expect("invalid certificate tbody regex"));

const MIN_CELLS: usize = 5;
const MIN_COMPANY_NAME_CHARS: usize = 10;

/// Parse the page left by the retrieval flow into certificate records.
pub fn extract_certificates(html: &str, rfc: &str) -> Vec<CertificateRecord> {
    let document = Html::parse_document(html);

    if classify_document(&document) == PageState::FormPage {
        return vec![CertificateRecord::captcha_error(rfc)];
    }

    let company_name = company_name(&document, rfc).unwrap_or_default();

    let Some(tbody) = document
        .select(&TBODY)
        .find(|tbody| tbody.value().id().is_some_and(|id| CERT_TBODY_ID.is_match(id)))
    else {
        return vec![CertificateRecord::no_certificates(rfc, company_name)];
    };

    let records: Vec<_> = tbody
        .select(&ROW)
        .filter_map(|row| parse_row(row, rfc, &company_name))
        .collect();

    if records.is_empty() {
        vec![CertificateRecord::no_certificates(rfc, company_name)]
    } else {
        records
    }
}

/// First labelled field long enough to be a company name that is neither the
/// RFC itself nor a code label.
fn company_name(document: &Html, rfc: &str) -> Option<String> {
    let table = document.select(&COMPANY_TABLE).next()?;
    table
        .select(&FIELD_LABEL)
        .map(stripped_text)
        .find(|text| {
            !text.is_empty()
                && text != rfc
                && text.chars().count() > MIN_COMPANY_NAME_CHARS
                && !text.to_lowercase().contains("código")
        })
}

fn parse_row(row: ElementRef<'_>, rfc: &str, company_name: &str) -> Option<CertificateRecord> {
    let cells: Vec<_> = row.select(&CELL).collect();
    if cells.len() < MIN_CELLS {
        return None;
    }

    let link = cells[0].select(&LINK).next();
    let serial_number = match link {
        Some(anchor) => stripped_text(anchor),
        None => stripped_text(cells[0]),
    };
    let certificate_url = link
        .and_then(|anchor| anchor.value().attr("href"))
        .unwrap_or_default()
        .to_string();

    Some(CertificateRecord {
        rfc: rfc.to_string(),
        company_name: company_name.to_string(),
        serial_number,
        status: stripped_text(cells[1]),
        kind: stripped_text(cells[2]),
        valid_from: stripped_text(cells[3]),
        valid_until: stripped_text(cells[4]),
        certificate_url,
    })
}

/// Concatenate the element's text nodes, each trimmed, skipping blank ones.
fn stripped_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC: &str = "ABC010101AAA";

    fn results_page(rows: &str) -> String {
        format!(
            r#"<html><body>
            <form id="resultados">
              <table width="100%">
                <tr><td><label class="campos">{RFC}</label></td></tr>
                <tr><td><label class="campos">Código postal 01000</label></td></tr>
                <tr><td><label class="campos">Corto</label></td></tr>
                <tr><td><label class="campos"> EMPRESA DEMO SA DE CV </label></td></tr>
              </table>
              <table><tbody id="consulta:tablaCert:tbn">{rows}</tbody></table>
            </form>
            </body></html>"#
        )
    }

    fn row(serial: &str, href: Option<&str>, status: &str) -> String {
        let first = match href {
            Some(href) => format!(r#"<a href="{href}"> {serial} </a>"#),
            None => serial.to_string(),
        };
        format!(
            r#"<tr>
              <td><div class="rf-edt-c-cnt">{first}</div></td>
              <td><div class="rf-edt-c-cnt">{status}</div></td>
              <td><div class="rf-edt-c-cnt">FIEL</div></td>
              <td><div class="rf-edt-c-cnt">01/01/2020</div></td>
              <td><div class="rf-edt-c-cnt">01/01/2024</div></td>
            </tr>"#
        )
    }

    #[test]
    fn form_page_yields_captcha_error() {
        let records = extract_certificates("<form id=\"consulta\"></form>", RFC);
        assert_eq!(records, vec![CertificateRecord::captcha_error(RFC)]);
        assert!(records[0].is_sentinel());
    }

    #[test]
    fn empty_table_yields_no_certificates_with_company() {
        let records = extract_certificates(&results_page(""), RFC);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, STATUS_NO_CERTIFICATES);
        assert_eq!(records[0].company_name, "EMPRESA DEMO SA DE CV");
        assert_eq!(records[0].serial_number, "");
    }

    #[test]
    fn missing_table_yields_no_certificates() {
        let html = r#"<form id="resultados"><table width="100%"></table></form>"#;
        let records = extract_certificates(html, RFC);
        assert_eq!(records, vec![CertificateRecord::no_certificates(RFC, "")]);
    }

    #[test]
    fn rows_map_to_records_in_cell_order() {
        let rows = format!(
            "{}{}",
            row("00001000000500000001", Some("/descarga?id=1"), "Activo"),
            row("00001000000400000002", None, "Revocado")
        );
        let records = extract_certificates(&results_page(&rows), RFC);
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].serial_number, "00001000000500000001");
        assert_eq!(records[0].status, "Activo");
        assert_eq!(records[0].kind, "FIEL");
        assert_eq!(records[0].valid_from, "01/01/2020");
        assert_eq!(records[0].valid_until, "01/01/2024");
        assert_eq!(records[0].certificate_url, "/descarga?id=1");

        assert_eq!(records[1].serial_number, "00001000000400000002");
        assert_eq!(records[1].certificate_url, "");
        assert_eq!(records[1].company_name, "EMPRESA DEMO SA DE CV");
    }

    #[test]
    fn short_rows_are_skipped() {
        let short = r#"<tr><td><div class="rf-edt-c-cnt">only</div></td></tr>"#;
        let rows = format!("{short}{}", row("123", None, "Activo"));
        let records = extract_certificates(&results_page(&rows), RFC);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].serial_number, "123");

        let only_short = extract_certificates(&results_page(short), RFC);
        assert_eq!(only_short[0].status, STATUS_NO_CERTIFICATES);
    }

    #[test]
    fn extraction_is_deterministic() {
        let html = results_page(&row("1", Some("/x"), "Activo"));
        assert_eq!(extract_certificates(&html, RFC), extract_certificates(&html, RFC));
    }

    #[test]
    fn error_record_carries_message() {
        let record = CertificateRecord::error(RFC, "browser driver fault: gone");
        assert_eq!(record.status, "ERROR: browser driver fault: gone");
        assert!(record.is_sentinel());
        assert_eq!(record.company_name, "");
    }
}
