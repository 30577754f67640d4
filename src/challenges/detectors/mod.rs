//! Page classification.
//!
//! After a submission the portal either re-renders the lookup form (wrong
//! answer, expired challenge) or shows the results form. The presence of the
//! results form container is the only signal consulted.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

/// Where the browser session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    FormPage,
    ResultsPage,
}

impl PageState {
    pub fn is_results(self) -> bool {
        matches!(self, PageState::ResultsPage)
    }
}

static RESULTS_FORM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form#resultados").expect("invalid results form selector"));

/// Classify raw markup.
pub fn classify_page(html: &str) -> PageState {
    let document = Html::parse_document(html);
    classify_document(&document)
}

/// Classify an already parsed document.
pub fn classify_document(document: &Html) -> PageState {
    if document.select(&RESULTS_FORM).next().is_some() {
        PageState::ResultsPage
    } else {
        PageState::FormPage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_form_marks_results_page() {
        let html = r#"<html><body><div><form id="resultados" method="post"></form></div></body></html>"#;
        assert_eq!(classify_page(html), PageState::ResultsPage);
        assert!(classify_page(html).is_results());
    }

    #[test]
    fn lookup_form_is_form_page() {
        let html = r#"
            <form id="consultaCertificados">
              <input id="consultaCertificados:entradaRFC" type="text"/>
              <img src="/captcha.jpg"/>
            </form>"#;
        assert_eq!(classify_page(html), PageState::FormPage);
    }

    #[test]
    fn marker_must_be_a_form() {
        assert_eq!(classify_page(r#"<div id="resultados"></div>"#), PageState::FormPage);
        assert_eq!(classify_page(""), PageState::FormPage);
        assert_eq!(classify_page("<p>resultados</p>"), PageState::FormPage);
    }
}
