//! Smoke tests against the live portal. Run with `cargo test -- --ignored`.

use std::time::Duration;

use certlookup_rs::tools::fetch_page;
use certlookup_rs::{Defaults, classify_page};

#[tokio::test]
#[ignore = "requires network access to the SAT portal"]
async fn portal_serves_the_lookup_form() {
    let html = fetch_page(Defaults::URL, Duration::from_secs(30))
        .await
        .expect("portal unreachable");
    assert!(!classify_page(&html).is_results());
    assert!(html.contains("entradaRFC"), "lookup form markup changed");
}
