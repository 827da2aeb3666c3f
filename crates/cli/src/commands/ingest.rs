//! Grading-service certificate ingestion.
//!
//! Reads certificate lookups saved as JSON (one response object, or an array of
//! them) and upserts the card, certificate and reported sales.
//!
//! # Usage
//!
//! ```bash
//! kado-cli ingest certs/49390123.json
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use kado_web::db::CardRepository;
use kado_web::models::CertificateResponse;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IngestFile {
    Many(Vec<CertificateResponse>),
    One(Box<CertificateResponse>),
}

impl IngestFile {
    fn into_responses(self) -> Vec<CertificateResponse> {
        match self {
            Self::Many(responses) => responses,
            Self::One(response) => vec![*response],
        }
    }
}

/// Parse a saved lookup file.
fn parse(content: &str) -> Result<Vec<CertificateResponse>, serde_json::Error> {
    Ok(serde_json::from_str::<IngestFile>(content)?.into_responses())
}

/// Ingest every certificate in `file_path`.
///
/// The file is parsed in full before connecting, so a malformed file writes nothing.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or an upsert fails.
pub async fn run(file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let content = tokio::fs::read_to_string(file_path).await?;
    let responses = parse(&content)?;
    info!(path = %file_path.display(), certificates = responses.len(), "Parsed certificate file");

    let pool = super::connect().await?;
    let repo = CardRepository::new(&pool);

    let mut new_sales = 0;
    for response in &responses {
        let (certificate_id, sales) = repo
            .ingest_certificate(&response.cert, &response.sales)
            .await?;
        info!(
            certificate_id = %certificate_id,
            cert_number = %response.cert.cert_number,
            new_sales = sales,
            "Ingested certificate"
        );
        new_sales += sales;
    }

    info!(certificates = responses.len(), new_sales, "Ingest complete");
    Ok(())
}
