//! Grading reference data: cards, certificates and sales.
//!
//! Written only by the ingest command; read by listing pages.

use sqlx::PgPool;

use kado_core::{CardId, CertificateId};

use super::RepositoryError;
use crate::models::{
    Card, CertificateDetail, CertificatePayload, GradingCertificate, SalePayload, SalesRecord,
};

/// Grader recorded for certificates ingested from the certificate lookup API.
pub const DEFAULT_GRADER: &str = "PSA";

/// Repository for grading reference data.
pub struct CardRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CardRepository<'a> {
    /// Create a new card repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Upsert a certificate, its card, and any reported sales in one transaction.
    ///
    /// Returns the certificate id and the number of new sales rows.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any statement fails.
    pub async fn ingest_certificate(
        &self,
        cert: &CertificatePayload,
        sales: &[SalePayload],
    ) -> Result<(CertificateId, u64), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let card_number = cert.card_number.as_deref().unwrap_or_default().trim();

        let card_id: CardId = sqlx::query_scalar(
            r"
            INSERT INTO kado.cards (name, set_name, card_number, year)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (set_name, card_number, name) DO UPDATE
            SET year = COALESCE(kado.cards.year, EXCLUDED.year)
            RETURNING id
            ",
        )
        .bind(cert.subject.trim())
        .bind(cert.brand.trim())
        .bind(card_number)
        .bind(cert.year())
        .fetch_one(&mut *tx)
        .await?;

        let raw = serde_json::json!({
            "certNumber": cert.cert_number,
            "year": cert.year,
            "brand": cert.brand,
            "cardNumber": cert.card_number,
            "subject": cert.subject,
            "cardGrade": cert.card_grade,
            "totalPopulation": cert.total_population,
        });

        let certificate_id: CertificateId = sqlx::query_scalar(
            r"
            INSERT INTO kado.grading_certificates
                (grader, cert_number, grade, card_id, population, raw)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (grader, cert_number) DO UPDATE
            SET grade = EXCLUDED.grade,
                card_id = EXCLUDED.card_id,
                population = EXCLUDED.population,
                raw = EXCLUDED.raw,
                updated_at = NOW()
            RETURNING id
            ",
        )
        .bind(DEFAULT_GRADER)
        .bind(cert.cert_number.trim())
        .bind(cert.card_grade.trim())
        .bind(card_id)
        .bind(cert.total_population)
        .bind(&raw)
        .fetch_one(&mut *tx)
        .await?;

        let mut inserted = 0;
        for sale in sales {
            let result = sqlx::query(
                r"
                INSERT INTO kado.sales_data
                    (card_id, grader, grade, price_cents, currency, sold_at, source)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (card_id, grader, grade, sold_at, source) DO NOTHING
                ",
            )
            .bind(card_id)
            .bind(DEFAULT_GRADER)
            .bind(sale.grade.trim())
            .bind(sale.price_cents)
            .bind(sale.currency)
            .bind(sale.sold_at)
            .bind(sale.source.trim())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok((certificate_id, inserted))
    }

    /// A certificate with its card and up to `sales_limit` recent sales at the same grade.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn certificate_detail(
        &self,
        id: CertificateId,
        sales_limit: i64,
    ) -> Result<Option<CertificateDetail>, RepositoryError> {
        let Some(certificate) = sqlx::query_as::<_, GradingCertificate>(
            r"
            SELECT id, grader, cert_number, grade, card_id, population, created_at, updated_at
            FROM kado.grading_certificates
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        else {
            return Ok(None);
        };

        let Some(card_id) = certificate.card_id else {
            return Ok(Some(CertificateDetail {
                certificate,
                card: None,
                recent_sales: Vec::new(),
            }));
        };

        let card = sqlx::query_as::<_, Card>(
            r"
            SELECT id, name, set_name, card_number, year, language, image_url, created_at
            FROM kado.cards
            WHERE id = $1
            ",
        )
        .bind(card_id)
        .fetch_optional(self.pool)
        .await?;

        let recent_sales = sqlx::query_as::<_, SalesRecord>(
            r"
            SELECT grader, grade, price_cents, currency, sold_at, source
            FROM kado.sales_data
            WHERE card_id = $1 AND grader = $2 AND grade = $3
            ORDER BY sold_at DESC
            LIMIT $4
            ",
        )
        .bind(card_id)
        .bind(&certificate.grader)
        .bind(&certificate.grade)
        .bind(sales_limit)
        .fetch_all(self.pool)
        .await?;

        Ok(Some(CertificateDetail {
            certificate,
            card,
            recent_sales,
        }))
    }
}
