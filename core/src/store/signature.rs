//! Document signature queries. One row per (application, document type).

use super::RecordStore;
use crate::{
    error::{OnboardingError, OnboardingResult},
    lifecycle::{DocumentType, SignatureStatus},
    records::{DocumentSignature, RecordKind},
    types::Timestamp,
};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

const SIGNATURE_COLUMNS: &str = "id, application_id, document_type, status, signed_at,
     document_url, created_at, updated_at";

impl RecordStore {
    pub fn get_signature(
        &self,
        application_id: &str,
        document_type: DocumentType,
    ) -> OnboardingResult<Option<DocumentSignature>> {
        let sql = format!(
            "SELECT {SIGNATURE_COLUMNS} FROM document_signatures
             WHERE application_id = ?1 AND document_type = ?2"
        );
        let sig = self
            .conn
            .query_row(&sql, params![application_id, document_type], signature_from_row)
            .optional()?;
        Ok(sig)
    }

    pub fn signatures_for_application(&self, application_id: &str) -> OnboardingResult<Vec<DocumentSignature>> {
        let sql = format!(
            "SELECT {SIGNATURE_COLUMNS} FROM document_signatures
             WHERE application_id = ?1
             ORDER BY document_type ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![application_id], signature_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Insert or update by natural key. The first signed timestamp is kept
    /// on later updates.
    pub fn upsert_signature(
        &self,
        application_id: &str,
        document_type: DocumentType,
        status: SignatureStatus,
        at: Timestamp,
    ) -> OnboardingResult<DocumentSignature> {
        let signed_at = status.is_signed().then_some(at);
        self.conn.execute(
            "INSERT INTO document_signatures (
                id, application_id, document_type, status, signed_at,
                document_url, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, ?6)
            ON CONFLICT (application_id, document_type) DO UPDATE SET
                status     = excluded.status,
                signed_at  = COALESCE(document_signatures.signed_at, excluded.signed_at),
                updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                application_id,
                document_type,
                status,
                signed_at,
                at,
            ],
        )?;
        self.get_signature(application_id, document_type)?
            .ok_or_else(|| OnboardingError::RecordNotFound {
                kind: RecordKind::Application,
                id: application_id.to_string(),
            })
    }

    /// Attach the URL issued by the e-signature collaborator.
    pub fn set_document_url(
        &self,
        application_id: &str,
        document_type: DocumentType,
        url: &str,
    ) -> OnboardingResult<bool> {
        let changed = self.conn.execute(
            "UPDATE document_signatures SET document_url = ?1
             WHERE application_id = ?2 AND document_type = ?3",
            params![url, application_id, document_type],
        )?;
        Ok(changed == 1)
    }
}

fn signature_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentSignature> {
    Ok(DocumentSignature {
        id: row.get(0)?,
        application_id: row.get(1)?,
        document_type: row.get(2)?,
        status: row.get(3)?,
        signed_at: row.get(4)?,
        document_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
