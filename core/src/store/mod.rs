//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The port, the engine and the assembler call store methods;
//! they never execute SQL directly.

use crate::{
    error::{OnboardingError, OnboardingResult},
    lifecycle::{
        ApplicationStatus, DocumentType, InvestmentStatus, LifecycleStage, PaymentFrequency,
        SignatureStatus,
    },
    port::{SignatureReceipt, SignatureRequest, StepReceipt},
    records::RecordRef,
    types::Timestamp,
};
use rusqlite::{
    params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
    Connection, OptionalExtension, Transaction, TransactionBehavior,
};
use uuid::Uuid;

mod application;
mod investment;
mod signature;
mod transition_log;

pub struct RecordStore {
    conn: Connection,
    path: String,
}

impl RecordStore {
    pub fn open(path: &str) -> OnboardingResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory databases ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// Open a fresh in-memory database.
    /// Named and shared-cache, so `reopen()` reaches the same data
    /// for as long as one handle stays alive.
    pub fn in_memory() -> OnboardingResult<Self> {
        Self::shared_memory(&format!("onboarding-{}", Uuid::new_v4()))
    }

    /// Open (or join) the named shared-cache in-memory database.
    pub fn shared_memory(name: &str) -> OnboardingResult<Self> {
        Self::open(&shared_memory_uri(name))
    }

    /// Open another connection to the same database.
    pub fn reopen(&self) -> OnboardingResult<Self> {
        Self::open(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> OnboardingResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    /// Begin an IMMEDIATE transaction on this connection.
    /// Every store call made through `self` until commit joins it;
    /// dropping the guard rolls back.
    pub(crate) fn immediate_transaction(&self) -> OnboardingResult<Transaction<'_>> {
        Ok(Transaction::new_unchecked(
            &self.conn,
            TransactionBehavior::Immediate,
        )?)
    }

    // ── Status (either record kind) ──────────────────────────────

    /// Current lifecycle stage of a record, or None if the id is unknown.
    pub fn current_stage(&self, record: &RecordRef) -> OnboardingResult<Option<LifecycleStage>> {
        let sql = format!("SELECT status FROM {} WHERE id = ?1", record.kind().table());
        let stage = self
            .conn
            .query_row(&sql, params![record.id()], |row| row.get::<_, LifecycleStage>(0))
            .optional()?;
        Ok(stage)
    }

    /// Raw `{status, updated_at}` write used only as compensation.
    /// Bypasses every business rule except the read-before-write check:
    /// the row is only touched while it still holds `expected`.
    /// Returns false when the row had moved on (or does not exist).
    pub fn write_status_direct(
        &self,
        record: &RecordRef,
        expected: LifecycleStage,
        status: LifecycleStage,
        at: Timestamp,
    ) -> OnboardingResult<bool> {
        let sql = format!(
            "UPDATE {} SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            record.kind().table()
        );
        let changed = self
            .conn
            .execute(&sql, params![status, at, record.id(), expected])?;
        Ok(changed == 1)
    }

    /// Compensation for the coupled signature write: the natural-key upsert
    /// and the application status write commit together or not at all.
    /// The prior signature status and the application stage are read inside
    /// the same transaction, so a double-submit sees the first one's result.
    pub fn compensate_signature(
        &self,
        request: &SignatureRequest,
        at: Timestamp,
    ) -> OnboardingResult<SignatureReceipt> {
        let tx = self.immediate_transaction()?;
        let previous_status = self
            .get_signature(&request.application_id, request.document_type)?
            .map(|s| s.status);
        let signature = self.upsert_signature(
            &request.application_id,
            request.document_type,
            request.status,
            at,
        )?;
        let coupled = match request.couple_to {
            Some(target) => {
                let record = RecordRef::Application(request.application_id.clone());
                let current = self.current_stage(&record)?.ok_or_else(|| {
                    OnboardingError::RecordNotFound {
                        kind: record.kind(),
                        id: record.id().to_string(),
                    }
                })?;
                if current.is_terminal() {
                    // Guard dropped without commit: the upsert is rolled back too.
                    return Err(OnboardingError::StaleTransition {
                        record,
                        current,
                        requested: target,
                    });
                }
                if current.is_at_or_beyond(target) {
                    Some(StepReceipt::AlreadyAt)
                } else if self.write_status_direct(&record, current, target, at)? {
                    Some(StepReceipt::Applied { previous: current })
                } else {
                    return Err(OnboardingError::Persistence {
                        record,
                        reason: format!("status moved off '{current}' during compensation"),
                    });
                }
            }
            None => None,
        };
        tx.commit()?;
        Ok(SignatureReceipt {
            signature,
            previous_status,
            coupled,
        })
    }
}

/// URI of a named shared-cache in-memory database.
pub fn shared_memory_uri(name: &str) -> String {
    format!("file:{name}?mode=memory&cache=shared")
}

// ── Column codecs ──────────────────────────────────────────────────

macro_rules! text_column {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToSql for $ty {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::from(self.as_str()))
                }
            }

            impl FromSql for $ty {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    value
                        .as_str()?
                        .parse()
                        .map_err(|e: OnboardingError| FromSqlError::Other(Box::new(e)))
                }
            }
        )+
    };
}

text_column!(
    LifecycleStage,
    ApplicationStatus,
    InvestmentStatus,
    PaymentFrequency,
    DocumentType,
    SignatureStatus,
);
