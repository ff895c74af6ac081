use super::RecordStore;
use crate::{
    error::{OnboardingError, OnboardingResult},
    lifecycle::LifecycleStage,
    records::{RecordRef, TransitionLogEntry, WritePath},
    types::Timestamp,
};
use rusqlite::params;

impl RecordStore {
    // ── Transition log ────────────────────────────────────────────

    pub fn append_transition(&self, entry: &TransitionLogEntry) -> OnboardingResult<()> {
        self.conn.execute(
            "INSERT INTO transition_log (record_kind, record_id, from_status, to_status, path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.record.kind().table(),
                entry.record.id(),
                entry.from_status,
                entry.to_status,
                entry.path.as_str(),
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// Applied changes for one record, in the order they were written.
    pub fn transitions_for(&self, record: &RecordRef) -> OnboardingResult<Vec<TransitionLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_status, to_status, path, created_at
             FROM transition_log
             WHERE record_kind = ?1 AND record_id = ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![record.kind().table(), record.id()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, LifecycleStage>(1)?,
                row.get::<_, LifecycleStage>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Timestamp>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, from_status, to_status, path, created_at) = row?;
            let path = match path.as_str() {
                "primary" => WritePath::Primary,
                "compensation" => WritePath::Compensation,
                other => return Err(OnboardingError::UnknownStatus(other.to_string())),
            };
            entries.push(TransitionLogEntry {
                id: Some(id),
                record: record.clone(),
                from_status,
                to_status,
                path,
                created_at,
            });
        }
        Ok(entries)
    }

    /// Number of changes written through the compensation path.
    pub fn compensation_count(&self) -> OnboardingResult<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM transition_log WHERE path = 'compensation'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
