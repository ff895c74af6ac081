use super::RecordStore;
use crate::{
    error::OnboardingResult,
    lifecycle::ApplicationStatus,
    records::InvestmentApplication,
    types::Timestamp,
};
use rusqlite::{params, OptionalExtension, Row};

const APPLICATION_COLUMNS: &str = "id, user_id, amount, annual_rate, payment_frequency,
     term_months, status, created_at, updated_at";

impl RecordStore {
    // ── Application ───────────────────────────────────────────────

    pub fn insert_application(&self, app: &InvestmentApplication) -> OnboardingResult<()> {
        self.conn.execute(
            "INSERT INTO investment_applications (
                id, user_id, amount, annual_rate, payment_frequency,
                term_months, status, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &app.id,
                &app.user_id,
                app.amount,
                app.annual_rate,
                app.payment_frequency,
                app.term_months,
                app.status,
                app.created_at,
                app.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_application(&self, id: &str) -> OnboardingResult<Option<InvestmentApplication>> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM investment_applications WHERE id = ?1");
        let app = self
            .conn
            .query_row(&sql, params![id], application_from_row)
            .optional()?;
        Ok(app)
    }

    /// All applications owned by `user_id`, newest first.
    pub fn applications_for_user(&self, user_id: &str) -> OnboardingResult<Vec<InvestmentApplication>> {
        let sql = format!(
            "SELECT {APPLICATION_COLUMNS} FROM investment_applications
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], application_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Validated-path status write. Returns the number of rows touched.
    pub fn set_application_status(
        &self,
        id: &str,
        status: ApplicationStatus,
        at: Timestamp,
    ) -> OnboardingResult<usize> {
        let changed = self.conn.execute(
            "UPDATE investment_applications SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, at, id],
        )?;
        Ok(changed)
    }
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<InvestmentApplication> {
    Ok(InvestmentApplication {
        id: row.get(0)?,
        user_id: row.get(1)?,
        amount: row.get(2)?,
        annual_rate: row.get(3)?,
        payment_frequency: row.get(4)?,
        term_months: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
