use super::RecordStore;
use crate::{
    error::OnboardingResult,
    lifecycle::InvestmentStatus,
    records::{Investment, InvestmentWithApplication},
    types::Timestamp,
};
use rusqlite::{params, OptionalExtension, Row};

const INVESTMENT_COLUMNS: &str = "i.id, i.application_id, i.user_id, i.amount, i.annual_rate,
     i.payment_frequency, i.term_months, i.start_date, i.status,
     i.total_expected_return, i.created_at, i.updated_at";

impl RecordStore {
    // ── Investment ────────────────────────────────────────────────

    pub fn insert_investment(&self, inv: &Investment) -> OnboardingResult<()> {
        self.conn.execute(
            "INSERT INTO investments (
                id, application_id, user_id, amount, annual_rate, payment_frequency,
                term_months, start_date, status, total_expected_return, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &inv.id,
                &inv.application_id,
                &inv.user_id,
                inv.amount,
                inv.annual_rate,
                inv.payment_frequency,
                inv.term_months,
                inv.start_date,
                inv.status,
                inv.total_expected_return,
                inv.created_at,
                inv.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_investment(&self, id: &str) -> OnboardingResult<Option<Investment>> {
        let sql = format!("SELECT {INVESTMENT_COLUMNS} FROM investments i WHERE i.id = ?1");
        let inv = self
            .conn
            .query_row(&sql, params![id], investment_from_row)
            .optional()?;
        Ok(inv)
    }

    /// Investments created from one application, oldest first.
    pub fn investments_for_application(&self, application_id: &str) -> OnboardingResult<Vec<Investment>> {
        let sql = format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investments i
             WHERE i.application_id = ?1
             ORDER BY i.created_at ASC, i.id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![application_id], investment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every investment owned by `user_id` with its application's status, newest first.
    pub fn investments_for_user(&self, user_id: &str) -> OnboardingResult<Vec<InvestmentWithApplication>> {
        let sql = format!(
            "SELECT {INVESTMENT_COLUMNS}, a.status
             FROM investments i
             JOIN investment_applications a ON a.id = i.application_id
             WHERE i.user_id = ?1
             ORDER BY i.created_at DESC, i.id DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(InvestmentWithApplication {
                investment: investment_from_row(row)?,
                application_status: row.get(12)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Validated-path status write. Returns the number of rows touched.
    pub fn set_investment_status(
        &self,
        id: &str,
        status: InvestmentStatus,
        at: Timestamp,
    ) -> OnboardingResult<usize> {
        let changed = self.conn.execute(
            "UPDATE investments SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, at, id],
        )?;
        Ok(changed)
    }
}

fn investment_from_row(row: &Row<'_>) -> rusqlite::Result<Investment> {
    Ok(Investment {
        id: row.get(0)?,
        application_id: row.get(1)?,
        user_id: row.get(2)?,
        amount: row.get(3)?,
        annual_rate: row.get(4)?,
        payment_frequency: row.get(5)?,
        term_months: row.get(6)?,
        start_date: row.get(7)?,
        status: row.get(8)?,
        total_expected_return: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
