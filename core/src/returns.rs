//! Return accrual and payment schedule.
//!
//! RULE: pure functions over an `Investment` snapshot. No I/O, no clock.
//! The caller supplies `as_of`.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Serialize, Serializer};

use crate::{lifecycle::InvestmentStatus, records::Investment};

/// Shown in place of a date until the investment is active.
pub const PENDING_ACTIVATION: &str = "Pending Activation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPayment {
    PendingActivation,
    Due(NaiveDate),
}

impl Serialize for NextPayment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::PendingActivation => serializer.serialize_str(PENDING_ACTIVATION),
            Self::Due(date) => serializer.collect_str(&date.format("%Y-%m-%d")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnOverview {
    pub months_elapsed: u32,
    pub monthly_return: f64,
    pub total_returns: f64,
    pub current_value: f64,
    pub next_payment: NextPayment,
    pub next_payment_amount: f64,
    pub maturity_date: Option<NaiveDate>,
}

/// Derive the dashboard figures for `investment` as of `as_of`.
pub fn compute_overview(investment: &Investment, as_of: NaiveDate) -> ReturnOverview {
    let months_elapsed = months_between(investment.start_date, as_of);
    let monthly = monthly_return(investment.amount, investment.annual_rate);
    let total_returns = monthly * f64::from(months_elapsed);

    let (next_payment, next_payment_amount) = if investment.status == InvestmentStatus::Active {
        let period = investment.payment_frequency.period_months();
        let offset = period * (months_elapsed / period + 1);
        match add_months(investment.start_date, offset) {
            Some(date) => (NextPayment::Due(date), monthly * f64::from(period)),
            None => (NextPayment::PendingActivation, 0.0),
        }
    } else {
        (NextPayment::PendingActivation, 0.0)
    };

    ReturnOverview {
        months_elapsed,
        monthly_return: monthly,
        total_returns,
        current_value: investment.amount + total_returns,
        next_payment,
        next_payment_amount,
        maturity_date: add_months(investment.start_date, investment.term_months),
    }
}

/// Whole calendar months from `start` to `as_of`, floored at zero.
/// Day of month is ignored.
pub fn months_between(start: NaiveDate, as_of: NaiveDate) -> u32 {
    let index = |d: NaiveDate| i64::from(d.year()) * 12 + i64::from(d.month0());
    u32::try_from((index(as_of) - index(start)).max(0)).unwrap_or(u32::MAX)
}

/// `amount × rate% / 12`. A negative or non-finite rate counts as 0%.
pub fn monthly_return(amount: f64, annual_rate_percent: f64) -> f64 {
    let rate = if annual_rate_percent.is_finite() && annual_rate_percent > 0.0 {
        annual_rate_percent
    } else {
        0.0
    };
    let monthly = amount * (rate / 100.0) / 12.0;
    if monthly.is_finite() && monthly > 0.0 {
        monthly
    } else {
        0.0
    }
}

/// Simple (non-compounding) return over the full term.
pub fn expected_total_return(amount: f64, annual_rate_percent: f64, term_months: u32) -> f64 {
    monthly_return(amount, annual_rate_percent) * f64::from(term_months)
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}
