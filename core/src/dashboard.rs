//! Investor dashboard assembly.
//!
//! RULE: read-only. The assembler derives its state from the status the
//! transition engine wrote and never writes anything itself.
//!
//! STATES:
//!   NoInvestment      → nothing qualifying; constant sample figures.
//!   PendingInvestment → something in flight; zeroed returns.
//!   ActiveInvestment  → at least one active investment; real figures.

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    config::DashboardConfig,
    error::OnboardingResult,
    lifecycle::{InvestmentStatus, LifecycleStage, PaymentFrequency},
    records::{InvestmentApplication, InvestmentWithApplication},
    returns::{compute_overview, NextPayment},
    store::RecordStore,
    types::{EntityId, Timestamp},
};

pub const ACTIVITY_ACTIVATED: &str = "Investment activated";
pub const ACTIVITY_SUBMITTED: &str = "Investment submitted";
pub const ACTIVITY_PROCESSED: &str = "Investment processed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardState {
    NoInvestment,
    PendingInvestment,
    ActiveInvestment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub investment_id: EntityId,
    pub application_id: EntityId,
    pub title: &'static str,
    pub status: InvestmentStatus,
    pub amount: f64,
    pub at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardOverview {
    pub state: DashboardState,
    /// True when the figures are placeholders and the UI should show
    /// onboarding prompts instead.
    pub is_sample_data: bool,
    pub application_id: Option<EntityId>,
    pub investment_id: Option<EntityId>,
    pub total_invested: f64,
    pub current_value: f64,
    pub total_returns: f64,
    pub monthly_return: f64,
    pub annual_rate: f64,
    pub payment_frequency: Option<PaymentFrequency>,
    pub next_payment: NextPayment,
    pub next_payment_amount: f64,
    pub maturity_date: Option<NaiveDate>,
    pub recent_activity: Vec<ActivityEntry>,
}

impl DashboardOverview {
    /// The zero-valued overview for a user with nothing in flight.
    pub fn sample() -> Self {
        Self {
            state: DashboardState::NoInvestment,
            is_sample_data: true,
            application_id: None,
            investment_id: None,
            total_invested: 0.0,
            current_value: 0.0,
            total_returns: 0.0,
            monthly_return: 0.0,
            annual_rate: 0.0,
            payment_frequency: None,
            next_payment: NextPayment::PendingActivation,
            next_payment_amount: 0.0,
            maturity_date: None,
            recent_activity: Vec::new(),
        }
    }

    /// Principal shown, returns zeroed, payment pending.
    fn pending(
        application_id: EntityId,
        investment_id: Option<EntityId>,
        amount: f64,
        annual_rate: f64,
        payment_frequency: PaymentFrequency,
    ) -> Self {
        Self {
            state: DashboardState::PendingInvestment,
            is_sample_data: false,
            application_id: Some(application_id),
            investment_id,
            total_invested: amount,
            current_value: amount,
            annual_rate,
            payment_frequency: Some(payment_frequency),
            ..Self::sample()
        }
    }
}

pub struct DashboardAssembler {
    store: RecordStore,
    config: DashboardConfig,
}

impl DashboardAssembler {
    pub fn new(store: RecordStore, config: DashboardConfig) -> Self {
        Self { store, config }
    }

    pub fn build_overview(&self, user_id: &str, as_of: NaiveDate) -> OnboardingResult<DashboardOverview> {
        // Newest first.
        let investments: Vec<InvestmentWithApplication> = self
            .store
            .investments_for_user(user_id)?
            .into_iter()
            .filter(qualifies)
            .collect();

        let mut overview = if let Some(primary) = investments
            .iter()
            .find(|row| row.investment.status == InvestmentStatus::Active)
        {
            let inv = &primary.investment;
            let returns = compute_overview(inv, as_of);
            DashboardOverview {
                state: DashboardState::ActiveInvestment,
                is_sample_data: false,
                application_id: Some(inv.application_id.clone()),
                investment_id: Some(inv.id.clone()),
                total_invested: inv.amount,
                current_value: returns.current_value,
                total_returns: returns.total_returns,
                monthly_return: returns.monthly_return,
                annual_rate: inv.annual_rate,
                payment_frequency: Some(inv.payment_frequency),
                next_payment: returns.next_payment,
                next_payment_amount: returns.next_payment_amount,
                maturity_date: returns.maturity_date,
                recent_activity: Vec::new(),
            }
        } else if let Some(row) = investments.first() {
            let inv = &row.investment;
            DashboardOverview::pending(
                inv.application_id.clone(),
                Some(inv.id.clone()),
                inv.amount,
                inv.annual_rate,
                inv.payment_frequency,
            )
        } else if let Some(app) = self.pending_application(user_id)? {
            DashboardOverview::pending(
                app.id,
                None,
                app.amount,
                app.annual_rate,
                app.payment_frequency,
            )
        } else {
            log::debug!("user '{user_id}' has nothing in flight; sample overview");
            return Ok(DashboardOverview::sample());
        };

        overview.recent_activity = self.activity(&investments);
        Ok(overview)
    }

    /// Most recent live application that has not been funded yet.
    fn pending_application(&self, user_id: &str) -> OnboardingResult<Option<InvestmentApplication>> {
        for app in self.store.applications_for_user(user_id)? {
            if app.status.stage().is_exit() {
                continue;
            }
            if self.store.investments_for_application(&app.id)?.is_empty() {
                return Ok(Some(app));
            }
        }
        Ok(None)
    }

    fn activity(&self, investments: &[InvestmentWithApplication]) -> Vec<ActivityEntry> {
        let mut entries: Vec<ActivityEntry> = investments
            .iter()
            .map(|row| {
                let inv = &row.investment;
                ActivityEntry {
                    investment_id: inv.id.clone(),
                    application_id: inv.application_id.clone(),
                    title: activity_title(inv.status),
                    status: inv.status,
                    amount: inv.amount,
                    at: inv.updated_at,
                }
            })
            .collect();
        entries.sort_by(|a, b| b.at.cmp(&a.at).then_with(|| b.investment_id.cmp(&a.investment_id)));
        entries.truncate(self.config.activity_limit);
        entries
    }
}

/// Cancelled, rejected and deleted records never reach the dashboard,
/// whichever side of the link carries the exit.
fn qualifies(row: &InvestmentWithApplication) -> bool {
    !row.investment.status.stage().is_exit() && !row.application_status.stage().is_exit()
}

pub fn activity_title(status: InvestmentStatus) -> &'static str {
    let stage = status.stage();
    if stage == LifecycleStage::Active {
        ACTIVITY_ACTIVATED
    } else if !stage.is_at_or_beyond(LifecycleStage::BankDetailsPending) {
        ACTIVITY_SUBMITTED
    } else {
        ACTIVITY_PROCESSED
    }
}
