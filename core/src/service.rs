//! The onboarding service: one wired-up set of store, port, engine and
//! assembler, plus the entry points the surrounding app calls.
//!
//! Every component gets its own connection to the same database.
//! The notification dispatcher is handed back to the caller, who decides
//! whether to drain it inline or run it on a thread.

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::OnboardingConfig,
    dashboard::{DashboardAssembler, DashboardOverview},
    error::{OnboardingError, OnboardingResult},
    lifecycle::{ApplicationStatus, DocumentType, InvestmentStatus, LifecycleStage, SignatureStatus},
    notify::{self, channel_for, NotificationChannel, NotificationDispatcher},
    port::{SqlTransitionPort, TransitionPort},
    records::{Investment, InvestmentApplication, NewApplication, RecordKind, RecordRef},
    returns::expected_total_return,
    store::RecordStore,
    transition::{SignatureOptions, SignatureOutcome, TransitionEngine, TransitionOptions, TransitionOutcome},
};

pub struct OnboardingService {
    config:    OnboardingConfig,
    store:     RecordStore,
    engine:    TransitionEngine,
    dashboard: DashboardAssembler,
}

impl OnboardingService {
    /// Wire the SQL port and the configured notification channel.
    pub fn build(
        config: OnboardingConfig,
        store: &RecordStore,
        clock: Clock,
    ) -> OnboardingResult<(Self, NotificationDispatcher)> {
        let port = Box::new(SqlTransitionPort::new(store.reopen()?));
        let channel = channel_for(&config.notifications);
        Self::with_parts(config, store, clock, port, channel)
    }

    /// Wire a caller-supplied port and channel (fault injection, tests).
    pub fn with_parts(
        config: OnboardingConfig,
        store: &RecordStore,
        clock: Clock,
        port: Box<dyn TransitionPort>,
        channel: Box<dyn NotificationChannel>,
    ) -> OnboardingResult<(Self, NotificationDispatcher)> {
        log::debug!("wiring onboarding service on {} via {} port", store.path(), port.name());
        let (outbox, dispatcher) = notify::outbox(channel);
        let engine = TransitionEngine::new(
            store.reopen()?,
            port,
            outbox,
            config.workflow.clone(),
            clock,
        );
        let dashboard = DashboardAssembler::new(store.reopen()?, config.dashboard.clone());
        let service = Self {
            store: store.reopen()?,
            config,
            engine,
            dashboard,
        };
        Ok((service, dispatcher))
    }

    pub fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn clock(&self) -> &Clock {
        self.engine.clock()
    }

    pub fn advance_clock(&mut self, by: Duration) {
        self.engine.clock_mut().advance(by);
    }

    // ── Applications and investments ─────────────────────────────

    /// Create an application at `promissory_note_pending`.
    pub fn submit_application(&mut self, new: NewApplication) -> OnboardingResult<InvestmentApplication> {
        if new.user_id.trim().is_empty() {
            return Err(OnboardingError::Validation("user id is empty".into()));
        }
        if !new.amount.is_finite() || new.amount <= 0.0 {
            return Err(OnboardingError::Validation(format!(
                "amount must be positive, got {}",
                new.amount
            )));
        }
        if !new.annual_rate.is_finite() || new.annual_rate < 0.0 {
            return Err(OnboardingError::Validation(format!(
                "annual rate must be zero or more, got {}",
                new.annual_rate
            )));
        }
        if new.term_months == 0 {
            return Err(OnboardingError::Validation("term must be at least one month".into()));
        }

        let now = self.clock().now();
        let app = InvestmentApplication {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            amount: new.amount,
            annual_rate: new.annual_rate,
            payment_frequency: new.payment_frequency,
            term_months: new.term_months,
            status: ApplicationStatus::PromissoryNotePending,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_application(&app)?;
        log::info!("application '{}' submitted for user '{}'", app.id, app.user_id);
        Ok(app)
    }

    /// Create the investment for an application. Calling again returns
    /// the investment already created.
    pub fn fund_application(
        &mut self,
        application_id: &str,
        start_date: NaiveDate,
    ) -> OnboardingResult<Investment> {
        if application_id.trim().is_empty() {
            return Err(OnboardingError::Validation("application id is empty".into()));
        }
        let app = self
            .store
            .get_application(application_id)?
            .ok_or_else(|| OnboardingError::RecordNotFound {
                kind: RecordKind::Application,
                id: application_id.to_string(),
            })?;
        if let Some(existing) = self.store.investments_for_application(application_id)?.into_iter().next() {
            log::debug!("application '{application_id}' already funded as '{}'", existing.id);
            return Ok(existing);
        }
        let stage = app.status.stage();
        if stage.is_terminal() {
            return Err(OnboardingError::StaleTransition {
                record: RecordRef::Application(app.id),
                current: stage,
                requested: LifecycleStage::Pending,
            });
        }

        let now = self.clock().now();
        let investment = Investment {
            id: Uuid::new_v4().to_string(),
            application_id: app.id.clone(),
            user_id: app.user_id.clone(),
            amount: app.amount,
            annual_rate: app.annual_rate,
            payment_frequency: app.payment_frequency,
            term_months: app.term_months,
            start_date,
            status: InvestmentStatus::from_stage(stage).unwrap_or(InvestmentStatus::Pending),
            total_expected_return: expected_total_return(app.amount, app.annual_rate, app.term_months),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_investment(&investment)?;
        log::info!(
            "application '{}' funded as investment '{}' ({})",
            app.id,
            investment.id,
            investment.status
        );
        Ok(investment)
    }

    // ── Workflow ─────────────────────────────────────────────────

    pub fn apply_transition(
        &mut self,
        record: &RecordRef,
        target: LifecycleStage,
        options: &TransitionOptions,
    ) -> OnboardingResult<TransitionOutcome> {
        self.engine.apply_transition(record, target, options)
    }

    pub fn record_signature(
        &mut self,
        application_id: &str,
        document_type: DocumentType,
        status: SignatureStatus,
        options: &SignatureOptions,
    ) -> OnboardingResult<SignatureOutcome> {
        self.engine
            .record_signature(application_id, document_type, status, options)
    }

    // ── Dashboard ────────────────────────────────────────────────

    /// Overview as of the service clock's current date.
    pub fn build_overview(&self, user_id: &str) -> OnboardingResult<DashboardOverview> {
        self.build_overview_as_of(user_id, self.clock().today())
    }

    pub fn build_overview_as_of(&self, user_id: &str, as_of: NaiveDate) -> OnboardingResult<DashboardOverview> {
        self.dashboard.build_overview(user_id, as_of)
    }
}
