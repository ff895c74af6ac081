//! The privileged, validated write path.
//!
//! A `TransitionPort` exposes the three named operations the workflow
//! relies on. Each one is a single serialization point: it re-reads the
//! record, re-checks ordering and writes inside one transaction, so a
//! double-submitted request observes the first one's result.
//!
//! When a port call fails for any reason, the engine falls back to the
//! store's raw compensation writes (see `transition.rs`).

use thiserror::Error;

use crate::{
    lifecycle::{
        classify, ApplicationStatus, DocumentType, GuardViolation, InvestmentStatus,
        LifecycleStage, SignatureStatus,
    },
    records::{DocumentSignature, Investment, RecordRef},
    rng::{RngSlot, SeededRng},
    store::RecordStore,
    types::{EntityId, Timestamp},
};

pub const UPDATE_ONBOARDING_STEP: &str = "update_onboarding_step";
pub const ENSURE_DOCUMENT_SIGNATURE: &str = "ensure_document_signature";
pub const ACTIVATE_INVESTMENT: &str = "activate_investment";

/// Why a named operation did not complete.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortFailure {
    #[error("operation '{0}' is not available")]
    Missing(&'static str),

    #[error("operation rejected: {0}")]
    Rejected(String),

    #[error("operation timed out after {after_ms} ms")]
    TimedOut { after_ms: u64 },

    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<crate::error::OnboardingError> for PortFailure {
    fn from(err: crate::error::OnboardingError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<rusqlite::Error> for PortFailure {
    fn from(err: rusqlite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepReceipt {
    Applied { previous: LifecycleStage },
    AlreadyAt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRequest {
    pub application_id: EntityId,
    pub document_type: DocumentType,
    pub status: SignatureStatus,
    /// Application stage to move to in the same operation, if any.
    pub couple_to: Option<LifecycleStage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureReceipt {
    pub signature: DocumentSignature,
    pub previous_status: Option<SignatureStatus>,
    pub coupled: Option<StepReceipt>,
}

/// The named operations of the record store's validated call style.
pub trait TransitionPort: Send {
    /// Stable name for logs.
    fn name(&self) -> &'static str;

    /// Set a record's onboarding stage. Mirrors the change onto linked
    /// records where their vocabulary has the stage and they are behind.
    fn update_onboarding_step(
        &mut self,
        record: &RecordRef,
        stage: LifecycleStage,
        at: Timestamp,
    ) -> Result<StepReceipt, PortFailure>;

    /// Upsert the (application, document type) signature, and apply the
    /// coupled application step if requested, atomically.
    fn ensure_document_signature(
        &mut self,
        request: &SignatureRequest,
        at: Timestamp,
    ) -> Result<SignatureReceipt, PortFailure>;

    fn activate_investment(
        &mut self,
        investment_id: &str,
        at: Timestamp,
    ) -> Result<StepReceipt, PortFailure>;
}

// ── SQL implementation ─────────────────────────────────────────────

/// Named operations executed as immediate transactions on their own connection.
pub struct SqlTransitionPort {
    store: RecordStore,
}

impl SqlTransitionPort {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }
}

impl TransitionPort for SqlTransitionPort {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn update_onboarding_step(
        &mut self,
        record: &RecordRef,
        stage: LifecycleStage,
        at: Timestamp,
    ) -> Result<StepReceipt, PortFailure> {
        let tx = self.store.immediate_transaction()?;
        let receipt = step(&self.store, record, stage, at)?;
        tx.commit()?;
        Ok(receipt)
    }

    fn ensure_document_signature(
        &mut self,
        request: &SignatureRequest,
        at: Timestamp,
    ) -> Result<SignatureReceipt, PortFailure> {
        let tx = self.store.immediate_transaction()?;
        if self.store.get_application(&request.application_id)?.is_none() {
            return Err(PortFailure::Rejected(format!(
                "application '{}' does not exist",
                request.application_id
            )));
        }
        let previous_status = self
            .store
            .get_signature(&request.application_id, request.document_type)?
            .map(|s| s.status);
        let signature = self.store.upsert_signature(
            &request.application_id,
            request.document_type,
            request.status,
            at,
        )?;
        let coupled = match request.couple_to {
            Some(target) => Some(couple(&self.store, &request.application_id, target, at)?),
            None => None,
        };
        tx.commit()?;
        Ok(SignatureReceipt {
            signature,
            previous_status,
            coupled,
        })
    }

    fn activate_investment(
        &mut self,
        investment_id: &str,
        at: Timestamp,
    ) -> Result<StepReceipt, PortFailure> {
        let tx = self.store.immediate_transaction()?;
        let record = RecordRef::Investment(investment_id.to_string());
        let receipt = step(&self.store, &record, LifecycleStage::Active, at)?;
        tx.commit()?;
        Ok(receipt)
    }
}

/// Guarded status write plus mirroring. Caller owns the transaction.
fn step(
    store: &RecordStore,
    record: &RecordRef,
    stage: LifecycleStage,
    at: Timestamp,
) -> Result<StepReceipt, PortFailure> {
    let current = store
        .current_stage(record)?
        .ok_or_else(|| PortFailure::Rejected(format!("{record} does not exist")))?;
    match classify(current, stage) {
        Err(GuardViolation::NoOp) => return Ok(StepReceipt::AlreadyAt),
        Err(GuardViolation::Stale) => {
            return Err(PortFailure::Rejected(format!(
                "{record} is '{current}', cannot move to '{stage}'"
            )))
        }
        Ok(_) => {}
    }

    match record {
        RecordRef::Application(id) => {
            let status = ApplicationStatus::from_stage(stage).ok_or_else(|| {
                PortFailure::Rejected(format!("'{stage}' is not an application status"))
            })?;
            store.set_application_status(id, status, at)?;
            for investment in store.investments_for_application(id)? {
                mirror_onto_investment(store, &investment, stage, at)?;
            }
        }
        RecordRef::Investment(id) => {
            let status = InvestmentStatus::from_stage(stage).ok_or_else(|| {
                PortFailure::Rejected(format!("'{stage}' is not an investment status"))
            })?;
            store.set_investment_status(id, status, at)?;
            if !stage.is_exit() {
                if let Some(investment) = store.get_investment(id)? {
                    mirror_onto_application(store, &investment.application_id, stage, at)?;
                }
            }
        }
    }
    Ok(StepReceipt::Applied { previous: current })
}

/// Application exits cancel the investment; forward moves follow when the
/// investment is behind and has a label for the stage.
fn mirror_onto_investment(
    store: &RecordStore,
    investment: &Investment,
    stage: LifecycleStage,
    at: Timestamp,
) -> Result<(), PortFailure> {
    let mirrored = if stage.is_exit() {
        LifecycleStage::Cancelled
    } else {
        stage
    };
    let Some(status) = InvestmentStatus::from_stage(mirrored) else {
        return Ok(());
    };
    if classify(investment.status.stage(), mirrored).is_ok() {
        store.set_investment_status(&investment.id, status, at)?;
    }
    Ok(())
}

fn mirror_onto_application(
    store: &RecordStore,
    application_id: &str,
    stage: LifecycleStage,
    at: Timestamp,
) -> Result<(), PortFailure> {
    let Some(status) = ApplicationStatus::from_stage(stage) else {
        return Ok(());
    };
    let record = RecordRef::Application(application_id.to_string());
    let Some(current) = store.current_stage(&record)? else {
        return Ok(());
    };
    if classify(current, stage).is_ok() {
        store.set_application_status(application_id, status, at)?;
    }
    Ok(())
}

/// The application half of a coupled signature write.
/// Already at or beyond the target counts as done.
fn couple(
    store: &RecordStore,
    application_id: &str,
    target: LifecycleStage,
    at: Timestamp,
) -> Result<StepReceipt, PortFailure> {
    let record = RecordRef::Application(application_id.to_string());
    let current = store
        .current_stage(&record)?
        .ok_or_else(|| PortFailure::Rejected(format!("{record} does not exist")))?;
    if current.is_terminal() {
        return Err(PortFailure::Rejected(format!(
            "{record} is '{current}', cannot move to '{target}'"
        )));
    }
    if current.is_at_or_beyond(target) {
        return Ok(StepReceipt::AlreadyAt);
    }
    step(store, &record, target, at)
}

// ── Fault injection ────────────────────────────────────────────────

/// Wraps a port and fails a seeded fraction of calls before they reach it.
/// A rate of 1.0 models a named operation that is down entirely.
pub struct ChaosPort {
    inner: Box<dyn TransitionPort>,
    rng: SeededRng,
    fail_rate: f64,
    injected: u64,
}

impl ChaosPort {
    pub fn new(inner: Box<dyn TransitionPort>, seed: u64, fail_rate: f64) -> Self {
        Self {
            inner,
            rng: SeededRng::for_slot(seed, RngSlot::Chaos),
            fail_rate: fail_rate.clamp(0.0, 1.0),
            injected: 0,
        }
    }

    /// Number of calls failed so far.
    pub fn injected(&self) -> u64 {
        self.injected
    }

    fn roll(&mut self, operation: &'static str) -> Result<(), PortFailure> {
        if !self.rng.chance(self.fail_rate) {
            return Ok(());
        }
        self.injected += 1;
        let failure = match self.rng.next_u64_below(3) {
            0 => PortFailure::Missing(operation),
            1 => PortFailure::TimedOut { after_ms: 10_000 },
            _ => PortFailure::Transport(format!("{operation}: connection reset")),
        };
        log::debug!("chaos: failing {operation} ({failure})");
        Err(failure)
    }
}

impl TransitionPort for ChaosPort {
    fn name(&self) -> &'static str {
        "chaos"
    }

    fn update_onboarding_step(
        &mut self,
        record: &RecordRef,
        stage: LifecycleStage,
        at: Timestamp,
    ) -> Result<StepReceipt, PortFailure> {
        self.roll(UPDATE_ONBOARDING_STEP)?;
        self.inner.update_onboarding_step(record, stage, at)
    }

    fn ensure_document_signature(
        &mut self,
        request: &SignatureRequest,
        at: Timestamp,
    ) -> Result<SignatureReceipt, PortFailure> {
        self.roll(ENSURE_DOCUMENT_SIGNATURE)?;
        self.inner.ensure_document_signature(request, at)
    }

    fn activate_investment(
        &mut self,
        investment_id: &str,
        at: Timestamp,
    ) -> Result<StepReceipt, PortFailure> {
        self.roll(ACTIVATE_INVESTMENT)?;
        self.inner.activate_investment(investment_id, at)
    }
}
