//! The status transition engine.
//!
//! ORDER OF WORK (fixed, for every request):
//!   1. Validate the request. Nothing is read or written on failure.
//!   2. Read the current stage. Unknown id → RecordNotFound.
//!   3. Ordering guard: same stage is a no-op, regressions are stale,
//!      fast-track must be asked for.
//!   4. Primary path: the named operation on the TransitionPort.
//!   5. Primary failure → direct conditional write (compensation).
//!   6. Changes are logged and announced on the notification outbox.
//!
//! RULES:
//!   - The engine is the only writer of `status`.
//!   - A notification is enqueued only for a change that was persisted,
//!     so replaying a request never announces twice.
//!   - Nothing after step 5 can fail the request.

use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    config::WorkflowConfig,
    error::{OnboardingError, OnboardingResult},
    event::NotificationEvent,
    lifecycle::{classify, DocumentType, GuardViolation, LifecycleStage, SignatureStatus, TransitionKind},
    notify::NotificationOutbox,
    port::{
        PortFailure, SignatureRequest, StepReceipt, TransitionPort, ACTIVATE_INVESTMENT,
        ENSURE_DOCUMENT_SIGNATURE, UPDATE_ONBOARDING_STEP,
    },
    records::{DocumentSignature, RecordRef, TransitionLogEntry, WritePath},
    store::RecordStore,
    types::Timestamp,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitionOptions {
    /// Ask for the named fast-track move that skips wire verification.
    #[serde(default)]
    pub fast_track: bool,
    /// Accepted for forward compatibility; not forwarded anywhere today.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl TransitionOptions {
    pub fn fast_track() -> Self {
        Self {
            fast_track: true,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SignatureOptions {
    /// Override `workflow.auto_complete_signatures` for this call.
    pub auto_complete: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Written through the named operation.
    Applied {
        record: RecordRef,
        from: LifecycleStage,
        to: LifecycleStage,
    },
    /// Already at the requested stage. Nothing written.
    Unchanged {
        record: RecordRef,
        stage: LifecycleStage,
    },
    /// Named operation failed; written by compensation.
    Degraded {
        record: RecordRef,
        from: LifecycleStage,
        to: LifecycleStage,
        cause: String,
    },
}

impl TransitionOutcome {
    pub fn record(&self) -> &RecordRef {
        match self {
            Self::Applied { record, .. }
            | Self::Unchanged { record, .. }
            | Self::Degraded { record, .. } => record,
        }
    }

    /// Stage the record is at after the call.
    pub fn stage(&self) -> LifecycleStage {
        match self {
            Self::Applied { to, .. } | Self::Degraded { to, .. } => *to,
            Self::Unchanged { stage, .. } => *stage,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged { .. })
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignatureOutcome {
    pub signature: DocumentSignature,
    pub path: WritePath,
    /// The coupled application step, when one was requested.
    pub application: Option<TransitionOutcome>,
}

pub struct TransitionEngine {
    store: RecordStore,
    port: Box<dyn TransitionPort>,
    outbox: NotificationOutbox,
    workflow: WorkflowConfig,
    clock: Clock,
}

impl TransitionEngine {
    pub fn new(
        store: RecordStore,
        port: Box<dyn TransitionPort>,
        outbox: NotificationOutbox,
        workflow: WorkflowConfig,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            port,
            outbox,
            workflow,
            clock,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Move `record` to `target`. See the module docs for the order of work.
    pub fn apply_transition(
        &mut self,
        record: &RecordRef,
        target: LifecycleStage,
        options: &TransitionOptions,
    ) -> OnboardingResult<TransitionOutcome> {
        require_id(record.id())?;
        if record.kind().label_for(target).is_none() {
            return Err(OnboardingError::Validation(format!(
                "'{target}' is not a {} status",
                record.kind()
            )));
        }

        let current = self.current_stage(record)?;
        let kind = match classify(current, target) {
            Err(GuardViolation::NoOp) => {
                log::debug!("{record} already '{target}'; nothing to do");
                return Ok(TransitionOutcome::Unchanged {
                    record: record.clone(),
                    stage: current,
                });
            }
            Err(GuardViolation::Stale) => {
                return Err(OnboardingError::StaleTransition {
                    record: record.clone(),
                    current,
                    requested: target,
                })
            }
            Ok(kind) => kind,
        };
        if kind == TransitionKind::FastTrack {
            if !options.fast_track {
                return Err(OnboardingError::Validation(format!(
                    "{record}: '{current}' → '{target}' skips wire verification; request a fast-track transition"
                )));
            }
            if !self.workflow.allow_fast_track {
                return Err(OnboardingError::Validation(
                    "fast-track transitions are disabled".into(),
                ));
            }
        }
        if options.metadata.is_some() {
            log::debug!("{record}: transition metadata accepted but not forwarded");
        }

        let now = self.clock.now();
        let (operation, primary) = match (record, target) {
            (RecordRef::Investment(id), LifecycleStage::Active) => {
                (ACTIVATE_INVESTMENT, self.port.activate_investment(id, now))
            }
            _ => (
                UPDATE_ONBOARDING_STEP,
                self.port.update_onboarding_step(record, target, now),
            ),
        };

        let outcome = match primary {
            Ok(StepReceipt::AlreadyAt) => TransitionOutcome::Unchanged {
                record: record.clone(),
                stage: target,
            },
            Ok(StepReceipt::Applied { previous }) => TransitionOutcome::Applied {
                record: record.clone(),
                from: previous,
                to: target,
            },
            Err(failure) => self.compensate(record, operation, failure, current, target, now)?,
        };

        if outcome.is_change() {
            self.after_change(&outcome, now);
        }
        Ok(outcome)
    }

    /// Upsert a signature; on `investor_signed`, optionally step the
    /// application in the same atomic write.
    pub fn record_signature(
        &mut self,
        application_id: &str,
        document_type: DocumentType,
        status: SignatureStatus,
        options: &SignatureOptions,
    ) -> OnboardingResult<SignatureOutcome> {
        require_id(application_id)?;
        let record = RecordRef::Application(application_id.to_string());
        let current = self.current_stage(&record)?;

        let auto_complete = options
            .auto_complete
            .unwrap_or(self.workflow.auto_complete_signatures);
        let couple_to = if status == SignatureStatus::InvestorSigned && auto_complete {
            let target = document_type.completes_to();
            if current.is_terminal() {
                return Err(OnboardingError::StaleTransition {
                    record,
                    current,
                    requested: target,
                });
            }
            (!current.is_at_or_beyond(target)).then_some(target)
        } else {
            None
        };

        let request = SignatureRequest {
            application_id: application_id.to_string(),
            document_type,
            status,
            couple_to,
        };
        let now = self.clock.now();

        let (receipt, failure) = match self.port.ensure_document_signature(&request, now) {
            Ok(receipt) => (receipt, None),
            Err(failure) => {
                if !self.workflow.compensate_on_remote_failure {
                    return Err(OnboardingError::RemoteOperation {
                        operation: ENSURE_DOCUMENT_SIGNATURE,
                        source: failure,
                    });
                }
                log::warn!(
                    "{ENSURE_DOCUMENT_SIGNATURE} failed for {record} ({failure}); writing signature directly"
                );
                let receipt = self
                    .store
                    .compensate_signature(&request, now)
                    .map_err(|e| match e {
                        e @ (OnboardingError::Persistence { .. }
                        | OnboardingError::StaleTransition { .. }
                        | OnboardingError::RecordNotFound { .. }) => e,
                        other => OnboardingError::Persistence {
                            record: record.clone(),
                            reason: format!(
                                "{ENSURE_DOCUMENT_SIGNATURE} failed ({failure}); direct write failed: {other}"
                            ),
                        },
                    })?;
                (receipt, Some(failure))
            }
        };

        let application = match (couple_to, receipt.coupled) {
            (Some(to), Some(StepReceipt::Applied { previous })) => Some(match &failure {
                None => TransitionOutcome::Applied {
                    record: record.clone(),
                    from: previous,
                    to,
                },
                Some(failure) => TransitionOutcome::Degraded {
                    record: record.clone(),
                    from: previous,
                    to,
                    cause: failure.to_string(),
                },
            }),
            (Some(to), Some(StepReceipt::AlreadyAt)) => Some(TransitionOutcome::Unchanged {
                record: record.clone(),
                stage: to,
            }),
            _ => None,
        };
        let path = if failure.is_some() {
            WritePath::Compensation
        } else {
            WritePath::Primary
        };

        if let Some(outcome) = application.as_ref().filter(|o| o.is_change()) {
            self.after_change(outcome, now);
        }
        if status == SignatureStatus::InvestorSigned
            && receipt.previous_status != Some(SignatureStatus::InvestorSigned)
        {
            self.outbox
                .enqueue(NotificationEvent::document_signed(application_id, document_type));
        }

        Ok(SignatureOutcome {
            signature: receipt.signature,
            path,
            application,
        })
    }

    fn current_stage(&self, record: &RecordRef) -> OnboardingResult<LifecycleStage> {
        self.store
            .current_stage(record)?
            .ok_or_else(|| OnboardingError::RecordNotFound {
                kind: record.kind(),
                id: record.id().to_string(),
            })
    }

    fn compensate(
        &self,
        record: &RecordRef,
        operation: &'static str,
        failure: PortFailure,
        current: LifecycleStage,
        target: LifecycleStage,
        now: Timestamp,
    ) -> OnboardingResult<TransitionOutcome> {
        if !self.workflow.compensate_on_remote_failure {
            return Err(OnboardingError::RemoteOperation {
                operation,
                source: failure,
            });
        }
        log::warn!("{operation} failed for {record} ({failure}); writing '{target}' directly");

        match self.store.write_status_direct(record, current, target, now) {
            Ok(true) => Ok(TransitionOutcome::Degraded {
                record: record.clone(),
                from: current,
                to: target,
                cause: failure.to_string(),
            }),
            // Lost a race: somebody moved the record after our read.
            Ok(false) => match self.store.current_stage(record) {
                Ok(Some(stage)) if stage == target => Ok(TransitionOutcome::Unchanged {
                    record: record.clone(),
                    stage,
                }),
                Ok(Some(stage)) => Err(OnboardingError::StaleTransition {
                    record: record.clone(),
                    current: stage,
                    requested: target,
                }),
                Ok(None) => Err(OnboardingError::RecordNotFound {
                    kind: record.kind(),
                    id: record.id().to_string(),
                }),
                Err(e) => Err(OnboardingError::Persistence {
                    record: record.clone(),
                    reason: format!("{operation} failed ({failure}); re-read failed: {e}"),
                }),
            },
            Err(e) => Err(OnboardingError::Persistence {
                record: record.clone(),
                reason: format!("{operation} failed ({failure}); direct write failed: {e}"),
            }),
        }
    }

    /// Transition log and notification for a persisted change.
    /// Failures here are logged only: the change itself already stands.
    fn after_change(&self, outcome: &TransitionOutcome, now: Timestamp) {
        let (record, from, to, path) = match outcome {
            TransitionOutcome::Applied { record, from, to } => (record, *from, *to, WritePath::Primary),
            TransitionOutcome::Degraded { record, from, to, .. } => {
                (record, *from, *to, WritePath::Compensation)
            }
            TransitionOutcome::Unchanged { .. } => return,
        };
        log::info!("{record}: '{from}' → '{to}' ({})", path.as_str());

        let entry = TransitionLogEntry {
            id: None,
            record: record.clone(),
            from_status: from,
            to_status: to,
            path,
            created_at: now,
        };
        if let Err(e) = self.store.append_transition(&entry) {
            log::warn!("{record}: transition log append failed: {e}");
        }

        let application_id = match record {
            RecordRef::Application(id) => Some(id.clone()),
            RecordRef::Investment(id) => match self.store.get_investment(id) {
                Ok(found) => found.map(|inv| inv.application_id),
                Err(e) => {
                    log::warn!("{record}: cannot resolve application for notification: {e}");
                    None
                }
            },
        };
        if let Some(event) = application_id.and_then(|id| NotificationEvent::for_stage(&id, to)) {
            self.outbox.enqueue(event);
        }
    }
}

fn require_id(id: &str) -> OnboardingResult<()> {
    if id.trim().is_empty() {
        return Err(OnboardingError::Validation("record id is empty".into()));
    }
    Ok(())
}
