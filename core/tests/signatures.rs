//! Document signature tests: natural-key upsert and the coupled status step.

mod common;

use chrono::Duration;
use common::*;
use onboarding_core::{
    config::OnboardingConfig,
    error::OnboardingError,
    event::NotificationType,
    lifecycle::{DocumentType, LifecycleStage, SignatureStatus},
    port::{ChaosPort, SqlTransitionPort},
    records::WritePath,
    transition::{SignatureOptions, TransitionOptions, TransitionOutcome},
};
use rusqlite::{Connection, OpenFlags};

fn sign(
    h: &mut Harness,
    application_id: &str,
    document_type: DocumentType,
    status: SignatureStatus,
) -> Result<onboarding_core::transition::SignatureOutcome, OnboardingError> {
    h.service
        .record_signature(application_id, document_type, status, &SignatureOptions::default())
}

/// Refuse every status write on applications, from a separate connection.
fn block_application_status_writes(h: &Harness) {
    let conn = Connection::open_with_flags(
        h.store.path(),
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
    )
    .unwrap();
    conn.execute_batch(
        "CREATE TRIGGER block_status BEFORE UPDATE OF status ON investment_applications
         BEGIN
             SELECT RAISE(ABORT, 'status writes blocked');
         END;",
    )
    .unwrap();
}

#[test]
fn promissory_note_signature_drives_application_to_bank_details() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");

    let outcome = sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::InvestorSigned).unwrap();

    assert_eq!(outcome.path, WritePath::Primary);
    assert_eq!(
        outcome.application,
        Some(TransitionOutcome::Applied {
            record: app_ref(&app),
            from: LifecycleStage::PromissoryNotePending,
            to: LifecycleStage::BankDetailsPending,
        })
    );
    assert_eq!(h.stage(&app_ref(&app)), LifecycleStage::BankDetailsPending);
    assert_eq!(h.delivered_of(NotificationType::DocumentSigned), 1);
}

#[test]
fn subscription_agreement_signature_marks_documents_signed() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");

    sign(&mut h, &app.id, DocumentType::SubscriptionAgreement, SignatureStatus::InvestorSigned).unwrap();
    assert_eq!(h.stage(&app_ref(&app)), LifecycleStage::DocumentsSigned);
}

#[test]
fn one_row_per_document_and_first_signing_time_is_kept() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");

    sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::Pending).unwrap();
    h.service.advance_clock(Duration::hours(2));
    let signed = sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::InvestorSigned).unwrap();
    h.service.advance_clock(Duration::days(3));
    let countersigned = sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::Signed).unwrap();

    let rows = h.store.signatures_for_application(&app.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, SignatureStatus::Signed);
    assert_eq!(rows[0].id, signed.signature.id);
    assert_eq!(countersigned.signature.signed_at, signed.signature.signed_at);
    assert_eq!(signed.signature.signed_at, Some(start_time() + Duration::hours(2)));
    assert!(countersigned.application.is_none());
}

#[test]
fn document_url_is_attached_to_the_existing_row() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");

    assert!(!h
        .store
        .set_document_url(&app.id, DocumentType::PromissoryNote, "https://sign.example/doc/1")
        .unwrap());
    sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::Pending).unwrap();
    assert!(h
        .store
        .set_document_url(&app.id, DocumentType::PromissoryNote, "https://sign.example/doc/1")
        .unwrap());

    let row = h.store.get_signature(&app.id, DocumentType::PromissoryNote).unwrap().unwrap();
    assert_eq!(row.document_url.as_deref(), Some("https://sign.example/doc/1"));
    assert!(row.signed_at.is_none());
}

#[test]
fn repeated_signing_announces_once() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");

    sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::InvestorSigned).unwrap();
    let again = sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::InvestorSigned).unwrap();

    assert!(again.application.is_none());
    assert_eq!(h.delivered_of(NotificationType::DocumentSigned), 1);
    assert_eq!(h.store.transitions_for(&app_ref(&app)).unwrap().len(), 1);
}

#[test]
fn auto_complete_can_be_turned_off_per_call() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");

    let outcome = h
        .service
        .record_signature(
            &app.id,
            DocumentType::PromissoryNote,
            SignatureStatus::InvestorSigned,
            &SignatureOptions {
                auto_complete: Some(false),
            },
        )
        .unwrap();

    assert!(outcome.application.is_none());
    assert_eq!(outcome.signature.status, SignatureStatus::InvestorSigned);
    assert_eq!(h.stage(&app_ref(&app)), LifecycleStage::PromissoryNotePending);
}

#[test]
fn application_already_past_the_coupled_stage_is_left_alone() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");
    h.service
        .apply_transition(&app_ref(&app), LifecycleStage::FundsPending, &TransitionOptions::default())
        .unwrap();

    let outcome = sign(&mut h, &app.id, DocumentType::SubscriptionAgreement, SignatureStatus::InvestorSigned).unwrap();

    assert!(outcome.application.is_none());
    assert_eq!(h.stage(&app_ref(&app)), LifecycleStage::FundsPending);
}

#[test]
fn terminal_application_refuses_the_coupled_step() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");
    h.service
        .apply_transition(&app_ref(&app), LifecycleStage::Cancelled, &TransitionOptions::default())
        .unwrap();

    let err = sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::InvestorSigned).unwrap_err();

    assert!(matches!(err, OnboardingError::StaleTransition { .. }));
    assert!(h
        .store
        .get_signature(&app.id, DocumentType::PromissoryNote)
        .unwrap()
        .is_none());
}

#[test]
fn unknown_application_is_not_found() {
    let mut h = harness();
    let err = sign(&mut h, "missing", DocumentType::PromissoryNote, SignatureStatus::Pending).unwrap_err();
    assert!(matches!(err, OnboardingError::RecordNotFound { .. }));
}

/// Both paths fail at the status write: the signature must not survive alone.
#[test]
fn failed_status_write_rolls_back_the_signature() {
    let mut h = harness();
    let app = submit(&mut h, "user-1");
    block_application_status_writes(&h);

    let err = sign(&mut h, &app.id, DocumentType::PromissoryNote, SignatureStatus::InvestorSigned).unwrap_err();

    assert!(matches!(err, OnboardingError::Persistence { .. }));
    assert!(h
        .store
        .get_signature(&app.id, DocumentType::PromissoryNote)
        .unwrap()
        .is_none());
    assert_eq!(h.stage(&app_ref(&app)), LifecycleStage::PromissoryNotePending);
    assert!(h.delivered().is_empty());
}

#[test]
fn failed_compensation_rolls_back_the_signature() {
    let mut h = harness_with(
        OnboardingConfig::default_test(),
        |store| {
            Box::new(ChaosPort::new(
                Box::new(SqlTransitionPort::new(store.reopen().unwrap())),
                11,
                1.0,
            ))
        },
        false,
    );
    let app = submit(&mut h, "user-1");
    block_application_status_writes(&h);

    let err = sign(&mut h, &app.id, DocumentType::SubscriptionAgreement, SignatureStatus::InvestorSigned).unwrap_err();

    assert!(matches!(err, OnboardingError::Persistence { .. }));
    assert!(h.store.signatures_for_application(&app.id).unwrap().is_empty());
}
