//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{NaiveDate, TimeZone, Utc};
use onboarding_core::{
    clock::Clock,
    config::OnboardingConfig,
    error::OnboardingResult,
    event::{NotificationEvent, NotificationType},
    lifecycle::{LifecycleStage, PaymentFrequency},
    notify::{NotificationChannel, NotificationDispatcher},
    port::{SqlTransitionPort, TransitionPort},
    records::{Investment, InvestmentApplication, NewApplication, RecordRef},
    service::OnboardingService,
    store::RecordStore,
    transition::TransitionOptions,
    types::Timestamp,
};
use std::sync::{Arc, Mutex};

/// Captures every delivered event; optionally fails every delivery.
pub struct RecordingChannel {
    pub events: Arc<Mutex<Vec<NotificationEvent>>>,
    pub fail: bool,
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn deliver(&mut self, event: &NotificationEvent) -> OnboardingResult<()> {
        if self.fail {
            return Err(onboarding_core::error::OnboardingError::Notification(
                "endpoint unreachable".into(),
            ));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub service: OnboardingService,
    pub dispatcher: NotificationDispatcher,
    pub store: RecordStore,
    pub events: Arc<Mutex<Vec<NotificationEvent>>>,
}

impl Harness {
    /// Deliver everything queued and return what the channel has seen.
    pub fn delivered(&mut self) -> Vec<NotificationEvent> {
        self.dispatcher.drain();
        self.events.lock().unwrap().clone()
    }

    pub fn delivered_of(&mut self, kind: NotificationType) -> usize {
        self.delivered()
            .iter()
            .filter(|e| e.notification_type == kind)
            .count()
    }

    pub fn stage(&self, record: &RecordRef) -> LifecycleStage {
        self.store.current_stage(record).unwrap().unwrap()
    }
}

pub fn start_time() -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn harness() -> Harness {
    harness_with(OnboardingConfig::default_test(), |store| {
        Box::new(SqlTransitionPort::new(store.reopen().unwrap()))
    }, false)
}

pub fn harness_with(
    config: OnboardingConfig,
    port: impl FnOnce(&RecordStore) -> Box<dyn TransitionPort>,
    fail_delivery: bool,
) -> Harness {
    let store = RecordStore::in_memory().unwrap();
    store.migrate().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let channel = Box::new(RecordingChannel {
        events: Arc::clone(&events),
        fail: fail_delivery,
    });
    let port = port(&store);
    let (service, dispatcher) = OnboardingService::with_parts(
        config,
        &store,
        Clock::fixed(start_time()),
        port,
        channel,
    )
    .unwrap();
    Harness {
        service,
        dispatcher,
        store,
        events,
    }
}

pub fn submit(h: &mut Harness, user_id: &str) -> InvestmentApplication {
    h.service
        .submit_application(NewApplication {
            user_id: user_id.into(),
            amount: 50_000.0,
            annual_rate: 12.0,
            payment_frequency: PaymentFrequency::Monthly,
            term_months: 24,
        })
        .unwrap()
}

pub fn app_ref(app: &InvestmentApplication) -> RecordRef {
    RecordRef::Application(app.id.clone())
}

pub fn inv_ref(inv: &Investment) -> RecordRef {
    RecordRef::Investment(inv.id.clone())
}

/// Fund the application on 2024-01-01 and walk it to `active` without fast-tracking.
pub fn activate(h: &mut Harness, app: &InvestmentApplication) -> Investment {
    let plain = TransitionOptions::default();
    let inv = h.service.fund_application(&app.id, date(2024, 1, 1)).unwrap();
    let a = app_ref(app);
    let i = inv_ref(&inv);
    h.service.apply_transition(&a, LifecycleStage::FundsPending, &plain).unwrap();
    h.service.apply_transition(&a, LifecycleStage::PlaidPending, &plain).unwrap();
    h.service
        .apply_transition(&i, LifecycleStage::InvestorOnboardingComplete, &plain)
        .unwrap();
    h.service.apply_transition(&i, LifecycleStage::Active, &plain).unwrap();
    inv
}
