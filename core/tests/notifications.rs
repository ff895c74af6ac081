//! Notification tests: delivery failures never reach the transition caller.

mod common;

use common::*;
use onboarding_core::{
    config::OnboardingConfig,
    event::{Audience, NotificationEvent, NotificationType},
    lifecycle::{DocumentType, LifecycleStage},
    notify::{channel_for, outbox, HttpChannel, NotificationChannel},
    port::SqlTransitionPort,
    transition::TransitionOptions,
};
use std::sync::{Arc, Mutex};
use std::thread;

fn wire_confirmed_outcome(fail_delivery: bool) -> (Harness, onboarding_core::transition::TransitionOutcome) {
    let mut h = harness_with(
        OnboardingConfig::default_test(),
        |store| Box::new(SqlTransitionPort::new(store.reopen().unwrap())),
        fail_delivery,
    );
    let app = submit(&mut h, "user-1");
    let a = app_ref(&app);
    let plain = TransitionOptions::default();
    h.service.apply_transition(&a, LifecycleStage::FundsPending, &plain).unwrap();
    let outcome = h.service.apply_transition(&a, LifecycleStage::PlaidPending, &plain).unwrap();
    (h, outcome)
}

#[test]
fn failing_delivery_does_not_change_the_outcome() {
    let (mut ok, ok_outcome) = wire_confirmed_outcome(false);
    let (mut broken, broken_outcome) = wire_confirmed_outcome(true);

    assert_eq!(ok_outcome.stage(), broken_outcome.stage());
    assert_eq!(ok_outcome.is_change(), broken_outcome.is_change());

    assert_eq!(ok.dispatcher.drain(), 1);
    assert_eq!(broken.dispatcher.drain(), 1);
    assert_eq!(ok.dispatcher.stats().delivered, 1);
    assert_eq!(broken.dispatcher.stats().failed, 1);
    assert_eq!(broken.dispatcher.stats().delivered, 0);
    assert!(broken.events.lock().unwrap().is_empty());
}

#[test]
fn events_carry_type_audience_and_correlation() {
    let (mut h, _) = wire_confirmed_outcome(false);
    let events = h.delivered();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].notification_type, NotificationType::WireConfirmed);
    assert_eq!(events[0].audience, Audience::Admin);
    assert!(events[0].message.contains(&events[0].correlation_id));
}

#[test]
fn payload_uses_the_endpoint_field_names() {
    let event = NotificationEvent::document_signed("app-9", DocumentType::PromissoryNote);
    let json = serde_json::to_value(event.payload()).unwrap();

    assert_eq!(json["applicationId"], "app-9");
    assert_eq!(json["notificationType"], "document_signed");
    assert!(json["message"].as_str().unwrap().contains("promissory note"));
    assert_eq!(json.as_object().unwrap().len(), 3);
}

/// Delivery is allowed to repeat; every attempt stands alone.
#[test]
fn firing_the_same_event_twice_is_safe() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let (_outbox, mut dispatcher) = outbox(Box::new(RecordingChannel {
        events: Arc::clone(&events),
        fail: false,
    }));
    let event = NotificationEvent::for_stage("app-1", LifecycleStage::InvestorOnboardingComplete).unwrap();

    assert!(dispatcher.fire(&event));
    assert!(dispatcher.fire(&event));
    assert_eq!(events.lock().unwrap().len(), 2);
    assert_eq!(dispatcher.stats().delivered, 2);
}

#[test]
fn dispatcher_thread_finishes_when_outboxes_close() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let (tx, dispatcher) = outbox(Box::new(RecordingChannel {
        events: Arc::clone(&events),
        fail: false,
    }));
    let worker = thread::spawn(move || dispatcher.run());

    let second = tx.clone();
    tx.enqueue(NotificationEvent::for_stage("app-1", LifecycleStage::PlaidPending).unwrap());
    second.enqueue(NotificationEvent::for_stage("app-2", LifecycleStage::Active).unwrap());
    drop(tx);
    drop(second);

    let stats = worker.join().unwrap();
    assert_eq!(stats.delivered, 2);
    assert_eq!(events.lock().unwrap().len(), 2);
}

#[test]
fn enqueue_after_dispatcher_is_gone_is_harmless() {
    let (tx, dispatcher) = outbox(Box::new(RecordingChannel {
        events: Arc::new(Mutex::new(Vec::new())),
        fail: false,
    }));
    drop(dispatcher);
    tx.enqueue(NotificationEvent::for_stage("app-1", LifecycleStage::PlaidPending).unwrap());
}

#[test]
fn unannounced_stages_build_no_event() {
    assert!(NotificationEvent::for_stage("app-1", LifecycleStage::FundsPending).is_none());
    assert!(NotificationEvent::for_stage("app-1", LifecycleStage::Cancelled).is_none());
}

#[test]
fn channel_follows_config() {
    let mut config = OnboardingConfig::default_test();
    assert_eq!(channel_for(&config.notifications).name(), "log");

    config.notifications.endpoint = Some("http://127.0.0.1:9/notify".into());
    assert_eq!(channel_for(&config.notifications).name(), "http");

    config.notifications.enabled = false;
    assert_eq!(channel_for(&config.notifications).name(), "discard");
}

#[test]
fn unreachable_endpoint_is_a_notification_error() {
    let mut channel = HttpChannel::new("http://127.0.0.1:9/notify".into(), Some("t0ken".into()), 200, 200);
    let event = NotificationEvent::for_stage("app-1", LifecycleStage::PlaidPending).unwrap();

    let err = channel.deliver(&event).unwrap_err();
    assert!(matches!(err, onboarding_core::error::OnboardingError::Notification(_)));
}
