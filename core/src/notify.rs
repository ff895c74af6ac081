//! Best-effort notification delivery.
//!
//! The transition engine only ever holds a `NotificationOutbox`.
//! Events flow through a channel to the `NotificationDispatcher`, which
//! can be drained inline or run on its own thread. A failed delivery is
//! logged and counted: never retried, never reported to the caller whose
//! transition produced the event.

use serde::Serialize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use crate::{
    config::NotificationConfig,
    error::{OnboardingError, OnboardingResult},
    event::NotificationEvent,
};

/// A delivery transport.
pub trait NotificationChannel: Send {
    fn name(&self) -> &'static str;

    fn deliver(&mut self, event: &NotificationEvent) -> OnboardingResult<()>;
}

/// Build the channel described by the config.
pub fn channel_for(config: &NotificationConfig) -> Box<dyn NotificationChannel> {
    if !config.enabled {
        return Box::new(DiscardChannel);
    }
    match &config.endpoint {
        Some(endpoint) => Box::new(HttpChannel::new(
            endpoint.clone(),
            config.bearer_token.clone(),
            config.connect_timeout_ms,
            config.request_timeout_ms,
        )),
        None => Box::new(LogChannel),
    }
}

/// Posts the JSON payload to an HTTP endpoint.
pub struct HttpChannel {
    endpoint: String,
    bearer_token: Option<String>,
    agent: ureq::Agent,
}

impl HttpChannel {
    pub fn new(
        endpoint: String,
        bearer_token: Option<String>,
        connect_timeout_ms: u64,
        request_timeout_ms: u64,
    ) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(connect_timeout_ms))
            .timeout_read(Duration::from_millis(request_timeout_ms))
            .timeout_write(Duration::from_millis(request_timeout_ms))
            .build();
        Self {
            endpoint,
            bearer_token,
            agent,
        }
    }
}

impl NotificationChannel for HttpChannel {
    fn name(&self) -> &'static str {
        "http"
    }

    fn deliver(&mut self, event: &NotificationEvent) -> OnboardingResult<()> {
        let body = serde_json::to_string(&event.payload())?;
        let mut req = self
            .agent
            .post(&self.endpoint)
            .set("content-type", "application/json");
        if let Some(token) = self.bearer_token.as_ref() {
            req = req.set("authorization", &format!("Bearer {token}"));
        }
        match req.send_string(&body) {
            Ok(resp) if (200..=299).contains(&resp.status()) => Ok(()),
            Ok(resp) => Err(OnboardingError::Notification(format!(
                "endpoint answered http status {}",
                resp.status()
            ))),
            Err(ureq::Error::Status(code, _)) => Err(OnboardingError::Notification(format!(
                "endpoint answered http status {code}"
            ))),
            Err(ureq::Error::Transport(err)) => Err(OnboardingError::Notification(format!(
                "transport error: {err}"
            ))),
        }
    }
}

/// Writes events to the log. Used when no endpoint is configured.
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&mut self, event: &NotificationEvent) -> OnboardingResult<()> {
        log::info!(
            "notify {:?} [{}] {}: {}",
            event.audience,
            event.correlation_id,
            event.notification_type.as_str(),
            event.message
        );
        Ok(())
    }
}

/// Notifications switched off.
pub struct DiscardChannel;

impl NotificationChannel for DiscardChannel {
    fn name(&self) -> &'static str {
        "discard"
    }

    fn deliver(&mut self, event: &NotificationEvent) -> OnboardingResult<()> {
        log::debug!(
            "notifications disabled; dropping {} for {}",
            event.notification_type.as_str(),
            event.correlation_id
        );
        Ok(())
    }
}

// ── Outbox / dispatcher ────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Producer side. Cheap to clone; enqueueing never fails the caller.
#[derive(Clone)]
pub struct NotificationOutbox {
    tx: Sender<NotificationEvent>,
}

impl NotificationOutbox {
    pub fn enqueue(&self, event: NotificationEvent) {
        if let Err(mpsc::SendError(event)) = self.tx.send(event) {
            log::warn!(
                "notification dispatcher gone; dropping {} for {}",
                event.notification_type.as_str(),
                event.correlation_id
            );
        }
    }
}

/// Consumer side: owns the channel and the delivery counters.
pub struct NotificationDispatcher {
    rx: Receiver<NotificationEvent>,
    channel: Box<dyn NotificationChannel>,
    stats: DeliveryStats,
}

/// Create a connected outbox / dispatcher pair.
pub fn outbox(channel: Box<dyn NotificationChannel>) -> (NotificationOutbox, NotificationDispatcher) {
    let (tx, rx) = mpsc::channel();
    (
        NotificationOutbox { tx },
        NotificationDispatcher {
            rx,
            channel,
            stats: DeliveryStats::default(),
        },
    )
}

impl NotificationDispatcher {
    /// One delivery attempt. Returns whether it landed; never errors.
    pub fn fire(&mut self, event: &NotificationEvent) -> bool {
        match self.channel.deliver(event) {
            Ok(()) => {
                self.stats.delivered += 1;
                true
            }
            Err(e) => {
                self.stats.failed += 1;
                log::warn!(
                    "notification {} for {} via {} failed: {e}",
                    event.notification_type.as_str(),
                    event.correlation_id,
                    self.channel.name()
                );
                false
            }
        }
    }

    /// Deliver everything queued so far. Returns the number of events taken.
    pub fn drain(&mut self) -> usize {
        let mut taken = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.fire(&event);
            taken += 1;
        }
        taken
    }

    /// Deliver until every outbox has been dropped. Meant for a dedicated thread.
    pub fn run(mut self) -> DeliveryStats {
        while let Ok(event) = self.rx.recv() {
            self.fire(&event);
        }
        self.stats
    }

    pub fn stats(&self) -> DeliveryStats {
        self.stats
    }
}
