//! Outbound notification events.
//!
//! RULE: the transition engine never delivers anything itself.
//! It builds a `NotificationEvent` and hands it to the outbox;
//! delivery belongs to the dispatcher.

use serde::{Deserialize, Serialize};

use crate::{
    lifecycle::{DocumentType, LifecycleStage},
    types::EntityId,
};

/// Every notification the workflow emits.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    DocumentSigned,
    WireConfirmed,
    BankConnected,
    InvestmentActivated,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentSigned => "document_signed",
            Self::WireConfirmed => "wire_confirmed",
            Self::BankConnected => "bank_connected",
            Self::InvestmentActivated => "investment_activated",
        }
    }

    pub fn audience(&self) -> Audience {
        match self {
            Self::InvestmentActivated => Audience::Investor,
            _ => Audience::Admin,
        }
    }

    /// The notification a status change announces, if any.
    pub fn for_stage(stage: LifecycleStage) -> Option<Self> {
        match stage {
            LifecycleStage::PlaidPending => Some(Self::WireConfirmed),
            LifecycleStage::InvestorOnboardingComplete => Some(Self::BankConnected),
            LifecycleStage::Active => Some(Self::InvestmentActivated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Admin,
    Investor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub notification_type: NotificationType,
    pub message: String,
    /// The application the event is about.
    pub correlation_id: EntityId,
    pub audience: Audience,
}

impl NotificationEvent {
    pub fn new(notification_type: NotificationType, correlation_id: EntityId, message: String) -> Self {
        Self {
            audience: notification_type.audience(),
            notification_type,
            message,
            correlation_id,
        }
    }

    pub fn document_signed(application_id: &str, document_type: DocumentType) -> Self {
        Self::new(
            NotificationType::DocumentSigned,
            application_id.to_string(),
            format!(
                "Investor signed the {} for application {application_id}",
                document_type.label()
            ),
        )
    }

    /// Build the event announcing `stage`, if that stage is announced.
    pub fn for_stage(application_id: &str, stage: LifecycleStage) -> Option<Self> {
        let notification_type = NotificationType::for_stage(stage)?;
        let message = match notification_type {
            NotificationType::WireConfirmed => {
                format!("Wire transfer confirmed for application {application_id}")
            }
            NotificationType::BankConnected => {
                format!("Investor connected a bank account for application {application_id}")
            }
            NotificationType::InvestmentActivated => {
                format!("Your investment for application {application_id} is now active")
            }
            NotificationType::DocumentSigned => return None,
        };
        Some(Self::new(notification_type, application_id.to_string(), message))
    }

    /// The wire payload posted to the notification endpoint.
    pub fn payload(&self) -> NotificationPayload<'_> {
        NotificationPayload {
            application_id: &self.correlation_id,
            notification_type: self.notification_type.as_str(),
            message: &self.message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload<'a> {
    pub application_id: &'a str,
    pub notification_type: &'static str,
    pub message: &'a str,
}
