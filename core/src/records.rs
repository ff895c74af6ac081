//! Stored record shapes for applications, investments and signatures.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{
    lifecycle::{
        ApplicationStatus, DocumentType, InvestmentStatus, LifecycleStage, PaymentFrequency,
        SignatureStatus,
    },
    types::{EntityId, Timestamp, UserId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Application,
    Investment,
}

impl RecordKind {
    /// Table the record lives in.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Application => "investment_applications",
            Self::Investment => "investments",
        }
    }

    /// The persisted label of `stage` for this kind of record, if it has one.
    pub fn label_for(&self, stage: LifecycleStage) -> Option<&'static str> {
        match self {
            Self::Application => ApplicationStatus::from_stage(stage).map(|s| s.as_str()),
            Self::Investment => InvestmentStatus::from_stage(stage).map(|s| s.as_str()),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => f.write_str("application"),
            Self::Investment => f.write_str("investment"),
        }
    }
}

/// A reference to one status-bearing record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordRef {
    Application(EntityId),
    Investment(EntityId),
}

impl RecordRef {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Application(_) => RecordKind::Application,
            Self::Investment(_) => RecordKind::Investment,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Application(id) | Self::Investment(id) => id,
        }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentApplication {
    pub id: EntityId,
    pub user_id: UserId,
    pub amount: f64,
    pub annual_rate: f64,
    pub payment_frequency: PaymentFrequency,
    pub term_months: u32,
    pub status: ApplicationStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The investor-supplied part of an application, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewApplication {
    pub user_id: UserId,
    pub amount: f64,
    pub annual_rate: f64,
    pub payment_frequency: PaymentFrequency,
    pub term_months: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investment {
    pub id: EntityId,
    pub application_id: EntityId,
    pub user_id: UserId,
    pub amount: f64,
    pub annual_rate: f64,
    pub payment_frequency: PaymentFrequency,
    pub term_months: u32,
    pub start_date: NaiveDate,
    pub status: InvestmentStatus,
    pub total_expected_return: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// An investment joined with the status of the application it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentWithApplication {
    pub investment: Investment,
    pub application_status: ApplicationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSignature {
    pub id: EntityId,
    pub application_id: EntityId,
    pub document_type: DocumentType,
    pub status: SignatureStatus,
    pub signed_at: Option<Timestamp>,
    pub document_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One applied status change, as kept in `transition_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionLogEntry {
    pub id: Option<i64>,
    pub record: RecordRef,
    pub from_status: LifecycleStage,
    pub to_status: LifecycleStage,
    pub path: WritePath,
    pub created_at: Timestamp,
}

/// Which access style persisted a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePath {
    Primary,
    Compensation,
}

impl WritePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Compensation => "compensation",
        }
    }
}
