//! The canonical onboarding lifecycle and its two status views.
//!
//! RULE: every status decision is made on `LifecycleStage`.
//! `ApplicationStatus` and `InvestmentStatus` exist only to read and write
//! the exact strings each table persists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::OnboardingError;

/// One stage of the onboarding workflow, shared by applications and investments.
/// Declaration order is the canonical order for the ranked stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Pending,
    PendingApproval,
    PromissoryNotePending,
    PromissoryNoteSent,
    DocumentsSigned,
    BankDetailsPending,
    FundsPending,
    PlaidPending,
    InvestorOnboardingComplete,
    PendingActivation,
    Active,
    Completed,
    Cancelled,
    Rejected,
    Deleted,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 15] = [
        Self::Pending,
        Self::PendingApproval,
        Self::PromissoryNotePending,
        Self::PromissoryNoteSent,
        Self::DocumentsSigned,
        Self::BankDetailsPending,
        Self::FundsPending,
        Self::PlaidPending,
        Self::InvestorOnboardingComplete,
        Self::PendingActivation,
        Self::Active,
        Self::Completed,
        Self::Cancelled,
        Self::Rejected,
        Self::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PendingApproval => "pending_approval",
            Self::PromissoryNotePending => "promissory_note_pending",
            Self::PromissoryNoteSent => "promissory_note_sent",
            Self::DocumentsSigned => "documents_signed",
            Self::BankDetailsPending => "bank_details_pending",
            Self::FundsPending => "funds_pending",
            Self::PlaidPending => "plaid_pending",
            Self::InvestorOnboardingComplete => "investor_onboarding_complete",
            Self::PendingActivation => "pending_activation",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
        }
    }

    /// Position in the forward lifecycle. Exits have no rank.
    pub fn rank(&self) -> Option<u8> {
        let rank = match self {
            Self::Pending => 0,
            Self::PendingApproval => 1,
            Self::PromissoryNotePending => 2,
            Self::PromissoryNoteSent => 3,
            Self::DocumentsSigned => 4,
            Self::BankDetailsPending => 5,
            Self::FundsPending => 6,
            Self::PlaidPending => 7,
            Self::InvestorOnboardingComplete => 8,
            Self::PendingActivation => 9,
            Self::Active => 10,
            Self::Completed => 11,
            Self::Cancelled | Self::Rejected | Self::Deleted => return None,
        };
        Some(rank)
    }

    /// Cancelled, rejected and deleted leave the lifecycle from any live stage.
    pub fn is_exit(&self) -> bool {
        self.rank().is_none()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed) || self.is_exit()
    }

    /// True when `self` is the same stage as, or further along than, `other`.
    pub fn is_at_or_beyond(&self, other: LifecycleStage) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => *self == other,
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleStage {
    type Err = OnboardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| OnboardingError::UnknownStatus(s.to_string()))
    }
}

/// Rank of `funds_pending`: moves across it without stopping skip wire verification.
const WIRE_GATE_RANK: u8 = 6;

/// How a requested move relates to the current stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Forward move that keeps the wire-verification stages in the path.
    Advance,
    /// Forward move that jumps over `funds_pending`.
    FastTrack,
    /// Explicit cancellation.
    Cancel,
    /// Terminal completion, accepted from any live stage.
    Complete,
    /// Administrative exit (rejected / deleted).
    Exit,
}

/// Why a move was refused by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardViolation {
    /// Requested stage is the current stage.
    NoOp,
    /// Current stage is terminal, or the target is earlier in the lifecycle.
    Stale,
}

/// Classify a move from `current` to `target` under the ordering guard.
pub fn classify(
    current: LifecycleStage,
    target: LifecycleStage,
) -> Result<TransitionKind, GuardViolation> {
    if current == target {
        return Err(GuardViolation::NoOp);
    }
    if current.is_terminal() {
        return Err(GuardViolation::Stale);
    }
    match target {
        LifecycleStage::Cancelled => return Ok(TransitionKind::Cancel),
        LifecycleStage::Completed => return Ok(TransitionKind::Complete),
        LifecycleStage::Rejected | LifecycleStage::Deleted => return Ok(TransitionKind::Exit),
        _ => {}
    }
    let (Some(from), Some(to)) = (current.rank(), target.rank()) else {
        return Err(GuardViolation::Stale);
    };
    if to < from {
        return Err(GuardViolation::Stale);
    }
    if from < WIRE_GATE_RANK && to > WIRE_GATE_RANK {
        Ok(TransitionKind::FastTrack)
    } else {
        Ok(TransitionKind::Advance)
    }
}

// ── Views ──────────────────────────────────────────────────────────

macro_rules! status_view {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $label:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            pub fn stage(&self) -> LifecycleStage {
                match self {
                    $(Self::$variant => LifecycleStage::$variant),+
                }
            }

            /// Project a canonical stage into this view, if it has a label here.
            pub fn from_stage(stage: LifecycleStage) -> Option<Self> {
                match stage {
                    $(LifecycleStage::$variant => Some(Self::$variant),)+
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = OnboardingError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($label => Ok(Self::$variant),)+
                    other => Err(OnboardingError::UnknownStatus(other.to_string())),
                }
            }
        }
    };
}

status_view! {
    /// Status strings persisted on `investment_applications`.
    ApplicationStatus {
        PromissoryNotePending => "promissory_note_pending",
        DocumentsSigned => "documents_signed",
        BankDetailsPending => "bank_details_pending",
        FundsPending => "funds_pending",
        PlaidPending => "plaid_pending",
        Active => "active",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Deleted => "deleted",
    }
}

status_view! {
    /// Status strings persisted on `investments`.
    InvestmentStatus {
        Pending => "pending",
        PendingApproval => "pending_approval",
        PendingActivation => "pending_activation",
        PromissoryNotePending => "promissory_note_pending",
        PromissoryNoteSent => "promissory_note_sent",
        BankDetailsPending => "bank_details_pending",
        FundsPending => "funds_pending",
        PlaidPending => "plaid_pending",
        InvestorOnboardingComplete => "investor_onboarding_complete",
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
}

// ── Record vocabulary ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentFrequency {
    Monthly,
    Quarterly,
    Annual,
}

impl PaymentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
        }
    }

    /// Months covered by one payment.
    pub fn period_months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Annual => 12,
        }
    }
}

impl FromStr for PaymentFrequency {
    type Err = OnboardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "annual" => Ok(Self::Annual),
            other => Err(OnboardingError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PromissoryNote,
    SubscriptionAgreement,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromissoryNote => "promissory_note",
            Self::SubscriptionAgreement => "subscription_agreement",
        }
    }

    /// Application stage reached once the investor has signed this document.
    pub fn completes_to(&self) -> LifecycleStage {
        match self {
            Self::SubscriptionAgreement => LifecycleStage::DocumentsSigned,
            Self::PromissoryNote => LifecycleStage::BankDetailsPending,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PromissoryNote => "promissory note",
            Self::SubscriptionAgreement => "subscription agreement",
        }
    }
}

impl FromStr for DocumentType {
    type Err = OnboardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "promissory_note" => Ok(Self::PromissoryNote),
            "subscription_agreement" => Ok(Self::SubscriptionAgreement),
            other => Err(OnboardingError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Pending,
    InvestorSigned,
    Signed,
}

impl SignatureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InvestorSigned => "investor_signed",
            Self::Signed => "signed",
        }
    }

    pub fn is_signed(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for SignatureStatus {
    type Err = OnboardingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "investor_signed" => Ok(Self::InvestorSigned),
            "signed" => Ok(Self::Signed),
            other => Err(OnboardingError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_declaration_order() {
        let ranked: Vec<u8> = LifecycleStage::ALL.iter().filter_map(|s| s.rank()).collect();
        let mut sorted = ranked.clone();
        sorted.sort_unstable();
        assert_eq!(ranked, sorted);
        assert_eq!(ranked.len(), 12);
    }

    #[test]
    fn views_round_trip_through_stage() {
        for status in ["promissory_note_pending", "documents_signed", "deleted"] {
            let app: ApplicationStatus = status.parse().unwrap();
            assert_eq!(ApplicationStatus::from_stage(app.stage()), Some(app));
            assert_eq!(app.as_str(), status);
        }
        assert_eq!(InvestmentStatus::from_stage(LifecycleStage::DocumentsSigned), None);
        assert_eq!(ApplicationStatus::from_stage(LifecycleStage::PromissoryNoteSent), None);
    }

    #[test]
    fn cancellation_is_accepted_from_any_live_stage() {
        for stage in LifecycleStage::ALL.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(
                classify(*stage, LifecycleStage::Cancelled),
                Ok(TransitionKind::Cancel)
            );
        }
        assert_eq!(
            classify(LifecycleStage::Completed, LifecycleStage::Cancelled),
            Err(GuardViolation::Stale)
        );
    }

    #[test]
    fn completion_is_a_terminal_exit_not_a_fast_track() {
        for stage in LifecycleStage::ALL.iter().filter(|s| !s.is_terminal()) {
            assert_eq!(
                classify(*stage, LifecycleStage::Completed),
                Ok(TransitionKind::Complete)
            );
        }
        assert_eq!(
            classify(LifecycleStage::Cancelled, LifecycleStage::Completed),
            Err(GuardViolation::Stale)
        );
        assert_eq!(
            classify(LifecycleStage::Completed, LifecycleStage::Active),
            Err(GuardViolation::Stale)
        );
    }

    #[test]
    fn regression_is_stale() {
        assert_eq!(
            classify(LifecycleStage::FundsPending, LifecycleStage::BankDetailsPending),
            Err(GuardViolation::Stale)
        );
        assert_eq!(
            classify(LifecycleStage::Cancelled, LifecycleStage::Active),
            Err(GuardViolation::Stale)
        );
    }

    #[test]
    fn skipping_wire_verification_is_fast_track() {
        assert_eq!(
            classify(LifecycleStage::PromissoryNoteSent, LifecycleStage::PlaidPending),
            Ok(TransitionKind::FastTrack)
        );
        assert_eq!(
            classify(LifecycleStage::DocumentsSigned, LifecycleStage::PlaidPending),
            Ok(TransitionKind::FastTrack)
        );
        assert_eq!(
            classify(LifecycleStage::FundsPending, LifecycleStage::PlaidPending),
            Ok(TransitionKind::Advance)
        );
        assert_eq!(
            classify(LifecycleStage::PromissoryNotePending, LifecycleStage::BankDetailsPending),
            Ok(TransitionKind::Advance)
        );
    }
}
