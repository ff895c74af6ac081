//! Shared primitive types used across the onboarding core.

use chrono::{DateTime, Utc};

/// A stable, unique identifier for any stored record.
pub type EntityId = String;

/// The owning investor's identity, as issued by the auth collaborator.
pub type UserId = String;

/// Every persisted timestamp is UTC.
pub type Timestamp = DateTime<Utc>;
