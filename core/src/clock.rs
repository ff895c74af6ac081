//! Workflow clock: the single source of `updated_at` timestamps.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", content = "at", rename_all = "snake_case")]
pub enum Clock {
    /// Wall-clock UTC.
    #[default]
    System,
    /// Frozen at a fixed instant until advanced. Used by tests and the runner.
    Fixed(Timestamp),
}

impl Clock {
    pub fn fixed(at: Timestamp) -> Self {
        Self::Fixed(at)
    }

    pub fn now(&self) -> Timestamp {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(at) => *at,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Move a fixed clock forward. No effect on the system clock.
    pub fn advance(&mut self, by: Duration) {
        if let Self::Fixed(at) = self {
            *at += by;
        }
    }
}
