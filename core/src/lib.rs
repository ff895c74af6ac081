//! Investment onboarding core: lifecycle transitions with compensation,
//! return accrual, the investor dashboard and best-effort notifications.

pub mod clock;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod notify;
pub mod port;
pub mod records;
pub mod returns;
pub mod rng;
pub mod service;
pub mod store;
pub mod transition;
pub mod types;
