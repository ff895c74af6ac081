//! onboarding-runner: headless walk of a seeded investor cohort through
//! the onboarding workflow.
//!
//! Usage:
//!   onboarding-runner --seed 12345 --investors 12 --db run.db
//!   onboarding-runner --seed 12345 --fail-rate 0.3 --as-of 2024-09-01

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use onboarding_core::{
    clock::Clock,
    config::OnboardingConfig,
    dashboard::{DashboardOverview, DashboardState},
    lifecycle::{DocumentType, LifecycleStage, PaymentFrequency, SignatureStatus},
    notify::channel_for,
    port::{ChaosPort, SqlTransitionPort},
    records::{NewApplication, RecordKind, RecordRef},
    rng::{RngSlot, SeededRng},
    service::OnboardingService,
    store::RecordStore,
    transition::{SignatureOptions, TransitionOptions},
};
use std::env;
use std::thread;

/// Steps of the walk, in order. An investor stops after a seeded number of them.
const WALK_STEPS: u64 = 8;

#[derive(serde::Serialize)]
struct InvestorSummary {
    user_id: String,
    application_id: String,
    application_status: String,
    steps: u64,
    cancelled: bool,
    overview: DashboardOverview,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let investors = parse_arg(&args, "--investors", 12u32);
    let fail_rate = parse_arg(&args, "--fail-rate", 0.0f64);
    let start = parse_arg(&args, "--start", default_date(2024, 1, 1));
    let as_of = parse_arg(&args, "--as-of", default_date(2024, 7, 1));
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let data_dir = args
        .windows(2)
        .find(|w| w[0] == "--data-dir")
        .map(|w| w[1].as_str())
        .unwrap_or("./data");

    println!("Investment onboarding: onboarding-runner");
    println!("  seed:       {seed}");
    println!("  investors:  {investors}");
    println!("  fail rate:  {fail_rate}");
    println!("  start:      {start}");
    println!("  as of:      {as_of}");
    println!("  db:         {db}");
    println!("  data_dir:   {data_dir}");
    println!();

    let config = OnboardingConfig::load(data_dir)?;
    let store = if db == ":memory:" {
        RecordStore::in_memory()?
    } else {
        RecordStore::open(db)?
    };
    store.migrate()?;

    let port = ChaosPort::new(
        Box::new(SqlTransitionPort::new(store.reopen()?)),
        seed,
        fail_rate,
    );
    let channel = channel_for(&config.notifications);
    let clock = Clock::fixed(start.and_hms_opt(9, 0, 0).unwrap_or_default().and_utc());
    let (mut service, dispatcher) =
        OnboardingService::with_parts(config, &store, clock, Box::new(port), channel)?;
    let delivery = thread::spawn(move || dispatcher.run());

    let mut cohort = SeededRng::for_slot(seed, RngSlot::Cohort);
    let mut summaries = Vec::new();
    let mut failed_walks = 0u32;
    for n in 0..investors {
        let user_id = format!("investor-{n:03}");
        match walk_investor(&mut service, &mut cohort, &user_id, as_of) {
            Ok(summary) => summaries.push(summary),
            Err(e) => {
                failed_walks += 1;
                log::warn!("walk for {user_id} failed: {e}");
            }
        }
    }

    let compensations = store.compensation_count()?;
    // Dropping the service closes the outbox and lets the dispatcher finish.
    drop(service);
    let stats = delivery
        .join()
        .map_err(|_| anyhow::anyhow!("notification dispatcher panicked"))?;

    println!("=== COHORT ===");
    for summary in &summaries {
        println!("{}", serde_json::to_string(summary)?);
    }
    println!();
    println!("=== RUN SUMMARY ===");
    println!("  walks completed:   {}", summaries.len());
    println!("  walks failed:      {failed_walks}");
    println!(
        "  active:            {}",
        summaries
            .iter()
            .filter(|s| s.overview.state == DashboardState::ActiveInvestment)
            .count()
    );
    println!("  compensated:       {compensations}");
    println!("  notifications:     {}", serde_json::to_string(&stats)?);
    Ok(())
}

fn walk_investor(
    service: &mut OnboardingService,
    rng: &mut SeededRng,
    user_id: &str,
    as_of: NaiveDate,
) -> Result<InvestorSummary> {
    let frequency = match rng.next_u64_below(3) {
        0 => PaymentFrequency::Monthly,
        1 => PaymentFrequency::Quarterly,
        _ => PaymentFrequency::Annual,
    };
    let app = service.submit_application(NewApplication {
        user_id: user_id.to_string(),
        amount: (rng.range_f64(10.0, 250.0)).round() * 1_000.0,
        annual_rate: (rng.range_f64(8.0, 14.0) * 2.0).round() / 2.0,
        payment_frequency: frequency,
        term_months: 12 * (1 + rng.next_u64_below(3) as u32),
    })?;
    let application = RecordRef::Application(app.id.clone());
    let steps = 1 + rng.next_u64_below(WALK_STEPS);
    let signatures = SignatureOptions::default();
    let plain = TransitionOptions::default();
    let mut investment: Option<RecordRef> = None;

    for step in 1..=steps {
        service.advance_clock(Duration::days(1));
        match step {
            1 => {
                service.record_signature(
                    &app.id,
                    DocumentType::SubscriptionAgreement,
                    SignatureStatus::InvestorSigned,
                    &signatures,
                )?;
            }
            2 => {
                let today = service.clock().today();
                let inv = service.fund_application(&app.id, today)?;
                investment = Some(RecordRef::Investment(inv.id));
            }
            3 => {
                service.record_signature(
                    &app.id,
                    DocumentType::PromissoryNote,
                    SignatureStatus::InvestorSigned,
                    &signatures,
                )?;
                advance_both(service, &application, investment.as_ref(), LifecycleStage::BankDetailsPending)?;
            }
            4 => advance_both(service, &application, investment.as_ref(), LifecycleStage::FundsPending)?,
            5 => advance_both(service, &application, investment.as_ref(), LifecycleStage::PlaidPending)?,
            6 => advance_both(
                service,
                &application,
                investment.as_ref(),
                LifecycleStage::InvestorOnboardingComplete,
            )?,
            7 => {
                if let Some(inv) = investment.as_ref() {
                    service.apply_transition(inv, LifecycleStage::Active, &plain)?;
                }
                service.apply_transition(&application, LifecycleStage::Active, &plain)?;
            }
            _ => {
                // Post-activation signature countersign by the issuer.
                service.record_signature(
                    &app.id,
                    DocumentType::PromissoryNote,
                    SignatureStatus::Signed,
                    &signatures,
                )?;
            }
        }
    }

    let cancelled = steps < 7 && rng.chance(0.1);
    if cancelled {
        service.apply_transition(&application, LifecycleStage::Cancelled, &plain)?;
    }

    let application_status = service
        .store()
        .get_application(&app.id)?
        .map(|a| a.status.to_string())
        .unwrap_or_default();
    Ok(InvestorSummary {
        user_id: user_id.to_string(),
        application_id: app.id,
        application_status,
        steps,
        cancelled,
        overview: service.build_overview_as_of(user_id, as_of)?,
    })
}

/// Apply `stage` to the application and its investment, where each has a
/// label for it. A record the other's write already mirrored is a no-op.
fn advance_both(
    service: &mut OnboardingService,
    application: &RecordRef,
    investment: Option<&RecordRef>,
    stage: LifecycleStage,
) -> Result<()> {
    let options = TransitionOptions::default();
    for record in std::iter::once(application).chain(investment) {
        if record.kind().label_for(stage).is_none() {
            continue;
        }
        let outcome = service.apply_transition(record, stage, &options)?;
        if outcome.is_degraded() && record.kind() == RecordKind::Application {
            log::info!("{record} reached '{stage}' through compensation");
        }
    }
    Ok(())
}

fn default_date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
