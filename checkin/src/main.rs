//! Check-in Demo
//!
//! Reads ticket codes (or ticket URLs) from stdin, one per line, and runs each
//! through the manual-entry pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Offline, against a seeded in-memory authority
//! cargo run --bin checkin-demo
//!
//! # Against the organizer API
//! CHECKIN_API_URL=https://api.example.com/api CHECKIN_API_TOKEN=... \
//!     CHECKIN_EVENT_ID=12 cargo run --bin checkin-demo
//! ```
//!
//! Commands: `:rate`, `:recent`, `:pause`, `:resume`, `:end`, `:reopen`,
//! `:haptics on|off`, `:reset`, `:quit`.

use anyhow::Context;
use checkin::{
    CheckInAuthority, CheckInConfig, CheckInEnvironment, CheckInSession, HttpCheckInAuthority,
    InMemoryAuthority, LogFeedback, ScanOutcome, SessionError, StatsRefresher,
};
use checkpoint_core::environment::{Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkin=info,checkpoint_runtime=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CheckInConfig::from_env();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (authority, stats): (Arc<dyn CheckInAuthority>, Arc<dyn StatsRefresher>) =
        if let Some(url) = &config.api.url {
            tracing::info!(api = %url, event = %config.event_id, "Using organizer API");
            let http = Arc::new(
                HttpCheckInAuthority::new(
                    url,
                    config.api.token.clone(),
                    config.processor.submit_timeout,
                )
                .context("configuring the check-in API client")?,
            );
            let authority: Arc<dyn CheckInAuthority> = http.clone();
            let stats: Arc<dyn StatsRefresher> = http;
            (authority, stats)
        } else {
            tracing::info!(event = %config.event_id, "Using in-memory authority");
            let memory = Arc::new(InMemoryAuthority::new(Arc::clone(&clock)));
            seed(&memory, &config);
            let authority: Arc<dyn CheckInAuthority> = memory.clone();
            let stats: Arc<dyn StatsRefresher> = memory;
            (authority, stats)
        };

    let session = CheckInSession::new(CheckInEnvironment::new(
        clock,
        authority,
        stats,
        Arc::new(LogFeedback),
        config.processor,
    ));
    session.select_event(config.event_id).await?;

    println!("Scan or type a ticket code (:quit to exit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        match line {
            ":quit" => break,
            ":rate" => println!("{} scans/min", session.current_rate().await?),
            ":recent" => {
                for record in session.recent_scans().await {
                    println!(
                        "{}  {:<9} {:<24} {:<12} {}",
                        record.timestamp_label,
                        record.kind.as_str(),
                        record.holder_name,
                        record.ticket_type_name,
                        record.ticket_code
                    );
                }
            },
            ":pause" => session.pause_shift().await?,
            ":resume" => session.resume_shift().await?,
            ":end" => session.set_event_ended(true).await?,
            ":reopen" => session.set_event_ended(false).await?,
            ":haptics on" => session.set_haptics(true).await?,
            ":haptics off" => session.set_haptics(false).await?,
            ":reset" => session.reset().await?,
            input => match session.manual_entry(input).await {
                Ok(outcome) => print_outcome(&outcome),
                Err(SessionError::Refused(reason)) => println!("-- {reason}"),
                Err(error) => return Err(error.into()),
            },
        }
    }

    let tally = session.tally().await;
    println!(
        "{} scans: {} valid, {} duplicate, {} invalid",
        tally.total, tally.valid, tally.duplicate, tally.invalid
    );
    session.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}

fn seed(authority: &InMemoryAuthority, config: &CheckInConfig) {
    authority.issue(config.event_id, "EVT2025-00042", "A. Popescu", "VIP", Some("A-12"));
    authority.issue(config.event_id, "EVT2025-00043", "M. Ionescu", "General", None);
    authority.issue(config.event_id, "EVT2025-00044", "D. Stan", "Early Bird", None);
}

fn print_outcome(outcome: &ScanOutcome) {
    match outcome {
        ScanOutcome::Valid {
            holder_name,
            ticket_type_name,
            seat_label,
        } => match seat_label {
            Some(seat) => println!("VALID      {holder_name} ({ticket_type_name}, seat {seat})"),
            None => println!("VALID      {holder_name} ({ticket_type_name})"),
        },
        ScanOutcome::Duplicate {
            message,
            previous_check_in_time,
            ..
        } => match previous_check_in_time {
            Some(at) => println!("DUPLICATE  {message} (first check-in {at})"),
            None => println!("DUPLICATE  {message}"),
        },
        ScanOutcome::Invalid { message } => println!("INVALID    {message}"),
    }
}
