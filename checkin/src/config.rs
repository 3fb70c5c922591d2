//! Configuration management for the check-in processor.
//!
//! Loads configuration from environment variables with sensible defaults.

use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::time::Duration;

use crate::tally::RatePolicy;
use crate::types::EventId;

/// Tunables of the scan processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// How long an outcome stays on screen
    pub display_window: Duration,
    /// Length of the scan-rate window
    pub rate_window: Duration,
    /// Recent-activity list capacity
    pub recent_capacity: usize,
    /// Minimum gap between accepted camera scans
    pub camera_cooldown: Duration,
    /// Upper bound on one authority call
    pub submit_timeout: Duration,
    /// Which outcomes count toward the scan rate
    pub rate_policy: RatePolicy,
    /// Initial haptics setting
    pub vibration_feedback: bool,
    /// Offset used for record timestamps
    pub display_offset: FixedOffset,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            display_window: Duration::from_millis(3_000),
            rate_window: Duration::from_millis(60_000),
            recent_capacity: 10,
            camera_cooldown: Duration::from_millis(2_000),
            submit_timeout: Duration::from_millis(15_000),
            rate_policy: RatePolicy::AllOutcomes,
            vibration_feedback: true,
            display_offset: utc(),
        }
    }
}

/// Remote authority configuration
#[derive(Debug, Clone, Default)]
pub struct ApiConfig {
    /// Base URL of the organizer API; `None` selects the in-memory authority
    pub url: Option<String>,
    /// Bearer token
    pub token: Option<String>,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct CheckInConfig {
    /// Processor tunables
    pub processor: ProcessorSettings,
    /// Remote authority
    pub api: ApiConfig,
    /// Event selected at startup
    pub event_id: EventId,
}

impl CheckInConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| {
            Duration::from_millis(
                lookup(key)
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(default),
            )
        };

        let processor = ProcessorSettings {
            display_window: millis("CHECKIN_DISPLAY_WINDOW_MS", 3_000),
            rate_window: millis("CHECKIN_RATE_WINDOW_MS", 60_000),
            recent_capacity: lookup("CHECKIN_RECENT_CAPACITY")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(10),
            camera_cooldown: millis("CHECKIN_CAMERA_COOLDOWN_MS", 2_000),
            submit_timeout: millis("CHECKIN_SUBMIT_TIMEOUT_MS", 15_000),
            rate_policy: lookup("CHECKIN_RATE_POLICY")
                .and_then(|s| parse_rate_policy(&s))
                .unwrap_or_default(),
            vibration_feedback: lookup("CHECKIN_VIBRATION_FEEDBACK")
                .and_then(|s| parse_flag(&s))
                .unwrap_or(true),
            display_offset: lookup("CHECKIN_UTC_OFFSET_MINUTES")
                .and_then(|s| s.trim().parse::<i32>().ok())
                .and_then(|minutes| FixedOffset::east_opt(minutes.checked_mul(60)?))
                .unwrap_or_else(utc),
        };

        Self {
            processor,
            api: ApiConfig {
                url: lookup("CHECKIN_API_URL").filter(|s| !s.trim().is_empty()),
                token: lookup("CHECKIN_API_TOKEN").filter(|s| !s.trim().is_empty()),
            },
            event_id: EventId::new(
                lookup("CHECKIN_EVENT_ID")
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(1),
            ),
        }
    }
}

fn parse_rate_policy(value: &str) -> Option<RatePolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "all" => Some(RatePolicy::AllOutcomes),
        "accepted" => Some(RatePolicy::AcceptedOnly),
        _ => None,
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}
