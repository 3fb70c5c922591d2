//! Check-in processor state machine.
//!
//! ```text
//! Idle ──start──▶ Submitting ──resolved──▶ Showing(Valid | Duplicate | Invalid)
//!   ▲                                           │
//!   └───────────── display timeout ─────────────┘
//! ```
//!
//! The reducer runs under the store's write lock, so the "nothing in flight"
//! check in `StartScan` is atomic across concurrent camera and manual scans.
//! The remote submission is the only suspension point.

use checkpoint_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::authority::{CheckInAuthority, CheckInFailure, StatsRefresher, classify};
use crate::config::ProcessorSettings;
use crate::feedback::{FeedbackSignal, FeedbackSink};
use crate::normalize::normalize;
use crate::tally::{RecentScans, ScanRateWindow, ScanTally};
use crate::types::{EventId, OutcomeKind, ScanId, ScanOutcome, ScanRecord, ScanSource, TicketCode};

// ============================================================================
// State
// ============================================================================

/// Processor phase
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ScanPhase {
    /// Ready for a scan
    #[default]
    Idle,
    /// A submission is in flight; new scans are refused
    Submitting {
        /// Scan in flight
        scan_id: ScanId,
        /// Event the ticket is checked in at
        event: EventId,
        /// Code submitted
        code: TicketCode,
        /// Where the scan came from
        source: ScanSource,
    },
    /// An outcome is on screen
    Showing {
        /// Scan that produced the outcome
        scan_id: ScanId,
        /// The outcome
        outcome: ScanOutcome,
        /// Generation of the display timer that will clear it
        generation: u64,
    },
}

impl ScanPhase {
    /// Whether a submission is in flight
    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        matches!(self, Self::Submitting { .. })
    }

    /// Whether the processor is idle
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Outcome on screen, if any
    #[must_use]
    pub const fn outcome(&self) -> Option<&ScanOutcome> {
        match self {
            Self::Showing { outcome, .. } => Some(outcome),
            Self::Idle | Self::Submitting { .. } => None,
        }
    }
}

/// Processor state, owned by the store
#[derive(Clone, Debug)]
pub struct CheckInState {
    /// Selected event
    pub event: Option<EventId>,
    /// Current phase
    pub phase: ScanPhase,
    /// Bumped on every accepted scan start
    pub generation: u64,
    /// Whether scanning is paused
    pub shift_paused: bool,
    /// Whether the selected event has ended (reports only)
    pub event_ended: bool,
    /// Whether feedback includes vibration
    pub haptics_enabled: bool,
    /// Recent activity, newest first
    pub recent: RecentScans,
    /// Completion times inside the rate window
    pub rate_window: ScanRateWindow,
    /// Rate as of the last completion or sample
    pub scans_per_minute: usize,
    /// Session totals
    pub tally: ScanTally,
    /// Start time of the last accepted camera scan
    pub last_camera_scan_at: Option<DateTime<Utc>>,
}

impl CheckInState {
    /// Fresh state sized by `settings`
    #[must_use]
    pub fn new(settings: &ProcessorSettings) -> Self {
        Self {
            event: None,
            phase: ScanPhase::Idle,
            generation: 0,
            shift_paused: false,
            event_ended: false,
            haptics_enabled: settings.vibration_feedback,
            recent: RecentScans::new(settings.recent_capacity),
            rate_window: ScanRateWindow::new(settings.rate_window),
            scans_per_minute: 0,
            tally: ScanTally::default(),
            last_camera_scan_at: None,
        }
    }

    fn clear_bookkeeping(&mut self) {
        self.recent.clear();
        self.rate_window.clear();
        self.scans_per_minute = 0;
        self.tally = ScanTally::default();
        self.last_camera_scan_at = None;
    }
}

impl Default for CheckInState {
    fn default() -> Self {
        Self::new(&ProcessorSettings::default())
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Why a scan was not started
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanRefusal {
    /// Input normalized to nothing
    #[error("scan input is empty")]
    EmptyInput,
    /// Another submission is in flight
    #[error("a scan is already being processed")]
    Busy,
    /// No event selected
    #[error("no event selected")]
    NoEventSelected,
    /// The selected event has ended; only reports are available
    #[error("event has ended")]
    EventEnded,
    /// Shift is paused
    #[error("scanning is paused")]
    ShiftPaused,
    /// Camera scan too soon after the previous one
    #[error("camera scan ignored during cooldown")]
    CameraCooldown,
}

impl ScanRefusal {
    /// Metrics label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "empty_input",
            Self::Busy => "busy",
            Self::NoEventSelected => "no_event",
            Self::EventEnded => "event_ended",
            Self::ShiftPaused => "paused",
            Self::CameraCooldown => "camera_cooldown",
        }
    }
}

/// Actions for the check-in processor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ScanAction {
    // Commands
    /// Choose the event to check tickets in at
    SelectEvent {
        /// Event
        event: EventId,
    },
    /// Start processing raw scan input
    StartScan {
        /// Correlation id
        scan_id: ScanId,
        /// Raw input
        input: String,
        /// Where it came from
        source: ScanSource,
    },
    /// Recompute the scan rate at the current time
    SampleRate,
    /// Refuse scans until resumed
    PauseShift,
    /// Accept scans again
    ResumeShift,
    /// Mark the selected event as ended (or reopen it)
    SetEventEnded {
        /// New setting
        ended: bool,
    },
    /// Switch vibration on or off
    SetHaptics {
        /// New setting
        enabled: bool,
    },
    /// Forget recent activity, rate and totals
    ResetSession,

    // Events
    /// A scan was not started
    ScanRefused {
        /// Correlation id
        scan_id: ScanId,
        /// Reason
        reason: ScanRefusal,
    },
    /// The authority answered (or the submission timed out)
    ScanResolved {
        /// Correlation id
        scan_id: ScanId,
        /// Code submitted
        code: TicketCode,
        /// Classified outcome
        outcome: ScanOutcome,
    },
    /// Display timer fired
    ExpireDisplay {
        /// Generation the timer was started for
        generation: u64,
    },
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the check-in processor
#[derive(Clone)]
pub struct CheckInEnvironment {
    /// Clock for rate windows and record timestamps
    pub clock: Arc<dyn Clock>,
    /// Remote check-in authority
    pub authority: Arc<dyn CheckInAuthority>,
    /// Event statistics refresher
    pub stats: Arc<dyn StatsRefresher>,
    /// Device feedback
    pub feedback: Arc<dyn FeedbackSink>,
    /// Tunables
    pub settings: ProcessorSettings,
}

impl CheckInEnvironment {
    /// Creates a new `CheckInEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        authority: Arc<dyn CheckInAuthority>,
        stats: Arc<dyn StatsRefresher>,
        feedback: Arc<dyn FeedbackSink>,
        settings: ProcessorSettings,
    ) -> Self {
        Self {
            clock,
            authority,
            stats,
            feedback,
            settings,
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the check-in processor
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckInReducer;

impl CheckInReducer {
    /// Creates a new `CheckInReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Checks every start guard, in order
    fn validate_start(
        state: &CheckInState,
        input: &str,
        source: ScanSource,
        now: DateTime<Utc>,
        settings: &ProcessorSettings,
    ) -> Result<(EventId, TicketCode), ScanRefusal> {
        let event = state.event.ok_or(ScanRefusal::NoEventSelected)?;

        if state.event_ended {
            return Err(ScanRefusal::EventEnded);
        }

        if state.shift_paused {
            return Err(ScanRefusal::ShiftPaused);
        }

        let code = normalize(input).map_err(|_| ScanRefusal::EmptyInput)?;

        if state.phase.is_submitting() {
            return Err(ScanRefusal::Busy);
        }

        if source == ScanSource::Camera {
            if let Some(last) = state.last_camera_scan_at {
                let cooldown = chrono::Duration::from_std(settings.camera_cooldown)
                    .unwrap_or(chrono::Duration::MAX);
                if now.signed_duration_since(last) < cooldown {
                    return Err(ScanRefusal::CameraCooldown);
                }
            }
        }

        Ok((event, code))
    }

    /// Submit to the authority, bounded by the submit timeout
    fn submit(
        env: &CheckInEnvironment,
        scan_id: ScanId,
        event: EventId,
        code: TicketCode,
    ) -> Effect<ScanAction> {
        let authority = Arc::clone(&env.authority);
        let timeout = env.settings.submit_timeout;

        Effect::Future(Box::pin(async move {
            let started = std::time::Instant::now();
            let result = tokio::time::timeout(timeout, authority.check_in(event, code.clone()))
                .await
                .unwrap_or_else(|_| {
                    Err(CheckInFailure::Transport {
                        message: format!(
                            "Check-in request timed out after {} ms",
                            timeout.as_millis()
                        ),
                    })
                });
            metrics::histogram!("checkin.submit.duration_seconds")
                .record(started.elapsed().as_secs_f64());

            if let Err(failure) = &result {
                tracing::debug!(%scan_id, reason = failure.as_str(), "Ticket not admitted");
            }

            Some(ScanAction::ScanResolved {
                scan_id,
                code,
                outcome: classify(result),
            })
        }))
    }

    fn emit_feedback(env: &CheckInEnvironment, kind: OutcomeKind, haptics: bool) -> Effect<ScanAction> {
        let sink = Arc::clone(&env.feedback);
        let signal = FeedbackSignal::new(kind.feedback_kind(), haptics);

        Effect::Future(Box::pin(async move {
            sink.emit(signal);
            None
        }))
    }

    fn refresh_stats(env: &CheckInEnvironment, event: EventId) -> Effect<ScanAction> {
        let stats = Arc::clone(&env.stats);

        Effect::Future(Box::pin(async move {
            tokio::spawn(stats.refresh_stats(event));
            None
        }))
    }
}

impl Reducer for CheckInReducer {
    type State = CheckInState;
    type Action = ScanAction;
    type Environment = CheckInEnvironment;

    #[allow(clippy::too_many_lines)] // one arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ScanAction::SelectEvent { event } => {
                if state.event != Some(event) {
                    tracing::info!(%event, "Event selected");
                    state.clear_bookkeeping();
                    state.event = Some(event);
                    state.event_ended = false;
                }
                smallvec![Effect::None]
            },

            ScanAction::StartScan {
                scan_id,
                input,
                source,
            } => {
                let now = env.clock.now();
                let (event, code) =
                    match Self::validate_start(state, &input, source, now, &env.settings) {
                        Ok(accepted) => accepted,
                        Err(reason) => {
                            tracing::debug!(%scan_id, reason = reason.as_str(), "Scan refused");
                            return smallvec![Effect::Future(Box::pin(async move {
                                Some(ScanAction::ScanRefused { scan_id, reason })
                            }))];
                        },
                    };

                if source == ScanSource::Camera {
                    state.last_camera_scan_at = Some(now);
                }
                state.generation += 1;
                state.phase = ScanPhase::Submitting {
                    scan_id,
                    event,
                    code: code.clone(),
                    source,
                };

                smallvec![Self::submit(env, scan_id, event, code)]
            },

            ScanAction::ScanRefused { reason, .. } => {
                metrics::counter!("checkin.scans.refused", "reason" => reason.as_str()).increment(1);
                smallvec![Effect::None]
            },

            ScanAction::ScanResolved {
                scan_id,
                code,
                outcome,
            } => {
                let event = match &state.phase {
                    ScanPhase::Submitting {
                        scan_id: in_flight,
                        event,
                        ..
                    } if *in_flight == scan_id => *event,
                    _ => {
                        tracing::warn!(%scan_id, "Ignoring resolution of a scan that is not in flight");
                        return smallvec![Effect::None];
                    },
                };

                let now = env.clock.now();
                let kind = outcome.kind();

                tracing::info!(%scan_id, %code, %event, outcome = kind.as_str(), "Scan completed");
                metrics::counter!("checkin.scans.completed", "outcome" => kind.as_str()).increment(1);

                // A scan started before an event switch belongs to the old event.
                if state.event == Some(event) {
                    if env.settings.rate_policy.counts(kind) {
                        state.rate_window.record(now);
                    }
                    state.scans_per_minute = state.rate_window.current_rate(now);

                    state.recent.push(ScanRecord::new(
                        scan_id,
                        code,
                        &outcome,
                        now,
                        env.settings.display_offset,
                    ));
                    state.tally.record(kind);
                } else {
                    tracing::info!(%scan_id, %event, "Scan belongs to a previous event, not recorded");
                }

                let generation = state.generation;
                state.phase = ScanPhase::Showing {
                    scan_id,
                    outcome,
                    generation,
                };

                let mut follow_up = vec![Self::emit_feedback(env, kind, state.haptics_enabled)];
                if kind == OutcomeKind::Valid {
                    follow_up.push(Self::refresh_stats(env, event));
                }

                smallvec![
                    Effect::chain(follow_up),
                    Effect::Delay {
                        duration: env.settings.display_window,
                        action: Box::new(ScanAction::ExpireDisplay { generation }),
                    }
                ]
            },

            ScanAction::ExpireDisplay { generation } => {
                match &state.phase {
                    ScanPhase::Showing {
                        generation: shown, ..
                    } if *shown == generation => {
                        state.phase = ScanPhase::Idle;
                    },
                    _ => {
                        tracing::trace!(generation, "Stale display timeout ignored");
                    },
                }
                smallvec![Effect::None]
            },

            ScanAction::SampleRate => {
                state.scans_per_minute = state.rate_window.current_rate(env.clock.now());
                smallvec![Effect::None]
            },

            ScanAction::PauseShift => {
                state.shift_paused = true;
                smallvec![Effect::None]
            },

            ScanAction::ResumeShift => {
                state.shift_paused = false;
                smallvec![Effect::None]
            },

            ScanAction::SetEventEnded { ended } => {
                state.event_ended = ended;
                smallvec![Effect::None]
            },

            ScanAction::SetHaptics { enabled } => {
                state.haptics_enabled = enabled;
                smallvec![Effect::None]
            },

            ScanAction::ResetSession => {
                state.clear_bookkeeping();
                if !state.phase.is_submitting() {
                    state.phase = ScanPhase::Idle;
                }
                smallvec![Effect::None]
            },
        }
    }
}
