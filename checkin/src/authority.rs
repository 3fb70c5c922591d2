//! Remote check-in authority boundary.
//!
//! The authority decides whether a ticket is admitted. It answers with a typed
//! [`CheckInFailure`], so the state machine never looks at message text. The
//! free-text heuristic needed by the legacy API lives in
//! [`CheckInFailure::from_legacy_message`] and is only called by adapters.

use checkpoint_core::environment::Clock;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::types::{AcceptedTicket, EventId, ScanOutcome, TicketCode};

/// Message used for a duplicate when the authority gives none
pub const DUPLICATE_FALLBACK_MESSAGE: &str = "Ticket already checked in";

/// Message used for an invalid scan when the authority gives none
pub const INVALID_FALLBACK_MESSAGE: &str = "Invalid ticket";

/// Why the authority did not admit a ticket
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckInFailure {
    /// The ticket was consumed earlier
    #[error("already checked in: {message}")]
    AlreadyCheckedIn {
        /// Message from the authority
        message: String,
        /// Time of the earlier check-in, if reported
        previous_check_in_time: Option<String>,
        /// Attendee of the ticket, if reported
        holder_name: Option<String>,
        /// Ticket type, if reported
        ticket_type_name: Option<String>,
    },

    /// No such ticket for this event
    #[error("not found: {message}")]
    NotFound {
        /// Message from the authority
        message: String,
    },

    /// The ticket exists but cannot be admitted (cancelled, refunded, ...)
    #[error("rejected: {message}")]
    Rejected {
        /// Message from the authority
        message: String,
    },

    /// The authority could not be reached or answered nonsense
    #[error("transport failure: {message}")]
    Transport {
        /// Description of the failure
        message: String,
    },
}

impl CheckInFailure {
    /// Classify a free-text failure message from the legacy API
    ///
    /// A message mentioning "already" or "checked" (any case) is a duplicate;
    /// anything else is a rejection.
    #[must_use]
    pub fn from_legacy_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();

        if lowered.contains("already") || lowered.contains("checked") {
            Self::AlreadyCheckedIn {
                message,
                previous_check_in_time: None,
                holder_name: None,
                ticket_type_name: None,
            }
        } else {
            Self::Rejected { message }
        }
    }

    /// Metrics label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyCheckedIn { .. } => "already_checked_in",
            Self::NotFound { .. } => "not_found",
            Self::Rejected { .. } => "rejected",
            Self::Transport { .. } => "transport",
        }
    }
}

/// Turn the authority's answer into an outcome
///
/// Transport failures collapse into `Invalid`.
#[must_use]
pub fn classify(result: Result<AcceptedTicket, CheckInFailure>) -> ScanOutcome {
    fn or_fallback(message: String, fallback: &str) -> String {
        if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }

    match result {
        Ok(ticket) => ScanOutcome::Valid {
            holder_name: ticket.holder_name,
            ticket_type_name: ticket.ticket_type_name,
            seat_label: ticket.seat_label,
        },
        Err(CheckInFailure::AlreadyCheckedIn {
            message,
            previous_check_in_time,
            holder_name,
            ticket_type_name,
        }) => ScanOutcome::Duplicate {
            message: or_fallback(message, DUPLICATE_FALLBACK_MESSAGE),
            previous_check_in_time,
            holder_name,
            ticket_type_name,
        },
        Err(
            CheckInFailure::NotFound { message }
            | CheckInFailure::Rejected { message }
            | CheckInFailure::Transport { message },
        ) => ScanOutcome::Invalid {
            message: or_fallback(message, INVALID_FALLBACK_MESSAGE),
        },
    }
}

/// Remote check-in authority
pub trait CheckInAuthority: Send + Sync {
    /// Submit a ticket code for check-in at `event`
    ///
    /// # Errors
    ///
    /// Returns a [`CheckInFailure`] describing why the ticket was not admitted.
    fn check_in(
        &self,
        event: EventId,
        code: TicketCode,
    ) -> BoxFuture<'_, Result<AcceptedTicket, CheckInFailure>>;
}

/// Event statistics collaborator, refreshed after each accepted ticket
///
/// The returned future is detached by the processor; failures are the
/// refresher's own business.
pub trait StatsRefresher: Send + Sync {
    /// Start refreshing the statistics of `event`
    fn refresh_stats(&self, event: EventId) -> BoxFuture<'static, ()>;
}

// ============================================================================
// In-memory authority
// ============================================================================

#[derive(Clone, Debug)]
struct IssuedTicket {
    holder_name: String,
    ticket_type_name: String,
    seat_label: Option<String>,
    checked_in_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Default)]
struct Registry {
    tickets: HashMap<(EventId, String), IssuedTicket>,
    refreshes: usize,
}

/// In-process authority with an at-most-once registry of issued tickets
///
/// Used offline and by the demo binary. Each issued code is admitted once;
/// later attempts report the first check-in time.
#[derive(Clone)]
pub struct InMemoryAuthority {
    clock: Arc<dyn Clock>,
    registry: Arc<Mutex<Registry>>,
}

impl InMemoryAuthority {
    /// Creates an empty authority
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Issue a ticket for `event`
    pub fn issue(
        &self,
        event: EventId,
        code: &str,
        holder_name: &str,
        ticket_type_name: &str,
        seat_label: Option<&str>,
    ) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tickets
            .insert(
                (event, code.to_string()),
                IssuedTicket {
                    holder_name: holder_name.to_string(),
                    ticket_type_name: ticket_type_name.to_string(),
                    seat_label: seat_label.map(str::to_string),
                    checked_in_at: None,
                },
            );
    }

    /// Number of tickets checked in at `event`
    #[must_use]
    pub fn checked_in_count(&self, event: EventId) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .tickets
            .iter()
            .filter(|((ticket_event, _), ticket)| {
                *ticket_event == event && ticket.checked_in_at.is_some()
            })
            .count()
    }

    /// Number of stats refreshes requested so far
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .refreshes
    }

    fn admit(&self, event: EventId, code: &TicketCode) -> Result<AcceptedTicket, CheckInFailure> {
        let now = self.clock.now();
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(ticket) = registry.tickets.get_mut(&(event, code.as_str().to_string())) else {
            return Err(CheckInFailure::NotFound {
                message: format!("No ticket found for code {code}"),
            });
        };

        if let Some(first) = ticket.checked_in_at {
            return Err(CheckInFailure::AlreadyCheckedIn {
                message: format!("Ticket already checked in at {}", first.format("%H:%M")),
                previous_check_in_time: Some(first.to_rfc3339()),
                holder_name: Some(ticket.holder_name.clone()),
                ticket_type_name: Some(ticket.ticket_type_name.clone()),
            });
        }

        ticket.checked_in_at = Some(now);
        Ok(AcceptedTicket {
            holder_name: ticket.holder_name.clone(),
            ticket_type_name: ticket.ticket_type_name.clone(),
            seat_label: ticket.seat_label.clone(),
        })
    }
}

impl CheckInAuthority for InMemoryAuthority {
    fn check_in(
        &self,
        event: EventId,
        code: TicketCode,
    ) -> BoxFuture<'_, Result<AcceptedTicket, CheckInFailure>> {
        Box::pin(async move { self.admit(event, &code) })
    }
}

impl StatsRefresher for InMemoryAuthority {
    fn refresh_stats(&self, event: EventId) -> BoxFuture<'static, ()> {
        let checked_in = {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.refreshes += 1;
            registry
                .tickets
                .iter()
                .filter(|((ticket_event, _), ticket)| {
                    *ticket_event == event && ticket.checked_in_at.is_some()
                })
                .count()
        };

        Box::pin(async move {
            tracing::debug!(%event, checked_in, "Event stats refreshed");
        })
    }
}
