//! Domain types for the check-in processor.
//!
//! Identifiers, the normalized ticket code, scan outcomes and the records kept
//! in the recent-activity list.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::feedback::FeedbackKind;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of the event whose tickets are being checked in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(u64);

impl EventId {
    /// Creates an `EventId` from the authority's numeric id
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a scan start with its completion
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanId(Uuid);

impl ScanId {
    /// Creates a new random `ScanId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ticket code
// ============================================================================

/// Normalized ticket identifier, never empty
///
/// Obtained through [`crate::normalize::normalize`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketCode(String);

impl TicketCode {
    pub(crate) const fn from_normalized(code: String) -> Self {
        Self(code)
    }

    /// The code as sent to the authority
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TicketCode {
    type Error = crate::normalize::NormalizeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        crate::normalize::normalize(&value)
    }
}

impl From<TicketCode> for String {
    fn from(code: TicketCode) -> Self {
        code.0
    }
}

impl fmt::Display for TicketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a scan came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanSource {
    /// QR/barcode payload read by the camera
    Camera,
    /// Code typed by the operator
    Manual,
}

// ============================================================================
// Outcomes
// ============================================================================

/// Kind of a completed scan
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Ticket accepted
    Valid,
    /// Ticket already consumed
    Duplicate,
    /// Any other failure
    Invalid,
}

impl OutcomeKind {
    /// Stable lowercase label, used for metrics and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Duplicate => "duplicate",
            Self::Invalid => "invalid",
        }
    }

    /// Operator feedback for this kind of outcome
    #[must_use]
    pub const fn feedback_kind(self) -> FeedbackKind {
        match self {
            Self::Valid => FeedbackKind::Success,
            Self::Duplicate => FeedbackKind::Warning,
            Self::Invalid => FeedbackKind::Error,
        }
    }
}

/// A ticket the authority accepted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedTicket {
    /// Attendee name
    pub holder_name: String,
    /// Ticket type name
    pub ticket_type_name: String,
    /// Seat, for seated events
    pub seat_label: Option<String>,
}

/// Classified result of one scan, immutable once produced
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    /// Ticket accepted
    Valid {
        /// Attendee name
        holder_name: String,
        /// Ticket type name
        ticket_type_name: String,
        /// Seat, for seated events
        seat_label: Option<String>,
    },
    /// Ticket was already checked in
    Duplicate {
        /// Message reported by the authority
        message: String,
        /// When the ticket was first checked in, if reported
        previous_check_in_time: Option<String>,
        /// Attendee of the already-used ticket, if reported
        holder_name: Option<String>,
        /// Ticket type of the already-used ticket, if reported
        ticket_type_name: Option<String>,
    },
    /// Ticket not found, rejected, or the authority could not be reached
    Invalid {
        /// Message reported by the authority, or a fallback
        message: String,
    },
}

impl ScanOutcome {
    /// The outcome's kind
    #[must_use]
    pub const fn kind(&self) -> OutcomeKind {
        match self {
            Self::Valid { .. } => OutcomeKind::Valid,
            Self::Duplicate { .. } => OutcomeKind::Duplicate,
            Self::Invalid { .. } => OutcomeKind::Invalid,
        }
    }

    /// Attendee name, when known
    #[must_use]
    pub fn holder_name(&self) -> Option<&str> {
        match self {
            Self::Valid { holder_name, .. } => Some(holder_name),
            Self::Duplicate { holder_name, .. } => holder_name.as_deref(),
            Self::Invalid { .. } => None,
        }
    }

    /// Failure message (`None` for accepted tickets)
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Valid { .. } => None,
            Self::Duplicate { message, .. } | Self::Invalid { message } => Some(message),
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One line in the recent-activity list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Scan that produced this record
    pub id: ScanId,
    /// Outcome kind
    pub kind: OutcomeKind,
    /// Attendee name, or a placeholder
    pub holder_name: String,
    /// Ticket type name, or a placeholder
    pub ticket_type_name: String,
    /// Completion time as `HH:MM` in the display offset
    pub timestamp_label: String,
    /// The code that was submitted
    pub ticket_code: TicketCode,
}

impl ScanRecord {
    /// Builds the record for a completed scan
    #[must_use]
    pub fn new(
        id: ScanId,
        ticket_code: TicketCode,
        outcome: &ScanOutcome,
        completed_at: DateTime<Utc>,
        display_offset: FixedOffset,
    ) -> Self {
        let (holder_name, ticket_type_name) = match outcome {
            ScanOutcome::Valid {
                holder_name,
                ticket_type_name,
                ..
            } => (holder_name.clone(), ticket_type_name.clone()),
            ScanOutcome::Duplicate {
                holder_name,
                ticket_type_name,
                ..
            } => (
                holder_name.clone().unwrap_or_else(|| "Unknown".to_string()),
                ticket_type_name.clone().unwrap_or_else(|| "Ticket".to_string()),
            ),
            ScanOutcome::Invalid { .. } => ("Invalid Ticket".to_string(), "-".to_string()),
        };

        Self {
            id,
            kind: outcome.kind(),
            holder_name,
            ticket_type_name,
            timestamp_label: completed_at
                .with_timezone(&display_offset)
                .format("%H:%M")
                .to_string(),
            ticket_code,
        }
    }
}
