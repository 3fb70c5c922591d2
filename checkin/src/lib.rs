//! # Check-in
//!
//! Staff-device ticket check-in processor built on the Checkpoint architecture.
//!
//! A scan (QR payload, barcode or typed code) is normalized to a ticket code,
//! submitted to a remote check-in authority and classified as `Valid`,
//! `Duplicate` or `Invalid`. Each completed scan updates the recent-activity
//! list, the scan rate and the session totals, and drives operator feedback.
//!
//! ## Modules
//!
//! - [`normalize`]: raw input to [`TicketCode`]
//! - [`reducer`]: the processor state machine
//! - [`session`]: the facade a staff screen talks to
//! - [`authority`]: the remote authority boundary and an in-memory authority
//! - [`http`]: the organizer API adapter
//! - [`tally`]: rate window, recent list and totals
//! - [`feedback`]: feedback signals and sinks
//! - [`config`]: environment configuration
//!
//! ## Example
//!
//! ```ignore
//! let session = CheckInSession::new(environment);
//! session.select_event(EventId::new(12)).await?;
//!
//! match session.scan_camera("https://example.com/t/EVT2025-00042").await? {
//!     ScanOutcome::Valid { holder_name, .. } => println!("Welcome, {holder_name}"),
//!     other => println!("Not admitted: {other:?}"),
//! }
//! ```

pub mod authority;
pub mod config;
pub mod feedback;
pub mod http;
pub mod mocks;
pub mod normalize;
pub mod reducer;
pub mod session;
pub mod tally;
pub mod types;

pub use authority::{CheckInAuthority, CheckInFailure, InMemoryAuthority, StatsRefresher};
pub use config::{CheckInConfig, ProcessorSettings};
pub use feedback::{FeedbackKind, FeedbackSignal, FeedbackSink, LogFeedback};
pub use http::HttpCheckInAuthority;
pub use normalize::{NormalizeError, normalize};
pub use reducer::{CheckInEnvironment, CheckInReducer, CheckInState, ScanAction, ScanPhase, ScanRefusal};
pub use session::{CheckInSession, SessionError};
pub use tally::{RatePolicy, ScanTally};
pub use types::{
    AcceptedTicket, EventId, OutcomeKind, ScanId, ScanOutcome, ScanRecord, ScanSource, TicketCode,
};
