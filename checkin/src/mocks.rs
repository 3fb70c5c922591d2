//! Scriptable collaborators for tests and local runs.
//!
//! `ScriptedAuthority` answers from a table and can be held closed to keep a
//! submission in flight. `RecordingFeedback` and `CountingStats` remember what
//! the processor asked of them.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

use crate::authority::{CheckInAuthority, CheckInFailure, StatsRefresher};
use crate::feedback::{FeedbackSignal, FeedbackSink};
use crate::types::{AcceptedTicket, EventId, TicketCode};

/// Authority answering from a scripted table
///
/// Unknown codes are `NotFound`.
#[derive(Debug)]
pub struct ScriptedAuthority {
    responses: Mutex<HashMap<String, Result<AcceptedTicket, CheckInFailure>>>,
    calls: Mutex<Vec<(EventId, TicketCode)>>,
    gate: watch::Sender<bool>,
    stalled: AtomicBool,
}

impl Default for ScriptedAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAuthority {
    /// Creates an authority with an empty script and an open gate
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            responses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gate,
            stalled: AtomicBool::new(false),
        }
    }

    /// Admit `code` as the given holder
    pub fn accept(&self, code: &str, holder_name: &str, ticket_type_name: &str) {
        self.script(
            code,
            Ok(AcceptedTicket {
                holder_name: holder_name.to_string(),
                ticket_type_name: ticket_type_name.to_string(),
                seat_label: None,
            }),
        );
    }

    /// Refuse `code` with `failure`
    pub fn fail(&self, code: &str, failure: CheckInFailure) {
        self.script(code, Err(failure));
    }

    fn script(&self, code: &str, response: Result<AcceptedTicket, CheckInFailure>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(code.to_string(), response);
    }

    /// Hold every submission until [`ScriptedAuthority::release`]
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held and future submissions answer
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Never answer again
    pub fn stall(&self) {
        self.stalled.store(true, Ordering::SeqCst);
    }

    /// Codes submitted so far, in order
    #[must_use]
    pub fn submitted_codes(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, code)| code.as_str().to_string())
            .collect()
    }

    /// Number of submissions so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl CheckInAuthority for ScriptedAuthority {
    fn check_in(
        &self,
        event: EventId,
        code: TicketCode,
    ) -> BoxFuture<'_, Result<AcceptedTicket, CheckInFailure>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((event, code.clone()));

            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }

            let mut gate = self.gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;

            self.responses
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(code.as_str())
                .cloned()
                .unwrap_or_else(|| {
                    Err(CheckInFailure::NotFound {
                        message: format!("No ticket found for code {code}"),
                    })
                })
        })
    }
}

/// Feedback sink that keeps every signal
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    signals: Mutex<Vec<FeedbackSignal>>,
}

impl RecordingFeedback {
    /// Signals emitted so far, in order
    #[must_use]
    pub fn signals(&self) -> Vec<FeedbackSignal> {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FeedbackSink for RecordingFeedback {
    fn emit(&self, signal: FeedbackSignal) {
        self.signals
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(signal);
    }
}

/// Stats refresher that counts requests
#[derive(Debug, Default)]
pub struct CountingStats {
    requests: Mutex<Vec<EventId>>,
}

impl CountingStats {
    /// Events refreshed so far, in order
    #[must_use]
    pub fn requests(&self) -> Vec<EventId> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StatsRefresher for CountingStats {
    fn refresh_stats(&self, event: EventId) -> BoxFuture<'static, ()> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Box::pin(async {})
    }
}
