//! Check-in session facade.
//!
//! Owns the store and exposes the operations a staff screen needs. Camera and
//! manual input share [`CheckInSession::scan`], so both go through the same
//! lock, rate and record bookkeeping.

use checkpoint_runtime::{Store, StoreError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::reducer::{
    CheckInEnvironment, CheckInReducer, CheckInState, ScanAction, ScanPhase, ScanRefusal,
};
use crate::tally::ScanTally;
use crate::types::{EventId, ScanId, ScanOutcome, ScanRecord, ScanSource};

/// Store type driving a session
pub type CheckInStore = Store<CheckInState, ScanAction, CheckInEnvironment, CheckInReducer>;

/// Slack on top of the submit timeout before a scan is reported unresolved
const RESOLVE_GRACE: Duration = Duration::from_secs(5);

/// Errors surfaced by [`CheckInSession`]
#[derive(Error, Debug)]
pub enum SessionError {
    /// The scan was not started
    #[error("scan refused: {0}")]
    Refused(#[from] ScanRefusal),

    /// The store rejected the action or timed out
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The store answered the scan with something other than an outcome
    #[error("scan {0} finished without an outcome")]
    Unresolved(ScanId),
}

/// One operator's check-in session
#[derive(Clone)]
pub struct CheckInSession {
    store: CheckInStore,
    resolve_timeout: Duration,
}

impl CheckInSession {
    /// Creates a session with fresh state
    #[must_use]
    pub fn new(environment: CheckInEnvironment) -> Self {
        let state = CheckInState::new(&environment.settings);
        let resolve_timeout = environment.settings.submit_timeout + RESOLVE_GRACE;

        Self {
            store: Store::with_broadcast_capacity(state, CheckInReducer::new(), environment, 64),
            resolve_timeout,
        }
    }

    /// Choose the event; switching events starts a fresh tally
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn select_event(&self, event: EventId) -> Result<(), SessionError> {
        self.store.send(ScanAction::SelectEvent { event }).await?;
        Ok(())
    }

    /// Run raw input through the check-in pipeline
    ///
    /// Resolves once the outcome is classified, recorded and fed back.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Refused`]: a start guard refused the scan
    /// - [`SessionError::Store`]: the session is shutting down, or the scan did
    ///   not finish within the submit timeout plus a grace period
    /// - [`SessionError::Unresolved`]: no outcome was observed
    pub async fn scan(
        &self,
        input: impl Into<String>,
        source: ScanSource,
    ) -> Result<ScanOutcome, SessionError> {
        let scan_id = ScanId::new();

        let completion = self
            .store
            .send_and_wait_for(
                ScanAction::StartScan {
                    scan_id,
                    input: input.into(),
                    source,
                },
                |action| {
                    matches!(
                        action,
                        ScanAction::ScanResolved { scan_id: id, .. }
                            | ScanAction::ScanRefused { scan_id: id, .. }
                            if *id == scan_id
                    )
                },
                self.resolve_timeout,
            )
            .await?;

        match completion {
            ScanAction::ScanResolved { outcome, .. } => Ok(outcome),
            ScanAction::ScanRefused { reason, .. } => Err(SessionError::Refused(reason)),
            _ => Err(SessionError::Unresolved(scan_id)),
        }
    }

    /// Scan a camera payload (QR or barcode)
    ///
    /// # Errors
    ///
    /// See [`CheckInSession::scan`].
    pub async fn scan_camera(&self, payload: impl Into<String>) -> Result<ScanOutcome, SessionError> {
        self.scan(payload, ScanSource::Camera).await
    }

    /// Check in a code typed by the operator
    ///
    /// # Errors
    ///
    /// See [`CheckInSession::scan`].
    pub async fn manual_entry(&self, code: impl Into<String>) -> Result<ScanOutcome, SessionError> {
        self.scan(code, ScanSource::Manual).await
    }

    /// Scans completed inside the rate window, as of now
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn current_rate(&self) -> Result<usize, SessionError> {
        self.store.send(ScanAction::SampleRate).await?;
        Ok(self.store.state(|s| s.scans_per_minute).await)
    }

    /// Current phase
    pub async fn phase(&self) -> ScanPhase {
        self.store.state(|s| s.phase.clone()).await
    }

    /// Selected event
    pub async fn event(&self) -> Option<EventId> {
        self.store.state(|s| s.event).await
    }

    /// Recent activity, newest first
    pub async fn recent_scans(&self) -> Vec<ScanRecord> {
        self.store.state(|s| s.recent.to_vec()).await
    }

    /// Session totals
    pub async fn tally(&self) -> ScanTally {
        self.store.state(|s| s.tally).await
    }

    /// Refuse scans until [`CheckInSession::resume_shift`]
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn pause_shift(&self) -> Result<(), SessionError> {
        self.store.send(ScanAction::PauseShift).await?;
        Ok(())
    }

    /// Accept scans again
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn resume_shift(&self) -> Result<(), SessionError> {
        self.store.send(ScanAction::ResumeShift).await?;
        Ok(())
    }

    /// Mark the selected event as ended; scans are refused until it is
    /// reopened or another event is selected
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn set_event_ended(&self, ended: bool) -> Result<(), SessionError> {
        self.store.send(ScanAction::SetEventEnded { ended }).await?;
        Ok(())
    }

    /// Switch vibration on or off
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn set_haptics(&self, enabled: bool) -> Result<(), SessionError> {
        self.store.send(ScanAction::SetHaptics { enabled }).await?;
        Ok(())
    }

    /// Forget recent activity, rate and totals
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the session is shutting down.
    pub async fn reset(&self) -> Result<(), SessionError> {
        self.store.send(ScanAction::ResetSession).await?;
        Ok(())
    }

    /// Observe completions, refusals and display timeouts
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ScanAction> {
        self.store.subscribe_actions()
    }

    /// Stop accepting scans and let an in-flight submission finish
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if effects are still running at `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), SessionError> {
        self.store.shutdown(timeout).await?;
        Ok(())
    }
}
