//! HTTP adapter for the organizer check-in API.
//!
//! `POST {base}/organizer/events/{event}/check-in/{code}` with a bearer token.
//! The API answers in JSON:
//!
//! - success: `{"success": true, "data": {"ticket": {...}, "customer": {...}}}`
//! - already used: HTTP 400 with `ticket.checked_in_at` set
//! - unknown ticket: HTTP 404
//! - anything else: a free-text `message`, classified by keyword

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode, Url, header::ACCEPT};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::authority::{CheckInAuthority, CheckInFailure, StatsRefresher};
use crate::types::{AcceptedTicket, EventId, TicketCode};

const DEFAULT_HOLDER_NAME: &str = "Participant";
const DEFAULT_TICKET_TYPE: &str = "General";

/// Adapter construction errors
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The base URL cannot carry API paths
    #[error("invalid API base URL {url}: {reason}")]
    InvalidBaseUrl {
        /// URL as configured
        url: String,
        /// What is wrong with it
        reason: String,
    },

    /// The HTTP client could not be built
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Check-in authority backed by the organizer HTTP API
#[derive(Clone, Debug)]
pub struct HttpCheckInAuthority {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpCheckInAuthority {
    /// Creates an adapter with its own client
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] if the URL is unusable or the client cannot be built.
    pub fn new(
        base_url: &str,
        token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Self::with_client(client, base_url, token)
    }

    /// Creates an adapter on an existing client
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::InvalidBaseUrl`] if the URL is unusable.
    pub fn with_client(
        client: Client,
        base_url: &str,
        token: Option<String>,
    ) -> Result<Self, AdapterError> {
        let invalid = |reason: String| AdapterError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason,
        };

        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }

        Ok(Self {
            client,
            base_url: parsed,
            token,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CheckInFailure> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| CheckInFailure::Transport {
                message: format!("cannot build a request path on {}", self.base_url),
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }
}

impl CheckInAuthority for HttpCheckInAuthority {
    fn check_in(
        &self,
        event: EventId,
        code: TicketCode,
    ) -> BoxFuture<'_, Result<AcceptedTicket, CheckInFailure>> {
        Box::pin(async move {
            let event_segment = event.to_string();
            let url = self.endpoint(&[
                "organizer",
                "events",
                &event_segment,
                "check-in",
                code.as_str(),
            ])?;

            let mut request = self.client.post(url).header(ACCEPT, "application/json");
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await.map_err(|e| CheckInFailure::Transport {
                message: format!("Check-in service unreachable: {e}"),
            })?;
            let status = response.status();
            let body = response.text().await.map_err(|e| CheckInFailure::Transport {
                message: format!("Check-in response unreadable: {e}"),
            })?;

            tracing::debug!(%event, %code, status = status.as_u16(), "Check-in response");
            interpret_response(status, &body)
        })
    }
}

impl StatsRefresher for HttpCheckInAuthority {
    fn refresh_stats(&self, event: EventId) -> BoxFuture<'static, ()> {
        let event_segment = event.to_string();
        let url = self.endpoint(&["organizer", "events", &event_segment, "participants"]);
        let client = self.client.clone();
        let token = self.token.clone();

        Box::pin(async move {
            let Ok(url) = url else {
                tracing::warn!(%event, "Cannot build stats URL");
                return;
            };

            let mut request = client.get(url).header(ACCEPT, "application/json");
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(%event, "Event stats refreshed");
                },
                Ok(response) => {
                    tracing::warn!(%event, status = response.status().as_u16(), "Stats refresh rejected");
                },
                Err(error) => {
                    tracing::warn!(%event, %error, "Stats refresh failed");
                },
            }
        })
    }
}

/// Map an API response onto the authority contract
///
/// # Errors
///
/// Returns the [`CheckInFailure`] the response describes.
pub fn interpret_response(status: StatusCode, body: &str) -> Result<AcceptedTicket, CheckInFailure> {
    let payload: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let data = payload
        .get("data")
        .filter(|data| data.is_object())
        .unwrap_or(&payload);
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if status.is_success() {
        if !payload.is_object() {
            return Err(CheckInFailure::Transport {
                message: "Check-in service returned an unreadable response".to_string(),
            });
        }
        if payload.get("success").and_then(Value::as_bool) != Some(false) {
            return Ok(AcceptedTicket {
                holder_name: holder_name(data).unwrap_or_else(|| DEFAULT_HOLDER_NAME.to_string()),
                ticket_type_name: ticket_type_name(data)
                    .unwrap_or_else(|| DEFAULT_TICKET_TYPE.to_string()),
                seat_label: text_at(data, "/ticket/seat_label"),
            });
        }
    }

    if status == StatusCode::NOT_FOUND {
        return Err(CheckInFailure::NotFound { message });
    }

    if let Some(checked_in_at) = text_at(data, "/ticket/checked_in_at") {
        return Err(CheckInFailure::AlreadyCheckedIn {
            message,
            previous_check_in_time: Some(checked_in_at),
            holder_name: holder_name(data),
            ticket_type_name: ticket_type_name(data),
        });
    }

    if status.is_server_error() {
        return Err(CheckInFailure::Transport {
            message: if message.trim().is_empty() {
                format!("Check-in service returned HTTP {}", status.as_u16())
            } else {
                message
            },
        });
    }

    Err(CheckInFailure::from_legacy_message(message))
}

fn text_at(data: &Value, pointer: &str) -> Option<String> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn holder_name(data: &Value) -> Option<String> {
    text_at(data, "/ticket/attendee_name").or_else(|| text_at(data, "/customer/name"))
}

fn ticket_type_name(data: &Value) -> Option<String> {
    text_at(data, "/ticket/ticket_type").or_else(|| text_at(data, "/ticket/ticket_type/name"))
}
