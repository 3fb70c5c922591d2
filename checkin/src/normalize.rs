//! Scan input normalization.
//!
//! A scanned QR code usually carries a full ticket URL, a barcode carries the
//! bare code, and an operator may type either. All of them reduce to one
//! [`TicketCode`]:
//!
//! 1. a `/t/<code>` path segment yields `<code>`;
//! 2. otherwise a `/verify/<code>` path segment yields `<code>`;
//! 3. otherwise the trimmed input is used verbatim.
//!
//! `<code>` is a run of `[A-Za-z0-9_-]`, so a trailing slash or query string
//! ends it.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

use crate::types::TicketCode;

#[allow(clippy::expect_used)] // literal pattern
static TICKET_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/t/([A-Za-z0-9_-]+)").expect("ticket path pattern is valid"));

#[allow(clippy::expect_used)] // literal pattern
static VERIFY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/verify/([A-Za-z0-9_-]+)").expect("verify path pattern is valid")
});

/// Input that cannot become a ticket code
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeError {
    /// Nothing left after trimming
    #[error("scan input is empty")]
    Empty,
}

/// Reduce raw scan input to a ticket code
///
/// # Errors
///
/// Returns [`NormalizeError::Empty`] if the input is empty or whitespace only.
pub fn normalize(input: &str) -> Result<TicketCode, NormalizeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let code = [&*TICKET_PATH, &*VERIFY_PATH]
        .into_iter()
        .find_map(|pattern| pattern.captures(trimmed))
        .and_then(|captures| captures.get(1))
        .map_or(trimmed, |segment| segment.as_str());

    Ok(TicketCode::from_normalized(code.to_string()))
}
