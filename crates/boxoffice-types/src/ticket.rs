//! # Ticket: the signed, single-use entry artifact
//!
//! ## State Machine
//!
//! ```text
//!   ┌───────┐  all participants admitted  ┌──────┐
//!   │ VALID ├────────────────────────────▶│ USED │
//!   └───┬───┘                             └──────┘
//!       │ cancel
//!       ▼
//!   ┌───────────┐
//!   │ CANCELLED │
//!   └───────────┘
//! ```
//!
//! Transitions are one-way. A ticket is created exactly once per reservation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::PAYLOAD_SEPARATOR;
use crate::{BoxofficeError, ReservationId, Result, TicketId, UserId};

/// Lifecycle state of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Issued, entry still open.
    Valid,
    /// Every seat has entered. **Irreversible.**
    Used,
    /// Voided by staff.
    Cancelled,
}

impl TicketStatus {
    /// Can this ticket transition to the given target state?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!((self, target), (Self::Valid, Self::Used | Self::Cancelled))
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Used => write!(f, "used"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The content of the QR code: identity, issuance time, and an HMAC binding
/// all three.
///
/// Field names are the externally scanned contract and must not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPayload {
    pub ticket_number: String,
    pub reservation_id: ReservationId,
    /// Seconds since UNIX epoch.
    pub timestamp: i64,
    /// Lowercase hex HMAC-SHA256 over [`SignedPayload::message`].
    pub signature: String,
}

impl SignedPayload {
    /// Canonical signed message: `ticket_number|reservation_id|timestamp`.
    #[must_use]
    pub fn message(&self) -> String {
        signing_message(&self.ticket_number, self.reservation_id, self.timestamp)
    }
}

/// Build the canonical signed message for the given fields.
#[must_use]
pub fn signing_message(ticket_number: &str, reservation_id: ReservationId, timestamp: i64) -> String {
    format!("{ticket_number}{PAYLOAD_SEPARATOR}{reservation_id}{PAYLOAD_SEPARATOR}{timestamp}")
}

/// Where the rendered artifacts live. Empty until rendering succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketArtifacts {
    pub qr_image_ref: Option<String>,
    pub pdf_ref: Option<String>,
}

impl TicketArtifacts {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.qr_image_ref.is_some() && self.pdf_ref.is_some()
    }
}

/// An issued ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    /// Unique: one ticket per reservation.
    pub reservation_id: ReservationId,
    /// Unique, human readable: `PREFIX-<base36 ms>-<base36 random>`.
    pub ticket_number: String,
    pub payload: SignedPayload,
    pub artifacts: TicketArtifacts,
    pub status: TicketStatus,
    pub generated_by: UserId,
    pub generated_at: DateTime<Utc>,
}

impl Ticket {
    /// Mark the ticket fully used.
    ///
    /// # Errors
    /// Returns `TicketNotValid` unless the ticket is currently valid.
    pub fn mark_used(&mut self) -> Result<()> {
        self.transition(TicketStatus::Used)
    }

    /// Void the ticket.
    ///
    /// # Errors
    /// Returns `TicketNotValid` unless the ticket is currently valid.
    pub fn mark_cancelled(&mut self) -> Result<()> {
        self.transition(TicketStatus::Cancelled)
    }

    /// # Errors
    /// Returns `TicketNotValid` unless the ticket is currently valid.
    pub fn ensure_valid(&self) -> Result<()> {
        if self.status == TicketStatus::Valid {
            Ok(())
        } else {
            Err(self.not_valid())
        }
    }

    fn transition(&mut self, target: TicketStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(self.not_valid());
        }
        self.status = target;
        Ok(())
    }

    fn not_valid(&self) -> BoxofficeError {
        BoxofficeError::TicketNotValid {
            ticket_number: self.ticket_number.clone(),
            status: self.status,
        }
    }
}
