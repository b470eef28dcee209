//! Attendees listed under a reservation.
//!
//! Group tickets are admitted seat by seat: each participant's
//! `entrance_validated` flag flips independently, and the ticket only becomes
//! `used` once every participant has entered.

use serde::{Deserialize, Serialize};

use crate::{BoxofficeError, ParticipantId, ReservationId, Result, TicketId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub reservation_id: ReservationId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub entrance_validated: bool,
    /// Set once the reservation's ticket is issued.
    pub ticket_id: Option<TicketId>,
}

impl Participant {
    #[must_use]
    pub fn new(reservation_id: ReservationId, name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::new(),
            reservation_id,
            name: name.into(),
            email: None,
            phone: None,
            entrance_validated: false,
            ticket_id: None,
        }
    }

    /// Admit this participant at the entrance.
    ///
    /// # Errors
    /// Returns `ParticipantAlreadyValidated` on a second admission.
    pub fn admit(&mut self) -> Result<()> {
        if self.entrance_validated {
            return Err(BoxofficeError::ParticipantAlreadyValidated(self.id));
        }
        self.entrance_validated = true;
        Ok(())
    }
}

/// Attendee details supplied at reservation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParticipant {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl NewParticipant {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
        }
    }
}

/// `true` once every participant has entered. An empty group is never
/// "all admitted" through this check; callers handle that case explicitly.
#[must_use]
pub fn all_admitted(participants: &[Participant]) -> bool {
    !participants.is_empty() && participants.iter().all(|p| p.entrance_validated)
}
