//! Entrance scanning.
//!
//! `decode` is the read-only inspect path used by scanner UIs. Admission runs
//! under the reservation row lock: each call admits one participant (or the
//! whole group) and flips the ticket to `used` only once every participant
//! has entered.

use boxoffice_signing::TicketSigner;
use boxoffice_types::{
    Actor, AuditAction, BoxofficeError, EntityType, Participant, ParticipantId, Permission,
    Reservation, Result, Ticket, TicketStatus, all_admitted, audit::describe,
};
use serde::Serialize;
use serde_json::json;

use crate::audit::{self, Attempt};
use crate::backoffice::Backoffice;

/// A verified QR payload resolved to its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTicket {
    pub ticket: Ticket,
    pub reservation: Reservation,
    pub participants: Vec<Participant>,
}

/// Outcome of admitting one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// `used` once the whole group is in, `valid` otherwise.
    pub ticket_status: TicketStatus,
    pub participant: Participant,
}

/// Outcome of admitting a whole group at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupAdmission {
    pub ticket: Ticket,
    /// Participants admitted by this call.
    pub admitted: usize,
    pub participants: Vec<Participant>,
}

/// Entrance progress over all issued tickets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub total_tickets: u64,
    pub used: u64,
    pub valid: u64,
    pub cancelled: u64,
    /// `used / total` in whole percent, rounded half up; 0 without tickets.
    pub scanned_percentage: u64,
}

impl Backoffice {
    /// Verify a scanned QR payload and load what it refers to. Mutates
    /// nothing.
    ///
    /// # Errors
    /// - `PermissionDenied` without `tickets.view`
    /// - `MalformedPayload` if `raw` is not a payload
    /// - `InvalidSignature` if the signature does not match, or the payload
    ///   names a different reservation than the stored ticket
    /// - `TicketNotFound` for an unknown number
    pub async fn decode(&self, raw: &str, actor: &Actor) -> Result<DecodedTicket> {
        self.authorize(actor, Permission::TicketsView)?;

        let payload = TicketSigner::decode_payload(raw)?;
        self.signer.verify_payload(&payload)?;

        let ticket = self
            .store
            .ticket_by_number(&payload.ticket_number)
            .await?
            .ok_or_else(|| BoxofficeError::TicketNotFound(payload.ticket_number.clone()))?;
        if ticket.reservation_id != payload.reservation_id {
            tracing::warn!(
                ticket_number = %payload.ticket_number,
                claimed = %payload.reservation_id,
                actual = %ticket.reservation_id,
                "payload reservation does not match ticket"
            );
            return Err(BoxofficeError::InvalidSignature);
        }

        let reservation = self.load_reservation(ticket.reservation_id).await?;
        let participants = self.store.participants_for(ticket.reservation_id).await?;
        tracing::debug!(
            ticket_number = %ticket.ticket_number,
            status = %ticket.status,
            "ticket decoded"
        );
        Ok(DecodedTicket {
            ticket,
            reservation,
            participants,
        })
    }

    /// Admit one participant of a ticket's group.
    ///
    /// # Errors
    /// - `PermissionDenied` without `scan.validate`
    /// - `TicketNotFound`, `ParticipantNotFound` (also for a participant of
    ///   another reservation)
    /// - `TicketNotValid` if the ticket is used or cancelled
    /// - `ParticipantAlreadyValidated` on a second scan of the same person
    pub async fn validate_participant(
        &self,
        ticket_number: &str,
        participant_id: ParticipantId,
        actor: &Actor,
    ) -> Result<Admission> {
        let attempt = Attempt::new(
            actor,
            Permission::ScanValidate,
            AuditAction::EntryValidate,
            EntityType::Ticket,
            ticket_number,
        );
        let result = self
            .admit_participant(ticket_number, participant_id, &attempt)
            .await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn admit_participant(
        &self,
        ticket_number: &str,
        participant_id: ParticipantId,
        attempt: &Attempt<'_>,
    ) -> Result<Admission> {
        self.authorize(attempt.actor, Permission::ScanValidate)?;
        let reservation_id = self.ticket(ticket_number).await?.reservation_id;

        let mut tx = self.store.begin().await?;
        tx.lock_reservation(reservation_id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(reservation_id))?;
        let mut ticket = tx
            .ticket_by_number(ticket_number)
            .await?
            .ok_or_else(|| BoxofficeError::TicketNotFound(ticket_number.to_string()))?;
        let mut participants = tx.participants(reservation_id).await?;
        let index = participants
            .iter()
            .position(|p| p.id == participant_id)
            .ok_or(BoxofficeError::ParticipantNotFound(participant_id))?;

        ticket.ensure_valid()?;
        participants[index].admit()?;
        tx.update_participant(&participants[index]).await?;

        if all_admitted(&participants) {
            ticket.mark_used()?;
            tx.update_ticket(&ticket).await?;
        }

        let participant = participants.swap_remove(index);
        tx.append_audit(
            attempt
                .entry()
                .describe(describe::entry_validated(&participant.name))
                .with_changes(json!({
                    "participant_id": participant.id,
                    "reservation_id": reservation_id,
                    "ticket_status": ticket.status,
                })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            ticket_number,
            %participant_id,
            actor = %attempt.actor.user_id,
            operation = "entry.validate",
            ticket_status = %ticket.status,
            "participant admitted"
        );
        Ok(Admission {
            ticket_status: ticket.status,
            participant,
        })
    }

    /// Admit every participant not yet in and mark the ticket used, in one
    /// transaction. A ticket without participants is simply marked used.
    ///
    /// # Errors
    /// - `PermissionDenied` without `scan.validate`
    /// - `TicketNotFound`
    /// - `TicketNotValid` if the ticket is used or cancelled
    pub async fn admit_all(&self, ticket_number: &str, actor: &Actor) -> Result<GroupAdmission> {
        let attempt = Attempt::new(
            actor,
            Permission::ScanValidate,
            AuditAction::EntryAdmitAll,
            EntityType::Ticket,
            ticket_number,
        );
        let result = self.admit_group(ticket_number, &attempt).await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn admit_group(
        &self,
        ticket_number: &str,
        attempt: &Attempt<'_>,
    ) -> Result<GroupAdmission> {
        self.authorize(attempt.actor, Permission::ScanValidate)?;
        let reservation_id = self.ticket(ticket_number).await?.reservation_id;

        let mut tx = self.store.begin().await?;
        tx.lock_reservation(reservation_id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(reservation_id))?;
        let mut ticket = tx
            .ticket_by_number(ticket_number)
            .await?
            .ok_or_else(|| BoxofficeError::TicketNotFound(ticket_number.to_string()))?;
        ticket.ensure_valid()?;

        let mut participants = tx.participants(reservation_id).await?;
        let mut admitted = 0;
        for participant in participants.iter_mut().filter(|p| !p.entrance_validated) {
            participant.admit()?;
            tx.update_participant(participant).await?;
            admitted += 1;
        }
        ticket.mark_used()?;
        tx.update_ticket(&ticket).await?;

        tx.append_audit(
            attempt
                .entry()
                .describe(describe::entry_admitted(participants.len()))
                .with_changes(json!({
                    "reservation_id": reservation_id,
                    "admitted": admitted,
                    "ticket_status": ticket.status,
                })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            ticket_number,
            actor = %attempt.actor.user_id,
            operation = "entry.admit_all",
            admitted,
            "group admitted"
        );
        Ok(GroupAdmission {
            ticket,
            admitted,
            participants,
        })
    }

    /// Entrance statistics over every issued ticket.
    ///
    /// # Errors
    /// `PermissionDenied` without `tickets.view`; storage failures.
    pub async fn scan_stats(&self, actor: &Actor) -> Result<ScanStats> {
        self.authorize(actor, Permission::TicketsView)?;
        let counts = self.store.ticket_counts().await?;
        let scanned_percentage = if counts.total == 0 {
            0
        } else {
            (counts.used * 100 + counts.total / 2) / counts.total
        };
        Ok(ScanStats {
            total_tickets: counts.total,
            used: counts.used,
            valid: counts.valid,
            cancelled: counts.cancelled,
            scanned_percentage,
        })
    }

    async fn ticket(&self, ticket_number: &str) -> Result<Ticket> {
        self.store
            .ticket_by_number(ticket_number)
            .await?
            .ok_or_else(|| BoxofficeError::TicketNotFound(ticket_number.to_string()))
    }
}
