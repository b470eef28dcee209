//! Ticket issuance: exactly one signed ticket per fully paid reservation.
//!
//! ## Flow
//!
//! 1. Lock the reservation, check it is paid and not yet ticketed.
//! 2. Draw a ticket number, sign `number|reservation_id|timestamp`.
//! 3. Insert the ticket, link participants, move the reservation to
//!    `ticket_generated`, audit, commit.
//! 4. After commit: render QR + PDF, record the artifact references in a
//!    follow-up transaction, queue the delivery e-mail.
//!
//! The row lock serializes concurrent issuance; the unique constraint on
//! `tickets.reservation_id` still holds if the lock does not. A collision on
//! `tickets.ticket_number` is retried with a fresh number.
//!
//! Rendering failures are logged and leave a valid ticket without artifact
//! references. [`Backoffice::regenerate_artifacts`] renders them again from
//! the stored payload.

use boxoffice_store::constraints;
use boxoffice_types::{
    Actor, AuditAction, BoxofficeError, EntityType, Participant, Permission, Reservation,
    ReservationId, ReservationSummary, Result, Ticket, TicketArtifacts, TicketId, TicketStatus,
    TicketTemplate, audit::describe, constants::MAX_TICKET_NUMBER_ATTEMPTS,
};
use chrono::Utc;
use serde_json::json;

use crate::audit::{self, Attempt};
use crate::backoffice::Backoffice;
use crate::notify::Notification;
use crate::renderer::{RenderRequest, RenderedPdf};

/// Result of a successful `create_ticket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTicket {
    /// Carries artifact references when rendering succeeded.
    pub ticket: Ticket,
    pub reservation: ReservationSummary,
}

/// What the issuance transaction committed.
struct Committed {
    ticket: Ticket,
    reservation: Reservation,
    participants: Vec<Participant>,
}

impl Backoffice {
    /// Issue the reservation's ticket.
    ///
    /// # Errors
    /// - `PermissionDenied` without `tickets.generate`
    /// - `ReservationNotFound`, `ReservationCancelled`
    /// - `NotFullyPaid` while a balance is open
    /// - `TicketAlreadyGenerated` on every call after the first success
    /// - `TicketNumberExhausted` if every drawn number collided
    pub async fn create_ticket(
        &self,
        reservation_id: ReservationId,
        actor: &Actor,
    ) -> Result<IssuedTicket> {
        let attempt = Attempt::new(
            actor,
            Permission::TicketsGenerate,
            AuditAction::TicketGenerate,
            EntityType::Reservation,
            reservation_id,
        );
        let result = self.issue(reservation_id, &attempt).await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn issue(
        &self,
        reservation_id: ReservationId,
        attempt: &Attempt<'_>,
    ) -> Result<IssuedTicket> {
        self.authorize(attempt.actor, Permission::TicketsGenerate)?;

        let committed = self.issue_with_fresh_number(reservation_id, attempt).await?;
        let Committed {
            mut ticket,
            reservation,
            participants,
        } = committed;

        tracing::info!(
            %reservation_id,
            actor = %attempt.actor.user_id,
            operation = "ticket.generate",
            ticket_number = %ticket.ticket_number,
            "ticket generated"
        );

        let rendered = self
            .render_and_record(&ticket, &reservation, attempt.actor)
            .await;
        let pdf = match rendered {
            Ok((updated, pdf)) => {
                ticket = updated;
                Some(pdf.bytes)
            }
            Err(e) => {
                tracing::warn!(
                    %reservation_id,
                    ticket_number = %ticket.ticket_number,
                    error = %e,
                    "ticket artifacts not rendered; ticket stays valid, regenerate later"
                );
                None
            }
        };

        self.notifications.dispatch(Notification::TicketDelivery {
            reservation: reservation.clone(),
            ticket: ticket.clone(),
            participants,
            pdf,
        });

        Ok(IssuedTicket {
            ticket,
            reservation: reservation.summary(),
        })
    }

    async fn issue_with_fresh_number(
        &self,
        reservation_id: ReservationId,
        attempt: &Attempt<'_>,
    ) -> Result<Committed> {
        for attempt_no in 1..=MAX_TICKET_NUMBER_ATTEMPTS {
            let ticket_number = self.numbers.next_number();
            match self
                .issue_once(reservation_id, &ticket_number, attempt)
                .await
            {
                Err(BoxofficeError::UniqueViolation { constraint })
                    if constraint == constraints::TICKET_NUMBER =>
                {
                    tracing::warn!(
                        %reservation_id,
                        %ticket_number,
                        attempt = attempt_no,
                        "ticket number collision, drawing a new one"
                    );
                }
                Err(BoxofficeError::UniqueViolation { constraint })
                    if constraint == constraints::TICKET_RESERVATION =>
                {
                    return Err(BoxofficeError::TicketAlreadyGenerated(reservation_id));
                }
                other => return other,
            }
        }
        tracing::error!(
            %reservation_id,
            attempts = MAX_TICKET_NUMBER_ATTEMPTS,
            "no unique ticket number found"
        );
        Err(BoxofficeError::TicketNumberExhausted {
            attempts: MAX_TICKET_NUMBER_ATTEMPTS,
        })
    }

    async fn issue_once(
        &self,
        reservation_id: ReservationId,
        ticket_number: &str,
        attempt: &Attempt<'_>,
    ) -> Result<Committed> {
        let mut tx = self.store.begin().await?;
        let mut reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(reservation_id))?;

        let status_before = reservation.status;
        reservation.mark_ticket_generated()?;
        if tx.ticket_for_reservation(reservation_id).await?.is_some() {
            return Err(BoxofficeError::TicketAlreadyGenerated(reservation_id));
        }

        let now = Utc::now();
        let payload = self
            .signer
            .issue(ticket_number, reservation_id, now.timestamp());
        let ticket = Ticket {
            id: TicketId::new(),
            reservation_id,
            ticket_number: ticket_number.to_string(),
            payload,
            artifacts: TicketArtifacts::default(),
            status: TicketStatus::Valid,
            generated_by: attempt.actor.user_id,
            generated_at: now,
        };
        tx.insert_ticket(&ticket).await?;

        let mut participants = tx.participants(reservation_id).await?;
        for participant in &mut participants {
            participant.ticket_id = Some(ticket.id);
            tx.update_participant(participant).await?;
        }

        tx.update_reservation(&reservation).await?;
        tx.append_audit(
            attempt
                .entry()
                .describe(describe::ticket_generated(ticket_number))
                .with_changes(json!({
                    "ticket_id": ticket.id,
                    "ticket_number": ticket_number,
                    "participants": participants.len(),
                    "status_before": status_before,
                    "status_after": reservation.status,
                })),
        )
        .await?;
        tx.commit().await?;

        Ok(Committed {
            ticket,
            reservation,
            participants,
        })
    }

    /// Render the artifacts of an existing ticket again from its stored
    /// payload and record the new references. Same number, same signature.
    ///
    /// # Errors
    /// - `PermissionDenied` without `tickets.generate`
    /// - `TicketNotFound`, or `TicketNotValid` for a cancelled ticket
    /// - `InvalidSignature` if the stored payload no longer verifies
    /// - any renderer or storage failure
    pub async fn regenerate_artifacts(&self, ticket_number: &str, actor: &Actor) -> Result<Ticket> {
        let attempt = Attempt::new(
            actor,
            Permission::TicketsGenerate,
            AuditAction::TicketArtifacts,
            EntityType::Ticket,
            ticket_number,
        );
        let result = self.rerender(ticket_number, &attempt).await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn rerender(&self, ticket_number: &str, attempt: &Attempt<'_>) -> Result<Ticket> {
        self.authorize(attempt.actor, Permission::TicketsGenerate)?;

        let ticket = self
            .store
            .ticket_by_number(ticket_number)
            .await?
            .ok_or_else(|| BoxofficeError::TicketNotFound(ticket_number.to_string()))?;
        if ticket.status == TicketStatus::Cancelled {
            return Err(BoxofficeError::TicketNotValid {
                ticket_number: ticket.ticket_number,
                status: ticket.status,
            });
        }
        self.signer.verify_payload(&ticket.payload)?;

        let reservation = self.load_reservation(ticket.reservation_id).await?;
        let (updated, _) = self
            .render_and_record(&ticket, &reservation, attempt.actor)
            .await?;
        tracing::info!(
            ticket_number,
            actor = %attempt.actor.user_id,
            operation = "ticket.artifacts",
            "ticket artifacts regenerated"
        );
        Ok(updated)
    }

    async fn render_and_record(
        &self,
        ticket: &Ticket,
        reservation: &Reservation,
        actor: &Actor,
    ) -> Result<(Ticket, RenderedPdf)> {
        let qr_image_ref = self.renderer.render_qr(&ticket.payload).await?;
        let (template, layout) = self.templates.resolve(reservation.pack.template);
        let pdf = self
            .renderer
            .render_pdf(&RenderRequest {
                reservation,
                ticket_number: &ticket.ticket_number,
                qr_image_ref: &qr_image_ref,
                template,
                layout,
            })
            .await?;

        let artifacts = TicketArtifacts {
            qr_image_ref: Some(qr_image_ref),
            pdf_ref: Some(pdf.pdf_ref.clone()),
        };
        let updated = self.record_artifacts(ticket, artifacts, template, actor).await?;
        Ok((updated, pdf))
    }

    async fn record_artifacts(
        &self,
        ticket: &Ticket,
        artifacts: TicketArtifacts,
        template: TicketTemplate,
        actor: &Actor,
    ) -> Result<Ticket> {
        let mut tx = self.store.begin().await?;
        tx.lock_reservation(ticket.reservation_id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(ticket.reservation_id))?;
        let mut current = tx
            .ticket_by_number(&ticket.ticket_number)
            .await?
            .ok_or_else(|| BoxofficeError::TicketNotFound(ticket.ticket_number.clone()))?;

        current.artifacts = artifacts;
        tx.update_ticket(&current).await?;
        tx.append_audit(
            Attempt::new(
                actor,
                Permission::TicketsGenerate,
                AuditAction::TicketArtifacts,
                EntityType::Ticket,
                &current.ticket_number,
            )
            .entry()
            .describe(describe::artifacts_rendered(&current.ticket_number))
            .with_changes(json!({
                "template": template,
                "qr_image_ref": current.artifacts.qr_image_ref,
                "pdf_ref": current.artifacts.pdf_ref,
            })),
        )
        .await?;
        tx.commit().await?;
        Ok(current)
    }
}
