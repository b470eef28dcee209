//! Reservation desk: open and cancel reservations.

use boxoffice_types::{
    Actor, AuditAction, BoxofficeError, EntityType, NewParticipant, PackSnapshot, Participant,
    Payer, Permission, Reservation, ReservationId, ReservationSummary, Result, audit::describe,
};
use serde_json::json;

use crate::audit::{self, Attempt};
use crate::backoffice::Backoffice;

/// Desk input for a new reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub payer: Payer,
    /// Pack as it is priced right now; frozen into the reservation.
    pub pack: PackSnapshot,
    pub quantity: u32,
    pub participants: Vec<NewParticipant>,
}

impl Backoffice {
    /// Open a `pending` reservation with its participants.
    ///
    /// # Errors
    /// - `InvalidQuantity`, `InvalidInput` (negative price, overflow, blank
    ///   participant name)
    /// - `PermissionDenied` without `reservations.edit`
    pub async fn create_reservation(
        &self,
        input: NewReservation,
        actor: &Actor,
    ) -> Result<Reservation> {
        let reservation = Reservation::open(input.payer, input.pack, input.quantity)?;
        if let Some(blank) = input.participants.iter().find(|p| p.name.trim().is_empty()) {
            return Err(BoxofficeError::InvalidInput {
                reason: format!("participant name is blank: {blank:?}"),
            });
        }

        let attempt = Attempt::new(
            actor,
            Permission::ReservationsEdit,
            AuditAction::ReservationCreate,
            EntityType::Reservation,
            reservation.id,
        );
        let result = self
            .insert_reservation(reservation, input.participants, &attempt)
            .await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn insert_reservation(
        &self,
        reservation: Reservation,
        participants: Vec<NewParticipant>,
        attempt: &Attempt<'_>,
    ) -> Result<Reservation> {
        self.authorize(attempt.actor, Permission::ReservationsEdit)?;

        let mut tx = self.store.begin().await?;
        tx.insert_reservation(&reservation).await?;
        for new in &participants {
            let mut participant = Participant::new(reservation.id, new.name.trim());
            participant.email.clone_from(&new.email);
            participant.phone.clone_from(&new.phone);
            tx.insert_participant(&participant).await?;
        }
        tx.append_audit(
            attempt
                .entry()
                .describe(describe::reservation_created(&reservation.payer.name))
                .with_changes(json!({
                    "pack": reservation.pack.name,
                    "template": reservation.pack.template,
                    "unit_price": reservation.pack.unit_price,
                    "quantity": reservation.quantity,
                    "total_price": reservation.total_price,
                    "participants": participants.len(),
                })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id = %reservation.id,
            actor = %attempt.actor.user_id,
            operation = "reservation.create",
            total_price = reservation.total_price,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Cancel a reservation. One-way; blocks further payments and issuance.
    ///
    /// # Errors
    /// - `PermissionDenied` without `reservations.edit`
    /// - `ReservationNotFound`
    /// - `InvalidTransition` if the reservation is ticketed or already cancelled
    pub async fn cancel_reservation(
        &self,
        reservation_id: ReservationId,
        actor: &Actor,
    ) -> Result<ReservationSummary> {
        let attempt = Attempt::new(
            actor,
            Permission::ReservationsEdit,
            AuditAction::ReservationCancel,
            EntityType::Reservation,
            reservation_id,
        );
        let result = self.cancel(reservation_id, &attempt).await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn cancel(
        &self,
        reservation_id: ReservationId,
        attempt: &Attempt<'_>,
    ) -> Result<ReservationSummary> {
        self.authorize(attempt.actor, Permission::ReservationsEdit)?;

        let mut tx = self.store.begin().await?;
        let mut reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(reservation_id))?;
        let status_before = reservation.status;
        reservation.cancel()?;

        tx.update_reservation(&reservation).await?;
        tx.append_audit(
            attempt
                .entry()
                .describe(describe::reservation_cancelled())
                .with_changes(json!({
                    "status_before": status_before,
                    "status_after": reservation.status,
                    "total_paid": reservation.total_paid,
                })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            %reservation_id,
            actor = %attempt.actor.user_id,
            operation = "reservation.cancel",
            "reservation cancelled"
        );
        Ok(reservation.summary())
    }

    /// `{id, total_price, total_paid, remaining_amount, status}`.
    ///
    /// # Errors
    /// `ReservationNotFound` if the reservation does not exist.
    pub async fn reservation_summary(
        &self,
        reservation_id: ReservationId,
    ) -> Result<ReservationSummary> {
        Ok(self.load_reservation(reservation_id).await?.summary())
    }
}
