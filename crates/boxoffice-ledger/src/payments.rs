//! Payment ledger: add and delete payments against a locked reservation.
//!
//! Both operations run lock → recompute → write → audit → commit in one
//! transaction. The reservation row lock spans the whole read-compute-write
//! window, so concurrent payments on one reservation are serialized and the
//! `0 <= total_paid <= total_price` invariant is checked against fresh state.

use std::time::Instant;

use boxoffice_store::Transaction;
use boxoffice_types::{
    Actor, AuditAction, AuditEntry, BoxofficeError, EntityType, NewPayment, Payment, PaymentId,
    Permission, ProofUpload, Reservation, ReservationId, ReservationSummary, Result,
    audit::describe,
};
use chrono::Utc;
use serde_json::json;

use crate::audit::{self, Attempt};
use crate::backoffice::Backoffice;
use crate::guard::payment_fingerprint;
use crate::notify::Notification;

/// Result of a successful `add_payment`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub reservation: ReservationSummary,
}

impl Backoffice {
    /// Record a payment and recompute the reservation balance.
    ///
    /// The proof file, if any, is stored before the payment row is written
    /// and removed again if the transaction fails. A payment confirmation is
    /// queued after commit.
    ///
    /// The duplicate guard matches on reservation, actor, amount and method,
    /// plus [`NewPayment::request_id`] when the client sends one. Without a
    /// request id, a second equal instalment by the same cashier inside the
    /// guard window is refused as a double submit.
    ///
    /// # Errors
    /// - `InvalidAmount` for a non-positive amount (before any lock)
    /// - `PermissionDenied` without `payments.add`
    /// - `DuplicateRequest` for a double submit inside the guard window
    /// - `ReservationNotFound`, `ReservationCancelled`, `PaymentsFrozen`
    /// - `AmountExceedsRemaining` if the payment would overpay
    pub async fn add_payment(
        &self,
        reservation_id: ReservationId,
        input: NewPayment,
        actor: &Actor,
        proof: Option<ProofUpload>,
    ) -> Result<PaymentReceipt> {
        let attempt = Attempt::new(
            actor,
            Permission::PaymentsAdd,
            AuditAction::PaymentAdd,
            EntityType::Reservation,
            reservation_id,
        );
        let result = self
            .guarded_add_payment(reservation_id, &input, &attempt, proof.as_ref())
            .await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn guarded_add_payment(
        &self,
        reservation_id: ReservationId,
        input: &NewPayment,
        attempt: &Attempt<'_>,
        proof: Option<&ProofUpload>,
    ) -> Result<PaymentReceipt> {
        input.validate()?;
        self.authorize(attempt.actor, Permission::PaymentsAdd)?;

        let fingerprint = payment_fingerprint(
            reservation_id,
            attempt.actor.user_id,
            input.amount,
            input.method,
            input.request_id.as_deref(),
        );
        self.guard.claim(fingerprint, Instant::now())?;

        match self.record_payment(reservation_id, input, attempt, proof).await {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.guard.release(&fingerprint);
                Err(e)
            }
        }
    }

    async fn record_payment(
        &self,
        reservation_id: ReservationId,
        input: &NewPayment,
        attempt: &Attempt<'_>,
        proof: Option<&ProofUpload>,
    ) -> Result<PaymentReceipt> {
        let mut tx = self.store.begin().await?;
        let mut reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(reservation_id))?;

        let change = reservation.apply_payment(input.amount)?;

        let proof_ref = match proof {
            Some(upload) => Some(self.proofs.store(reservation_id, upload).await?),
            None => None,
        };

        let payment = Payment {
            id: PaymentId::new(),
            reservation_id,
            amount: input.amount,
            method: input.method,
            comment: input.comment.clone(),
            proof_ref: proof_ref.clone(),
            created_by: attempt.actor.user_id,
            created_at: Utc::now(),
        };

        let entry = attempt
            .entry()
            .describe(describe::payment_added(payment.amount, payment.method))
            .with_changes(json!({
                "payment_id": payment.id,
                "amount": payment.amount,
                "method": payment.method,
                "proof": payment.proof_ref,
                "balance": change,
            }));

        if let Err(e) = write_payment(tx, &payment, &reservation, entry).await {
            if let Some(proof_ref) = &proof_ref {
                self.discard_proof(proof_ref).await;
            }
            return Err(e);
        }

        tracing::info!(
            %reservation_id,
            actor = %attempt.actor.user_id,
            operation = "payment.add",
            amount = payment.amount,
            method = %payment.method,
            total_paid = reservation.total_paid,
            status = %reservation.status,
            "payment added"
        );

        self.queue_payment_confirmation(&reservation, &payment).await;

        Ok(PaymentReceipt {
            payment,
            reservation: reservation.summary(),
        })
    }

    /// Remove a payment and recompute the reservation balance.
    ///
    /// Any proof file is deleted after commit, best-effort.
    ///
    /// # Errors
    /// - `PermissionDenied` without `payments.delete`
    /// - `ReservationNotFound`, or `PaymentNotFound` if the payment is
    ///   missing or belongs to another reservation
    /// - `PaymentsFrozen` once a ticket exists, `ReservationCancelled` if cancelled
    pub async fn delete_payment(
        &self,
        payment_id: PaymentId,
        reservation_id: ReservationId,
        actor: &Actor,
    ) -> Result<ReservationSummary> {
        let attempt = Attempt::new(
            actor,
            Permission::PaymentsDelete,
            AuditAction::PaymentDelete,
            EntityType::Payment,
            payment_id,
        );
        let result = self
            .remove_payment(payment_id, reservation_id, &attempt)
            .await;
        audit::settle(self.store.as_ref(), &attempt, result).await
    }

    async fn remove_payment(
        &self,
        payment_id: PaymentId,
        reservation_id: ReservationId,
        attempt: &Attempt<'_>,
    ) -> Result<ReservationSummary> {
        self.authorize(attempt.actor, Permission::PaymentsDelete)?;

        let mut tx = self.store.begin().await?;
        let mut reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(reservation_id))?;

        let payment = tx
            .payment(payment_id)
            .await?
            .filter(|p| p.reservation_id == reservation_id)
            .ok_or(BoxofficeError::PaymentNotFound(payment_id))?;

        let change = reservation.reverse_payment(payment.amount)?;

        let entry = attempt
            .entry()
            .describe(describe::payment_deleted(payment.amount))
            .with_changes(json!({
                "reservation_id": reservation_id,
                "amount": payment.amount,
                "method": payment.method,
                "balance": change,
            }));

        tx.delete_payment(payment_id).await?;
        tx.update_reservation(&reservation).await?;
        tx.append_audit(entry).await?;
        tx.commit().await?;

        tracing::info!(
            %reservation_id,
            %payment_id,
            actor = %attempt.actor.user_id,
            operation = "payment.delete",
            amount = payment.amount,
            total_paid = reservation.total_paid,
            status = %reservation.status,
            "payment deleted"
        );

        if let Some(proof_ref) = &payment.proof_ref {
            self.discard_proof(proof_ref).await;
        }

        Ok(reservation.summary())
    }

    /// Payments of a reservation, oldest first.
    ///
    /// # Errors
    /// `ReservationNotFound` if the reservation does not exist.
    pub async fn payments_for(&self, reservation_id: ReservationId) -> Result<Vec<Payment>> {
        self.load_reservation(reservation_id).await?;
        self.store.payments_for(reservation_id).await
    }

    async fn discard_proof(&self, proof_ref: &str) {
        if let Err(e) = self.proofs.remove(proof_ref).await {
            tracing::warn!(proof_ref, error = %e, "failed to remove payment proof");
        }
    }

    async fn queue_payment_confirmation(&self, reservation: &Reservation, payment: &Payment) {
        let all_payments = match self.store.payments_for(reservation.id).await {
            Ok(payments) => payments,
            Err(e) => {
                tracing::warn!(
                    reservation_id = %reservation.id,
                    error = %e,
                    "could not load payment history for confirmation"
                );
                vec![payment.clone()]
            }
        };
        self.notifications.dispatch(Notification::PaymentConfirmation {
            reservation: reservation.clone(),
            payment: payment.clone(),
            all_payments,
        });
    }
}

/// Stage the payment, the balance update and the audit entry, then commit.
/// Dropping `tx` on an early return rolls everything back.
async fn write_payment(
    mut tx: Box<dyn Transaction>,
    payment: &Payment,
    reservation: &Reservation,
    entry: AuditEntry,
) -> Result<()> {
    tx.insert_payment(payment).await?;
    tx.update_reservation(reservation).await?;
    tx.append_audit(entry).await?;
    tx.commit().await
}
