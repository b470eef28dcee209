//! Storage contracts used by the core services.

use async_trait::async_trait;
use boxoffice_types::{
    AuditEntry, Participant, Payment, PaymentId, Reservation, ReservationId, Result, Ticket,
};

/// Names reported in `UniqueViolation` errors.
pub mod constraints {
    /// At most one ticket per reservation.
    pub const TICKET_RESERVATION: &str = "tickets.reservation_id";
    /// Ticket numbers are globally unique.
    pub const TICKET_NUMBER: &str = "tickets.ticket_number";
}

/// Ticket totals by status, for scan statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TicketCounts {
    pub total: u64,
    pub valid: u64,
    pub used: u64,
    pub cancelled: u64,
}

/// Committed-state reads and transaction entry point.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction. Dropping it without [`Transaction::commit`] rolls
    /// every staged write back.
    async fn begin(&self) -> Result<Box<dyn Transaction>>;

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Payments of a reservation, oldest first.
    async fn payments_for(&self, reservation_id: ReservationId) -> Result<Vec<Payment>>;

    /// Participants of a reservation, in insertion order.
    async fn participants_for(&self, reservation_id: ReservationId) -> Result<Vec<Participant>>;

    async fn ticket_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>>;

    async fn ticket_for_reservation(&self, reservation_id: ReservationId)
    -> Result<Option<Ticket>>;

    async fn ticket_counts(&self) -> Result<TicketCounts>;

    /// Audit entries about one entity, oldest first.
    async fn audit_for(&self, entity_id: &str) -> Result<Vec<AuditEntry>>;

    /// The whole audit trail, oldest first.
    async fn audit_log(&self) -> Result<Vec<AuditEntry>>;
}

/// A unit of work. Reads see this transaction's own staged writes.
///
/// Writes touching a reservation (or its payments, participants, ticket)
/// fail with `Storage` unless the reservation was locked through
/// [`Transaction::lock_reservation`] or inserted by this transaction.
#[async_trait]
pub trait Transaction: Send {
    /// Load a reservation and take its row lock, waiting for any other
    /// holder to finish. The lock is held until commit or rollback.
    async fn lock_reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()>;

    async fn update_reservation(&mut self, reservation: &Reservation) -> Result<()>;

    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>>;

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;

    async fn delete_payment(&mut self, id: PaymentId) -> Result<()>;

    async fn participants(&mut self, reservation_id: ReservationId) -> Result<Vec<Participant>>;

    async fn insert_participant(&mut self, participant: &Participant) -> Result<()>;

    async fn update_participant(&mut self, participant: &Participant) -> Result<()>;

    async fn ticket_for_reservation(&mut self, reservation_id: ReservationId)
    -> Result<Option<Ticket>>;

    async fn ticket_by_number(&mut self, ticket_number: &str) -> Result<Option<Ticket>>;

    /// # Errors
    /// `UniqueViolation` if the reservation already has a ticket or the
    /// number is taken.
    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<()>;

    async fn update_ticket(&mut self, ticket: &Ticket) -> Result<()>;

    /// Stage an audit entry; it becomes visible only with the commit.
    async fn append_audit(&mut self, entry: AuditEntry) -> Result<()>;

    /// Apply every staged write atomically and release the row locks.
    ///
    /// # Errors
    /// `UniqueViolation` if a constraint is violated at commit time, or
    /// `Storage` on backend failure. Nothing is applied in either case.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard staged writes and release the row locks.
    async fn rollback(self: Box<Self>);
}
