//! In-process transactional backend.
//!
//! Committed rows live behind one mutex. A transaction stages its writes in a
//! private write-set and applies them in a single critical section on commit,
//! after re-checking the uniqueness constraints against the merged state.
//!
//! Row locks are per-reservation `tokio` mutexes. A transaction keeps the
//! owned guard until it commits, rolls back, or is dropped, which gives the
//! read-compute-write window of `SELECT ... FOR UPDATE`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use boxoffice_types::{
    AuditEntry, BoxofficeError, Participant, ParticipantId, Payment, PaymentId, Reservation,
    ReservationId, Result, Ticket, TicketId, TicketStatus,
};
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use crate::gateway::{Store, TicketCounts, Transaction, constraints};

#[derive(Debug, Default)]
struct Tables {
    reservations: HashMap<ReservationId, Reservation>,
    payments: HashMap<PaymentId, Payment>,
    participants: HashMap<ParticipantId, Participant>,
    tickets: HashMap<TicketId, Ticket>,
    audit: Vec<AuditEntry>,
}

#[derive(Debug)]
struct Inner {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<ReservationId, Arc<RowLock<()>>>>,
    fail_next_commit: AtomicBool,
    row_locking: bool,
}

impl Inner {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(poisoned)
    }

    fn row_lock(&self, id: ReservationId) -> Result<Arc<RowLock<()>>> {
        let mut locks = self.row_locks.lock().map_err(poisoned)?;
        Ok(Arc::clone(
            locks
                .entry(id)
                .or_insert_with(|| Arc::new(RowLock::new(()))),
        ))
    }

    /// Drop the lock entries of `ids` nobody holds or waits on any more.
    /// Holders and waiters keep a clone, so a strong count of 1 means the map
    /// is the only owner.
    fn prune_row_locks(&self, ids: &HashSet<ReservationId>) {
        let mut locks = self
            .row_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for id in ids {
            if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                locks.remove(id);
            }
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> BoxofficeError {
    BoxofficeError::Storage("memory store mutex poisoned".to_string())
}

/// Shared handle to the in-memory database. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_row_locking(true)
    }

    fn with_row_locking(row_locking: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                tables: Mutex::new(Tables::default()),
                row_locks: Mutex::new(HashMap::new()),
                fail_next_commit: AtomicBool::new(false),
                row_locking,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Fault injection. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl MemoryStore {
    /// Store whose row locks are no-ops, as if the locking layer were broken.
    /// Only the uniqueness constraints remain.
    pub fn without_row_locks() -> Self {
        Self::with_row_locking(false)
    }

    /// Make the next commit fail with a `Storage` error, discarding its writes.
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            inner: Arc::clone(&self.inner),
            guards: Vec::new(),
            locked: HashSet::new(),
            writes: WriteSet::default(),
        }))
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.inner.tables()?.reservations.get(&id).cloned())
    }

    async fn payments_for(&self, reservation_id: ReservationId) -> Result<Vec<Payment>> {
        let tables = self.inner.tables()?;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.created_at, p.id.0));
        Ok(payments)
    }

    async fn participants_for(&self, reservation_id: ReservationId) -> Result<Vec<Participant>> {
        let tables = self.inner.tables()?;
        let mut participants: Vec<Participant> = tables
            .participants
            .values()
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.id.0);
        Ok(participants)
    }

    async fn ticket_by_number(&self, ticket_number: &str) -> Result<Option<Ticket>> {
        let tables = self.inner.tables()?;
        Ok(tables
            .tickets
            .values()
            .find(|t| t.ticket_number == ticket_number)
            .cloned())
    }

    async fn ticket_for_reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Option<Ticket>> {
        let tables = self.inner.tables()?;
        Ok(tables
            .tickets
            .values()
            .find(|t| t.reservation_id == reservation_id)
            .cloned())
    }

    async fn ticket_counts(&self) -> Result<TicketCounts> {
        let tables = self.inner.tables()?;
        let mut counts = TicketCounts::default();
        for ticket in tables.tickets.values() {
            counts.total += 1;
            match ticket.status {
                TicketStatus::Valid => counts.valid += 1,
                TicketStatus::Used => counts.used += 1,
                TicketStatus::Cancelled => counts.cancelled += 1,
            }
        }
        Ok(counts)
    }

    async fn audit_for(&self, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let tables = self.inner.tables()?;
        Ok(tables
            .audit
            .iter()
            .filter(|e| e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn audit_log(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.inner.tables()?.audit.clone())
    }
}

/// Staged, not yet visible writes. `None` in `payments` marks a delete.
#[derive(Debug, Default)]
struct WriteSet {
    reservations: HashMap<ReservationId, Reservation>,
    inserted_reservations: HashSet<ReservationId>,
    payments: HashMap<PaymentId, Option<Payment>>,
    participants: HashMap<ParticipantId, Participant>,
    tickets: HashMap<TicketId, Ticket>,
    audit: Vec<AuditEntry>,
}

struct MemoryTransaction {
    inner: Arc<Inner>,
    guards: Vec<OwnedMutexGuard<()>>,
    locked: HashSet<ReservationId>,
    writes: WriteSet,
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        self.guards.clear();
        if !self.locked.is_empty() {
            self.inner.prune_row_locks(&self.locked);
        }
    }
}

impl MemoryTransaction {
    fn require_lock(&self, reservation_id: ReservationId) -> Result<()> {
        if !self.inner.row_locking
            || self.locked.contains(&reservation_id)
            || self.writes.inserted_reservations.contains(&reservation_id)
        {
            Ok(())
        } else {
            Err(BoxofficeError::Storage(format!(
                "write to reservation {reservation_id} without holding its row lock"
            )))
        }
    }

    fn read_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        if let Some(staged) = self.writes.reservations.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.inner.tables()?.reservations.get(&id).cloned())
    }

    fn read_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        if let Some(staged) = self.writes.payments.get(&id) {
            return Ok(staged.clone());
        }
        Ok(self.inner.tables()?.payments.get(&id).cloned())
    }

    fn read_participant(&self, id: ParticipantId) -> Result<Option<Participant>> {
        if let Some(staged) = self.writes.participants.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.inner.tables()?.participants.get(&id).cloned())
    }

    /// Committed tickets overlaid with this transaction's staged tickets.
    fn merged_tickets(&self, tables: &Tables) -> Vec<Ticket> {
        tables
            .tickets
            .values()
            .filter(|t| !self.writes.tickets.contains_key(&t.id))
            .chain(self.writes.tickets.values())
            .cloned()
            .collect()
    }

    fn find_ticket<F>(&self, predicate: F) -> Result<Option<Ticket>>
    where
        F: Fn(&Ticket) -> bool,
    {
        let tables = self.inner.tables()?;
        Ok(self
            .merged_tickets(&tables)
            .into_iter()
            .find(|t| predicate(t)))
    }
}

/// First uniqueness constraint `candidate` would break against `others`.
fn ticket_conflict<'a>(
    candidate: &Ticket,
    others: impl IntoIterator<Item = &'a Ticket>,
) -> Option<&'static str> {
    for other in others {
        if other.id == candidate.id {
            continue;
        }
        if other.reservation_id == candidate.reservation_id {
            return Some(constraints::TICKET_RESERVATION);
        }
        if other.ticket_number == candidate.ticket_number {
            return Some(constraints::TICKET_NUMBER);
        }
    }
    None
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn lock_reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>> {
        if self.inner.row_locking && !self.locked.contains(&id) {
            let lock = self.inner.row_lock(id)?;
            let guard = lock.lock_owned().await;
            self.guards.push(guard);
            self.locked.insert(id);
        }
        self.read_reservation(id)
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<()> {
        if self.read_reservation(reservation.id)?.is_some() {
            return Err(BoxofficeError::UniqueViolation {
                constraint: "reservations.id",
            });
        }
        self.writes.inserted_reservations.insert(reservation.id);
        self.writes
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> Result<()> {
        self.require_lock(reservation.id)?;
        if self.read_reservation(reservation.id)?.is_none() {
            return Err(BoxofficeError::ReservationNotFound(reservation.id));
        }
        self.writes
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn payment(&mut self, id: PaymentId) -> Result<Option<Payment>> {
        self.read_payment(id)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        self.require_lock(payment.reservation_id)?;
        self.writes
            .payments
            .insert(payment.id, Some(payment.clone()));
        Ok(())
    }

    async fn delete_payment(&mut self, id: PaymentId) -> Result<()> {
        let payment = self
            .read_payment(id)?
            .ok_or(BoxofficeError::PaymentNotFound(id))?;
        self.require_lock(payment.reservation_id)?;
        self.writes.payments.insert(id, None);
        Ok(())
    }

    async fn participants(&mut self, reservation_id: ReservationId) -> Result<Vec<Participant>> {
        let tables = self.inner.tables()?;
        let mut participants: Vec<Participant> = tables
            .participants
            .values()
            .filter(|p| !self.writes.participants.contains_key(&p.id))
            .chain(self.writes.participants.values())
            .filter(|p| p.reservation_id == reservation_id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.id.0);
        Ok(participants)
    }

    async fn insert_participant(&mut self, participant: &Participant) -> Result<()> {
        self.require_lock(participant.reservation_id)?;
        self.writes
            .participants
            .insert(participant.id, participant.clone());
        Ok(())
    }

    async fn update_participant(&mut self, participant: &Participant) -> Result<()> {
        self.require_lock(participant.reservation_id)?;
        if self.read_participant(participant.id)?.is_none() {
            return Err(BoxofficeError::ParticipantNotFound(participant.id));
        }
        self.writes
            .participants
            .insert(participant.id, participant.clone());
        Ok(())
    }

    async fn ticket_for_reservation(
        &mut self,
        reservation_id: ReservationId,
    ) -> Result<Option<Ticket>> {
        self.find_ticket(|t| t.reservation_id == reservation_id)
    }

    async fn ticket_by_number(&mut self, ticket_number: &str) -> Result<Option<Ticket>> {
        self.find_ticket(|t| t.ticket_number == ticket_number)
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<()> {
        self.require_lock(ticket.reservation_id)?;
        let conflict = {
            let tables = self.inner.tables()?;
            ticket_conflict(ticket, &self.merged_tickets(&tables))
        };
        if let Some(constraint) = conflict {
            return Err(BoxofficeError::UniqueViolation { constraint });
        }
        self.writes.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> Result<()> {
        self.require_lock(ticket.reservation_id)?;
        if self.find_ticket(|t| t.id == ticket.id)?.is_none() {
            return Err(BoxofficeError::TicketNotFound(ticket.ticket_number.clone()));
        }
        self.writes.tickets.insert(ticket.id, ticket.clone());
        Ok(())
    }

    async fn append_audit(&mut self, entry: AuditEntry) -> Result<()> {
        self.writes.audit.push(entry);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        if this.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            tracing::error!("injected commit failure, discarding staged writes");
            return Err(BoxofficeError::Storage("injected commit failure".to_string()));
        }

        let mut tables = this.inner.tables()?;

        if !this.writes.tickets.is_empty() {
            let merged = this.merged_tickets(&tables);
            for ticket in this.writes.tickets.values() {
                if let Some(constraint) = ticket_conflict(ticket, &merged) {
                    tracing::warn!(
                        reservation_id = %ticket.reservation_id,
                        constraint,
                        "unique constraint violated at commit"
                    );
                    return Err(BoxofficeError::UniqueViolation { constraint });
                }
            }
        }

        let WriteSet {
            reservations,
            payments,
            participants,
            tickets,
            audit,
            ..
        } = std::mem::take(&mut this.writes);

        tables.reservations.extend(reservations);
        for (id, payment) in payments {
            match payment {
                Some(payment) => {
                    tables.payments.insert(id, payment);
                }
                None => {
                    tables.payments.remove(&id);
                }
            }
        }
        tables.participants.extend(participants);
        tables.tickets.extend(tickets);
        tables.audit.extend(audit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        tracing::debug!(locks = self.locked.len(), "transaction rolled back");
    }
}
