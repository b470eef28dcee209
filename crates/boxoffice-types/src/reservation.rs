//! # Reservation: the financial aggregate
//!
//! A reservation tracks what a payer owes for a pack and what has been paid
//! so far. Its status is driven jointly by the payment ledger and ticket
//! issuance.
//!
//! ## State Machine
//!
//! ```text
//!   ┌─────────┐ pay <total ┌─────────┐ pay =total ┌──────┐  issue  ┌──────────────────┐
//!   │ PENDING ├───────────▶│ PARTIAL ├───────────▶│ PAID ├────────▶│ TICKET_GENERATED │
//!   └────┬────┘            └────┬────┘            └──┬───┘         └──────────────────┘
//!        │   ◀── refund / delete payment ──────────── │
//!        │ cancel               │ cancel              │ cancel
//!        ▼                      ▼                     ▼
//!   ┌───────────┐
//!   │ CANCELLED │
//!   └───────────┘
//! ```
//!
//! `PENDING`, `PARTIAL` and `PAID` are a pure function of `total_paid` versus
//! `total_price`. `TICKET_GENERATED` and `CANCELLED` are sticky: no payment
//! mutation can move a reservation out of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoxofficeError, PackId, ReservationId, Result, TicketTemplate};

/// Money in the smallest currency unit (XAF has no minor unit).
pub type Amount = i64;

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Nothing paid yet.
    Pending,
    /// Something paid, balance still open.
    Partial,
    /// Fully paid, ticket not yet issued.
    Paid,
    /// Ticket issued. **Terminal.** Financial history is frozen.
    TicketGenerated,
    /// Cancelled by staff. **Terminal.**
    Cancelled,
}

impl ReservationStatus {
    /// Three-way derivation used after every balance change.
    #[must_use]
    pub fn derive(total_paid: Amount, total_price: Amount) -> Self {
        if total_paid > 0 && total_paid < total_price {
            Self::Partial
        } else if total_paid >= total_price {
            Self::Paid
        } else {
            Self::Pending
        }
    }

    /// Whether this state is sticky.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TicketGenerated | Self::Cancelled)
    }

    /// Stable wire name (`pending`, `partial`, ...). Other systems key off these.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::TicketGenerated => "ticket_generated",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact details of whoever pays for the reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Pack details frozen at reservation time so later catalogue edits never
/// rewrite historical pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSnapshot {
    pub pack_id: PackId,
    pub name: String,
    pub unit_price: Amount,
    pub template: TicketTemplate,
}

/// Before/after view of one balance mutation, used for audit diffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub total_paid_before: Amount,
    pub total_paid_after: Amount,
    pub status_before: ReservationStatus,
    pub status_after: ReservationStatus,
}

/// A purchase intent for a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub payer: Payer,
    pub pack: PackSnapshot,
    pub quantity: u32,
    pub total_price: Amount,
    /// Only ever adjusted through [`Reservation::apply_payment`] and
    /// [`Reservation::reverse_payment`].
    pub total_paid: Amount,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Open a new reservation, pricing it from the pack snapshot. It starts
    /// `pending`, or `paid` when the total is zero.
    ///
    /// # Errors
    /// - `InvalidQuantity` if `quantity` is zero
    /// - `InvalidInput` if the unit price is negative or the total overflows
    pub fn open(payer: Payer, pack: PackSnapshot, quantity: u32) -> Result<Self> {
        if quantity == 0 {
            return Err(BoxofficeError::InvalidQuantity { quantity });
        }
        if pack.unit_price < 0 {
            return Err(BoxofficeError::InvalidInput {
                reason: format!("unit price {} is negative", pack.unit_price),
            });
        }
        let total_price = pack
            .unit_price
            .checked_mul(Amount::from(quantity))
            .ok_or_else(|| BoxofficeError::InvalidInput {
                reason: "total price overflows".to_string(),
            })?;

        let now = Utc::now();
        Ok(Self {
            id: ReservationId::new(),
            payer,
            pack,
            quantity,
            total_price,
            total_paid: 0,
            status: ReservationStatus::derive(0, total_price),
            created_at: now,
            updated_at: now,
        })
    }

    /// `total_price - total_paid`. Derived, never stored.
    #[must_use]
    pub fn remaining_amount(&self) -> Amount {
        self.total_price - self.total_paid
    }

    #[must_use]
    pub fn is_fully_paid(&self) -> bool {
        self.total_paid >= self.total_price
    }

    /// Compact view returned by every ledger operation.
    #[must_use]
    pub fn summary(&self) -> ReservationSummary {
        ReservationSummary {
            id: self.id,
            total_price: self.total_price,
            total_paid: self.total_paid,
            remaining_amount: self.remaining_amount(),
            status: self.status,
        }
    }

    /// Credit `amount` and re-derive the status.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount <= 0`
    /// - `ReservationCancelled` / `PaymentsFrozen` in terminal states
    /// - `AmountExceedsRemaining` if the balance would be overpaid
    pub fn apply_payment(&mut self, amount: Amount) -> Result<BalanceChange> {
        if amount <= 0 {
            return Err(BoxofficeError::InvalidAmount { amount });
        }
        self.ensure_payments_open()?;

        let remaining = self.remaining_amount();
        if amount > remaining {
            return Err(BoxofficeError::AmountExceedsRemaining { amount, remaining });
        }

        Ok(self.set_total_paid(self.total_paid + amount))
    }

    /// Debit a deleted payment and re-derive the status.
    ///
    /// # Errors
    /// - `PaymentsFrozen` once a ticket exists, `ReservationCancelled` if cancelled
    /// - `BalanceUnderflow` if `amount` exceeds what was paid
    pub fn reverse_payment(&mut self, amount: Amount) -> Result<BalanceChange> {
        if amount <= 0 {
            return Err(BoxofficeError::InvalidAmount { amount });
        }
        self.ensure_payments_open()?;
        if amount > self.total_paid {
            return Err(BoxofficeError::BalanceUnderflow(self.id));
        }

        Ok(self.set_total_paid(self.total_paid - amount))
    }

    /// Transition to `ticket_generated`.
    ///
    /// # Errors
    /// - `ReservationCancelled` if cancelled
    /// - `NotFullyPaid` if the balance is open
    /// - `TicketAlreadyGenerated` if already issued
    pub fn mark_ticket_generated(&mut self) -> Result<()> {
        if self.status == ReservationStatus::Cancelled {
            return Err(BoxofficeError::ReservationCancelled(self.id));
        }
        if !self.is_fully_paid() {
            return Err(BoxofficeError::NotFullyPaid {
                total_paid: self.total_paid,
                total_price: self.total_price,
            });
        }
        if self.status == ReservationStatus::TicketGenerated {
            return Err(BoxofficeError::TicketAlreadyGenerated(self.id));
        }
        self.status = ReservationStatus::TicketGenerated;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// One-way transition to `cancelled`.
    ///
    /// # Errors
    /// Returns `InvalidTransition` from either terminal state.
    pub fn cancel(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(BoxofficeError::InvalidTransition {
                from: self.status,
                to: ReservationStatus::Cancelled,
            });
        }
        self.status = ReservationStatus::Cancelled;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn ensure_payments_open(&self) -> Result<()> {
        match self.status {
            ReservationStatus::Cancelled => Err(BoxofficeError::ReservationCancelled(self.id)),
            ReservationStatus::TicketGenerated => Err(BoxofficeError::PaymentsFrozen(self.id)),
            _ => Ok(()),
        }
    }

    fn set_total_paid(&mut self, total_paid: Amount) -> BalanceChange {
        let change = BalanceChange {
            total_paid_before: self.total_paid,
            total_paid_after: total_paid,
            status_before: self.status,
            status_after: ReservationStatus::derive(total_paid, self.total_price),
        };
        self.total_paid = change.total_paid_after;
        self.status = change.status_after;
        self.updated_at = Utc::now();
        change
    }
}

/// `{id, totals, remaining, status}` view of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationSummary {
    pub id: ReservationId,
    pub total_price: Amount,
    pub total_paid: Amount,
    pub remaining_amount: Amount,
    pub status: ReservationStatus,
}

/// Test reservation priced at `total_price` (one seat). **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Reservation {
    pub fn dummy(total_price: Amount) -> Self {
        Self::open(
            Payer {
                name: "Awa Ndiaye".to_string(),
                phone: "+237600000000".to_string(),
                email: Some("awa@example.com".to_string()),
            },
            PackSnapshot {
                pack_id: PackId::new(),
                name: "Simple Soolouf".to_string(),
                unit_price: total_price,
                template: TicketTemplate::Simple,
            },
            1,
        )
        .expect("dummy reservation is valid")
    }
}
