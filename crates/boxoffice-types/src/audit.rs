//! Append-only audit trail records.
//!
//! Every mutation writes one [`AuditEntry`] in the same transaction as the
//! change it describes. Rejected mutations may additionally leave a
//! [`AuditStatus::Failed`] entry written on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Actor, Amount, AuditEntryId, PaymentMethod, Permission, UserId};

/// What kind of entity an entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Reservation,
    Payment,
    Ticket,
    Participant,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reservation => write!(f, "reservation"),
            Self::Payment => write!(f, "payment"),
            Self::Ticket => write!(f, "ticket"),
            Self::Participant => write!(f, "participant"),
        }
    }
}

/// Audited action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "reservation.create")]
    ReservationCreate,
    #[serde(rename = "reservation.cancel")]
    ReservationCancel,
    #[serde(rename = "payment.add")]
    PaymentAdd,
    #[serde(rename = "payment.delete")]
    PaymentDelete,
    #[serde(rename = "ticket.generate")]
    TicketGenerate,
    #[serde(rename = "ticket.artifacts")]
    TicketArtifacts,
    #[serde(rename = "entry.validate")]
    EntryValidate,
    #[serde(rename = "entry.admit_all")]
    EntryAdmitAll,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReservationCreate => "reservation.create",
            Self::ReservationCancel => "reservation.cancel",
            Self::PaymentAdd => "payment.add",
            Self::PaymentDelete => "payment.delete",
            Self::TicketGenerate => "ticket.generate",
            Self::TicketArtifacts => "ticket.artifacts",
            Self::EntryValidate => "entry.validate",
            Self::EntryAdmitAll => "entry.admit_all",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded with the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failed,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor_id: UserId,
    pub permission: Permission,
    pub entity_type: EntityType,
    /// Stringified entity identifier (UUID or ticket number).
    pub entity_id: String,
    pub action: AuditAction,
    pub description: String,
    /// Structured before/after diff.
    pub changes: Value,
    pub status: AuditStatus,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Start a successful entry for `actor`. Description and changes are
    /// filled in with the builder methods.
    #[must_use]
    pub fn new(
        actor: &Actor,
        permission: Permission,
        action: AuditAction,
        entity_type: EntityType,
        entity_id: impl ToString,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor_id: actor.user_id,
            permission,
            entity_type,
            entity_id: entity_id.to_string(),
            action,
            description: String::new(),
            changes: Value::Null,
            status: AuditStatus::Success,
            ip_address: actor.ip_address.clone(),
            user_agent: actor.user_agent.clone(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_changes(mut self, changes: Value) -> Self {
        self.changes = changes;
        self
    }

    #[must_use]
    pub fn failed(mut self) -> Self {
        self.status = AuditStatus::Failed;
        self
    }
}

/// Human-readable descriptions, one per action.
pub mod describe {
    use super::{Amount, PaymentMethod};

    #[must_use]
    pub fn payment_added(amount: Amount, method: PaymentMethod) -> String {
        format!("Payment added: {amount} ({method})")
    }

    #[must_use]
    pub fn payment_deleted(amount: Amount) -> String {
        format!("Payment deleted: {amount}")
    }

    #[must_use]
    pub fn reservation_created(payer_name: &str) -> String {
        format!("Reservation created for {payer_name}")
    }

    #[must_use]
    pub fn reservation_cancelled() -> String {
        "Reservation cancelled".to_string()
    }

    #[must_use]
    pub fn ticket_generated(ticket_number: &str) -> String {
        format!("Ticket generated: {ticket_number}")
    }

    #[must_use]
    pub fn artifacts_rendered(ticket_number: &str) -> String {
        format!("Ticket artifacts rendered: {ticket_number}")
    }

    #[must_use]
    pub fn entry_validated(participant_name: &str) -> String {
        format!("Entry validated: {participant_name}")
    }

    #[must_use]
    pub fn entry_admitted(count: usize) -> String {
        format!("Entry validated (participants: {count})")
    }
}
