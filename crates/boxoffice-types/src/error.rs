//! Error types for the Boxoffice back office.
//!
//! All errors use the `BO_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors
//! - 2xx: Reservation / payment errors
//! - 3xx: Ticket issuance errors
//! - 4xx: Scan / validation errors
//! - 5xx: Authorization errors
//! - 6xx: Persistence errors
//! - 9xx: General / internal errors
//!
//! Every variant is classified by [`BoxofficeError::kind`]. Translation to a
//! transport status happens once, through [`ErrorKind::http_status`].

use thiserror::Error;

use crate::{
    Amount, ParticipantId, PaymentId, Permission, ReservationId, ReservationStatus, Role,
    TicketStatus,
};

/// Coarse classification used at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input, rejected before any lock is taken.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// A business rule or state-machine rejection.
    Conflict,
    /// A forged or tampered signature.
    Unauthorized,
    /// The actor's role lacks the required permission.
    Forbidden,
    /// Infrastructure failure; the transaction was rolled back.
    Internal,
}

impl ErrorKind {
    /// Status code the API boundary responds with.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }

    /// Only infrastructure failures may be retried by the caller. Business
    /// rejections are final.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Internal)
    }
}

/// Central error enum for all Boxoffice operations.
#[derive(Debug, Error)]
pub enum BoxofficeError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// Payment amounts must be strictly positive.
    #[error("BO_ERR_100: Invalid amount: {amount} (must be positive)")]
    InvalidAmount { amount: Amount },

    /// The payment method is not one of the accepted values.
    #[error("BO_ERR_101: Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    /// Reservation quantity must be at least one seat.
    #[error("BO_ERR_102: Invalid quantity: {quantity}")]
    InvalidQuantity { quantity: u32 },

    /// The scanned QR payload could not be parsed.
    #[error("BO_ERR_103: Malformed ticket payload: {reason}")]
    MalformedPayload { reason: String },

    /// Any other rejected input.
    #[error("BO_ERR_104: Invalid input: {reason}")]
    InvalidInput { reason: String },

    // =================================================================
    // Reservation / Payment Errors (2xx)
    // =================================================================
    /// The reservation does not exist.
    #[error("BO_ERR_200: Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The payment does not exist (or belongs to another reservation).
    #[error("BO_ERR_201: Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// Cancelled reservations accept no further payment or ticket mutation.
    #[error("BO_ERR_202: Reservation {0} is cancelled")]
    ReservationCancelled(ReservationId),

    /// The payment would push `total_paid` past `total_price`.
    #[error("BO_ERR_203: Payment amount {amount} exceeds remaining balance {remaining}")]
    AmountExceedsRemaining { amount: Amount, remaining: Amount },

    /// Once a ticket exists, the payment history of the reservation is frozen.
    #[error("BO_ERR_204: Reservation {0} has a ticket; payments are frozen")]
    PaymentsFrozen(ReservationId),

    /// Illegal reservation state transition.
    #[error("BO_ERR_205: Invalid reservation transition: {from} -> {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    /// An indistinguishable request was already accepted within the window.
    #[error("BO_ERR_206: Duplicate request rejected")]
    DuplicateRequest,

    /// Reversing a payment would drive `total_paid` below zero.
    #[error("BO_ERR_207: Paid balance underflow on reservation {0}")]
    BalanceUnderflow(ReservationId),

    // =================================================================
    // Ticket Errors (3xx)
    // =================================================================
    /// No ticket carries this number (or this reservation has no ticket).
    #[error("BO_ERR_300: Ticket not found: {0}")]
    TicketNotFound(String),

    /// Issuance requires `total_paid >= total_price`.
    #[error("BO_ERR_301: Reservation not fully paid: paid {total_paid} of {total_price}")]
    NotFullyPaid {
        total_paid: Amount,
        total_price: Amount,
    },

    /// Exactly-once guard: the reservation already has its ticket.
    #[error("BO_ERR_302: Ticket already generated for reservation {0}")]
    TicketAlreadyGenerated(ReservationId),

    /// Every freshly generated ticket number collided.
    #[error("BO_ERR_303: Could not allocate a unique ticket number after {attempts} attempts")]
    TicketNumberExhausted { attempts: u32 },

    /// The ticket is not in the `valid` state.
    #[error("BO_ERR_304: Ticket {ticket_number} is {status}")]
    TicketNotValid {
        ticket_number: String,
        status: TicketStatus,
    },

    // =================================================================
    // Scan Errors (4xx)
    // =================================================================
    /// The payload signature does not match.
    #[error("BO_ERR_400: Invalid ticket signature")]
    InvalidSignature,

    /// The participant is not listed under the ticket's reservation.
    #[error("BO_ERR_401: Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    /// The participant already passed the entrance.
    #[error("BO_ERR_402: Participant {0} already validated")]
    ParticipantAlreadyValidated(ParticipantId),

    // =================================================================
    // Authorization Errors (5xx)
    // =================================================================
    /// The actor's role does not carry the permission.
    #[error("BO_ERR_500: Role {role} lacks permission {permission}")]
    PermissionDenied { role: Role, permission: Permission },

    // =================================================================
    // Persistence Errors (6xx)
    // =================================================================
    /// A uniqueness constraint rejected the write.
    #[error("BO_ERR_600: Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: &'static str },

    /// The storage backend failed.
    #[error("BO_ERR_601: Storage error: {0}")]
    Storage(String),

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("BO_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("BO_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (missing secret, bad value, etc.).
    #[error("BO_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("BO_ERR_903: I/O error: {0}")]
    Io(String),
}

impl BoxofficeError {
    /// Classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount { .. }
            | Self::InvalidPaymentMethod(_)
            | Self::InvalidQuantity { .. }
            | Self::MalformedPayload { .. }
            | Self::InvalidInput { .. } => ErrorKind::Validation,

            Self::ReservationNotFound(_)
            | Self::PaymentNotFound(_)
            | Self::TicketNotFound(_)
            | Self::ParticipantNotFound(_) => ErrorKind::NotFound,

            Self::ReservationCancelled(_)
            | Self::AmountExceedsRemaining { .. }
            | Self::PaymentsFrozen(_)
            | Self::InvalidTransition { .. }
            | Self::DuplicateRequest
            | Self::BalanceUnderflow(_)
            | Self::NotFullyPaid { .. }
            | Self::TicketAlreadyGenerated(_)
            | Self::TicketNotValid { .. }
            | Self::ParticipantAlreadyValidated(_)
            | Self::UniqueViolation { .. } => ErrorKind::Conflict,

            Self::InvalidSignature => ErrorKind::Unauthorized,

            Self::PermissionDenied { .. } => ErrorKind::Forbidden,

            Self::TicketNumberExhausted { .. }
            | Self::Storage(_)
            | Self::Internal(_)
            | Self::Serialization(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Shorthand for `self.kind().http_status()`.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    /// `true` for legitimate business rejections (as opposed to failures).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Forbidden)
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, BoxofficeError>;

// Conversion from std::io::Error
impl From<std::io::Error> for BoxofficeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BoxofficeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
