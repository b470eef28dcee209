//! # boxoffice-types
//!
//! Shared types, errors, and configuration for the **Boxoffice** back office.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`ReservationId`], [`PackId`], [`PaymentId`], [`TicketId`], [`ParticipantId`], [`UserId`], [`AuditEntryId`]
//! - **Reservation model**: [`Reservation`], [`ReservationStatus`], [`PackSnapshot`], [`Payer`], [`ReservationSummary`]
//! - **Payment model**: [`Payment`], [`PaymentMethod`]
//! - **Ticket model**: [`Ticket`], [`TicketStatus`], [`SignedPayload`], [`TicketArtifacts`]
//! - **Participant model**: [`Participant`]
//! - **Audit model**: [`AuditEntry`], [`AuditAction`], [`AuditStatus`], [`EntityType`]
//! - **Authorization**: [`Role`], [`Permission`], [`PermissionTable`], [`Actor`]
//! - **Templates**: [`TicketTemplate`], [`TemplateTable`]
//! - **Configuration**: [`BoxofficeConfig`] and its sections
//! - **Errors**: [`BoxofficeError`] with `BO_ERR_` prefix codes, classified by [`ErrorKind`]
//! - **Constants**: system-wide limits and defaults

pub mod actor;
pub mod audit;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod participant;
pub mod payment;
pub mod permissions;
pub mod reservation;
pub mod template;
pub mod ticket;

// Re-export all primary types at crate root for ergonomic imports:
//   use boxoffice_types::{Reservation, Payment, Ticket, ...};

pub use actor::*;
pub use audit::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use participant::*;
pub use payment::*;
pub use permissions::*;
pub use reservation::*;
pub use template::*;
pub use ticket::*;

// Constants are accessed via `boxoffice_types::constants::FOO`
// (not re-exported to avoid name collisions).
