//! # boxoffice-ledger
//!
//! **Core services of the Boxoffice back office.**
//!
//! ## Architecture
//!
//! ```text
//!  Actor ──▶ Backoffice ──▶ permission check ──▶ Store::begin
//!                                                   │
//!                          lock reservation ◀───────┘
//!                                 │
//!                 recompute / state transition / sign
//!                                 │
//!                write rows + audit entry ──▶ commit
//!                                 │
//!            post-commit: render artifacts, queue notification
//! ```
//!
//! ## Modules
//!
//! - [`payments`]: add and delete payments, balance recomputation
//! - [`issuance`]: exactly-once signed ticket issuance, artifact rendering
//! - [`scan`]: QR decode, per-participant and whole-group admission, stats
//! - [`reservations`]: open and cancel reservations
//! - [`guard`]: best-effort duplicate-request guard
//! - [`notify`]: post-commit notification queue with retry/backoff
//! - [`renderer`], [`proof`]: collaborator contracts
//! - [`telemetry`]: tracing subscriber bootstrap

mod audit;
pub mod backoffice;
pub mod guard;
pub mod issuance;
pub mod notify;
pub mod payments;
pub mod proof;
pub mod renderer;
pub mod reservations;
pub mod scan;
pub mod telemetry;

pub use backoffice::{Backoffice, Collaborators};
pub use guard::{DuplicateGuard, Fingerprint, payment_fingerprint};
pub use issuance::IssuedTicket;
pub use notify::{Notification, NotificationDispatcher, Notifier};
pub use payments::PaymentReceipt;
pub use proof::{DiskProofStorage, ProofStorage};
pub use renderer::{ArtifactRenderer, RenderRequest, RenderedPdf};
pub use reservations::NewReservation;
pub use scan::{Admission, DecodedTicket, GroupAdmission, ScanStats};
pub use telemetry::init_tracing;
