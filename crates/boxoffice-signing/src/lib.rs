//! # boxoffice-signing
//!
//! **Pure, deterministic signing services for Boxoffice tickets.**
//!
//! Nothing in this crate performs I/O or suspends:
//!
//! - [`TicketSigner`]: HMAC-SHA256 over `ticket_number|reservation_id|timestamp`,
//!   constant-time verification, QR payload encode/decode
//! - [`TicketNumberGenerator`]: `PREFIX-<base36 ms>-<base36 random>` identifiers
//!
//! Uniqueness of ticket numbers is *not* guaranteed here; the store's unique
//! constraint catches collisions and issuance retries with a fresh number.

pub mod signer;
pub mod ticket_number;

pub use signer::TicketSigner;
pub use ticket_number::{TicketNumberGenerator, TicketNumberSource, to_base36};
