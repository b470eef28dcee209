//! # boxoffice-store
//!
//! **Persistence Gateway for the Boxoffice back office.**
//!
//! The core talks to storage exclusively through two traits:
//!
//! - [`Store`]: committed reads plus [`Store::begin`]
//! - [`Transaction`]: `SELECT ... FOR UPDATE` style row locking on the
//!   reservation, staged writes, and atomic [`Transaction::commit`]
//!
//! A transaction dropped without commit is rolled back. Every write to a
//! reservation or its subordinate rows (payments, participants, tickets)
//! requires that transaction to hold the reservation's row lock.
//!
//! [`MemoryStore`] is the in-process backend used by tests and single-node
//! deployments. It enforces the same uniqueness constraints a SQL schema would
//! (`tickets.reservation_id`, `tickets.ticket_number`).

pub mod gateway;
pub mod memory;

pub use gateway::{Store, TicketCounts, Transaction, constraints};
pub use memory::MemoryStore;
