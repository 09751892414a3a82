//! ticketflow-pool: the admission gate in front of the storage engine.
//!
//! A `TicketPool` bounds how many operations may run at once. Callers
//! acquire a `Ticket` before doing work and drop it when done; every
//! dropped ticket bumps the pool's finished-operation counter, which is
//! what the concurrency controller samples to compute throughput.
//!
//! # Resizing
//!
//! ```text
//! grow:   cancel pending shrink first, then add permits
//! shrink: forget idle permits now, enqueue the rest
//!         └── resolved lazily as outstanding tickets are returned
//! ```
//!
//! Shrinking never revokes a ticket that was already handed out and
//! never blocks the caller.

pub mod error;
pub mod pool;

pub use error::{PoolError, PoolResult};
pub use pool::{Ticket, TicketPool};
