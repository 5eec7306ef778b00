//! Order fulfillment.
//!
//! The orchestrator takes a pending order, reserves an exact basket of codes
//! for it and redeems them through an [`ActivationDriver`](crate::driver::ActivationDriver),
//! rotating worker identities on lockout and replacing dead codes. Every run
//! ends with a terminal order status and no leftover reservations.

mod config;
mod runner;
mod types;

pub use config::FulfillmentConfig;
pub use runner::FulfillmentOrchestrator;
pub use types::{
    FulfillmentError, FulfillmentStatus, INTERRUPTED, NO_ACTIVE_WORKERS, NO_MATCHING_CODES,
    RESERVATION_LOST, WORKER_POOL_EXHAUSTED,
};
