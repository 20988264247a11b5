//! Feature implementations for booking-outbox.
//!
//! - Offline operation queue and sync engine
//! - Connectivity monitoring
//! - Form draft persistence

pub mod drafts;
pub mod network;
pub mod sync;
