//! Storage layer for booking-outbox.
//!
//! This module provides SQLite-based persistence for:
//! - The offline operation queue
//! - Form drafts

mod database;
mod migrations;

pub use database::Database;
