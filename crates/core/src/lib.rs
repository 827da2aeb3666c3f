//! Kado Core - Shared domain types.
//!
//! This crate provides the types used across the Kado workspace:
//! - `web` - Marketplace server (listings, checkout, fulfillment)
//! - `cli` - Command-line tools for migrations, invitation codes and data ingest
//!
//! # Architecture
//!
//! The core crate contains only types and pure rules - no I/O, no database access,
//! no HTTP clients. Status transition rules, slug and invitation-code formats, and
//! carrier/tracking validation live here so both binaries agree on them.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, statuses, slugs, invitation codes, shipping

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
