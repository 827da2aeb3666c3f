//! Core types for Kado.
//!
//! This module provides type-safe wrappers for common domain concepts.

#[macro_use]
mod sql;

pub mod id;
pub mod invitation;
pub mod money;
pub mod shipping;
pub mod slug;
pub mod status;

pub use id::*;
pub use invitation::{InvitationCode, InvitationCodeError};
pub use money::{CurrencyCode, Money, UnknownCurrency};
pub use shipping::{Carrier, ShippingInputError, TrackingNumber};
pub use slug::{Slug, SlugError};
pub use status::*;
