//! Business logic and third-party clients.
//!
//! - [`identity`], [`payments`], [`tracking`], [`email`], [`media`] wrap one
//!   external service each.
//! - [`checkout`], [`lifecycle`], [`shipping`], [`invitations`] orchestrate
//!   repositories and clients for one use case each.
//! - [`history`] is a pure timeline builder.

pub mod checkout;
pub mod email;
pub mod history;
pub mod identity;
pub mod invitations;
pub mod lifecycle;
pub mod media;
pub mod payments;
pub mod shipping;
pub mod tracking;
