//! Domain models for the marketplace.
//!
//! Row types derive `sqlx::FromRow` and are read with runtime `query_as` calls in
//! [`crate::db`]. JSON responses use camelCase field names.

pub mod card;
pub mod invitation;
pub mod listing;
pub mod order;
pub mod session;
pub mod user;

pub use card::{
    Card, CertificateDetail, CertificatePayload, CertificateResponse, GradingCertificate,
    SalePayload, SalesRecord,
};
pub use invitation::InvitationCodeRecord;
pub use listing::{Listing, ListingDraft, ListingDraftError};
pub use order::{Order, OrderEvent};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{PublicUser, User};
