//! Invitation code records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kado_core::{InvitationCodeId, UserId};

/// A stored invitation code.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InvitationCodeRecord {
    pub id: InvitationCodeId,
    pub code: String,
    pub created_by: Option<UserId>,
    pub used_by: Option<UserId>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl InvitationCodeRecord {
    /// Whether any user has redeemed this code.
    #[must_use]
    pub const fn is_used(&self) -> bool {
        self.used_by.is_some()
    }
}
