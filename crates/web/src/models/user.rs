//! User records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kado_core::UserId;

/// A marketplace user, keyed by identity-provider subject.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub slug: Option<String>,
    /// Payment processor customer id (buyer side).
    pub payments_customer_id: Option<String>,
    /// Payment processor connected account id (seller payouts).
    pub payments_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name to show in the UI and in emails.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.slug.as_deref())
            .unwrap_or("Kado collector")
    }
}

/// The signed-in user's own profile, as returned by `/api/users/me`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub slug: Option<String>,
    pub has_seller_account: bool,
    pub invitation_code: Option<String>,
    pub profile_complete: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}
