//! Session-related types.
//!
//! Types stored in the session for authentication state.

use serde::{Deserialize, Serialize};

use kado_core::UserId;

/// Session-stored user identity.
///
/// Minimal data stored in the session to identify the signed-in user. The
/// `profile_complete` flag is refreshed whenever onboarding state changes so the
/// gate middleware never needs a database round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Identity-provider subject.
    pub id: UserId,
    /// Email reported by the identity provider.
    pub email: Option<String>,
    /// Display name, if set.
    pub display_name: Option<String>,
    /// Whether the user has a slug and (when required) a redeemed invitation code.
    pub profile_complete: bool,
}

/// Session keys for authentication data.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the OAuth `state` parameter (CSRF protection).
    pub const OAUTH_STATE: &str = "oauth_state";

    /// Key for the OIDC nonce (replay protection).
    pub const OAUTH_NONCE: &str = "oauth_nonce";

    /// Key for the path to return to after sign-in.
    pub const RETURN_TO: &str = "return_to";
}
