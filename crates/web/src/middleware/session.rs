//! Session middleware configuration.
//!
//! Sessions are stored in `PostgreSQL` (`tower_sessions.session`, created by
//! the first migration) and identified by an HTTP-only cookie.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::KadoConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "kado_session";

/// Sessions expire after this long without a request (30 days).
const SESSION_INACTIVITY_SECONDS: i64 = 30 * 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &KadoConfig,
) -> SessionManagerLayer<PostgresStore> {
    let store = PostgresStore::new(pool.clone());

    // Cookies are only marked Secure when served over HTTPS so local HTTP works.
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_INACTIVITY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
