//! HTTP middleware stack.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//! 5. Sign-in / onboarding gate
//! 6. Rate limiting (governor, per route group)

pub mod auth;
pub mod gate;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{
    OptionalAuth, RequireAdmin, RequireAuth, clear_current_user, login_url, refresh_current_user,
    session_user_for, set_current_user,
};
pub use gate::gate_middleware;
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
