//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::KadoConfig;
use crate::services::email::EmailService;
use crate::services::identity::IdentityClient;
use crate::services::media::MediaSigner;
use crate::services::payments::{PaymentsClient, PaymentsError};
use crate::services::tracking::{TrackingClient, TrackingError};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payments client: {0}")]
    Payments(#[from] PaymentsError),
    #[error("tracking client: {0}")]
    Tracking(#[from] TrackingError),
    #[error("SMTP transport: {0}")]
    Email(#[from] lettre::transport::smtp::Error),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and third-party clients.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: KadoConfig,
    pool: PgPool,
    identity: IdentityClient,
    payments: PaymentsClient,
    tracking: TrackingClient,
    email: EmailService,
    media: MediaSigner,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client or the SMTP transport cannot be built.
    pub fn new(config: KadoConfig, pool: PgPool) -> Result<Self, StateError> {
        let email = EmailService::new(config.email.as_ref())?;
        Self::with_email(config, pool, email)
    }

    /// Create state with an explicit email service (tests pass a disabled one).
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn with_email(
        config: KadoConfig,
        pool: PgPool,
        email: EmailService,
    ) -> Result<Self, StateError> {
        let identity = IdentityClient::new(&config.identity);
        let payments = PaymentsClient::new(&config.payments)?;
        let tracking = TrackingClient::new(&config.tracking)?;
        let media = MediaSigner::new(&config.media);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                identity,
                payments,
                tracking,
                email,
                media,
            }),
        })
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &KadoConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityClient {
        &self.inner.identity
    }

    #[must_use]
    pub fn payments(&self) -> &PaymentsClient {
        &self.inner.payments
    }

    #[must_use]
    pub fn tracking(&self) -> &TrackingClient {
        &self.inner.tracking
    }

    #[must_use]
    pub fn email(&self) -> &EmailService {
        &self.inner.email
    }

    #[must_use]
    pub fn media(&self) -> &MediaSigner {
        &self.inner.media
    }
}
