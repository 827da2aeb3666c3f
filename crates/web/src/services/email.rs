//! Transactional email for order fulfillment.
//!
//! Uses SMTP via lettre with paired HTML and plain-text Askama templates. When
//! SMTP is not configured every send returns [`EmailError::Disabled`]; callers
//! log the failure and report `emailSent: false`.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// Order details shared by every fulfillment email.
#[derive(Debug, Clone)]
pub struct OrderEmail<'a> {
    pub recipient_name: &'a str,
    pub listing_title: &'a str,
    pub order_url: &'a str,
    pub carrier: Option<&'a str>,
    pub tracking_number: Option<&'a str>,
    pub tracking_url: Option<&'a str>,
    /// Provider's free-text status detail, used by the exception email.
    pub status_details: Option<&'a str>,
}

#[derive(Template)]
#[template(path = "email/order_shipped.html")]
struct OrderShippedHtml<'a> {
    order: &'a OrderEmail<'a>,
}

#[derive(Template)]
#[template(path = "email/order_shipped.txt")]
struct OrderShippedText<'a> {
    order: &'a OrderEmail<'a>,
}

#[derive(Template)]
#[template(path = "email/order_delivered.html")]
struct OrderDeliveredHtml<'a> {
    order: &'a OrderEmail<'a>,
}

#[derive(Template)]
#[template(path = "email/order_delivered.txt")]
struct OrderDeliveredText<'a> {
    order: &'a OrderEmail<'a>,
}

#[derive(Template)]
#[template(path = "email/delivery_exception.html")]
struct DeliveryExceptionHtml<'a> {
    order: &'a OrderEmail<'a>,
}

#[derive(Template)]
#[template(path = "email/delivery_exception.txt")]
struct DeliveryExceptionText<'a> {
    order: &'a OrderEmail<'a>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP is not configured.
    #[error("email delivery is not configured")]
    Disabled,

    /// The recipient has no email address on file.
    #[error("recipient has no email address")]
    NoRecipient,

    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Clone)]
struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

/// Email service for fulfillment notifications.
#[derive(Clone)]
pub struct EmailService {
    mailer: Option<Mailer>,
}

impl EmailService {
    /// Create the email service, or a disabled one when `config` is `None`.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: Option<&EmailConfig>) -> Result<Self, SmtpError> {
        let Some(config) = config else {
            tracing::warn!("SMTP_HOST not set; transactional email disabled");
            return Ok(Self::disabled());
        };

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer: Some(Mailer {
                transport,
                from_address: config.from_address.clone(),
            }),
        })
    }

    /// A service that never sends.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { mailer: None }
    }

    /// Whether SMTP is configured.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    /// Tell the buyer their card has shipped.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_shipped(
        &self,
        to: Option<&str>,
        order: &OrderEmail<'_>,
    ) -> Result<(), EmailError> {
        let html = OrderShippedHtml { order }.render()?;
        let text = OrderShippedText { order }.render()?;
        let subject = format!("Your Kado order has shipped: {}", order.listing_title);

        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Tell the buyer their card was delivered.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_delivered(
        &self,
        to: Option<&str>,
        order: &OrderEmail<'_>,
    ) -> Result<(), EmailError> {
        let html = OrderDeliveredHtml { order }.render()?;
        let text = OrderDeliveredText { order }.render()?;
        let subject = format!("Delivered: {}", order.listing_title);

        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Tell the buyer the carrier reported a delivery problem.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_delivery_exception(
        &self,
        to: Option<&str>,
        order: &OrderEmail<'_>,
    ) -> Result<(), EmailError> {
        let html = DeliveryExceptionHtml { order }.render()?;
        let text = DeliveryExceptionText { order }.render()?;
        let subject = format!("Delivery problem with your order: {}", order.listing_title);

        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: Option<&str>,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let mailer = self.mailer.as_ref().ok_or(EmailError::Disabled)?;
        let to = to.ok_or(EmailError::NoRecipient)?;

        let email = Message::builder()
            .from(
                mailer
                    .from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(mailer.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        mailer.transport.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Log a failed send and collapse the result to the `emailSent` flag.
pub fn sent_or_logged(result: Result<(), EmailError>, kind: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(EmailError::Disabled) => {
            tracing::info!(kind, "Email disabled, skipping notification");
            false
        }
        Err(e) => {
            tracing::warn!(kind, error = %e, "Failed to send notification email");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn order() -> OrderEmail<'static> {
        OrderEmail {
            recipient_name: "Misty",
            listing_title: "1999 Base Set Charizard PSA 9",
            order_url: "https://kado.test/orders/42",
            carrier: Some("USPS"),
            tracking_number: Some("9400111899223344556677"),
            tracking_url: Some("https://tools.usps.com/go/TrackConfirmAction?tLabels=9400111899223344556677"),
            status_details: None,
        }
    }

    #[test]
    fn test_shipped_templates_render() {
        let order = order();
        let text = OrderShippedText { order: &order }.render().unwrap();
        assert!(text.contains("1999 Base Set Charizard PSA 9"));
        assert!(text.contains("9400111899223344556677"));

        let html = OrderShippedHtml { order: &order }.render().unwrap();
        assert!(html.contains("https://kado.test/orders/42"));
    }

    #[test]
    fn test_exception_template_includes_details() {
        let mut order = order();
        order.status_details = Some("Address not found");
        let text = DeliveryExceptionText { order: &order }.render().unwrap();
        assert!(text.contains("Address not found"));
    }

    #[tokio::test]
    async fn test_disabled_service_reports_not_sent() {
        let service = EmailService::disabled();
        assert!(!service.is_enabled());
        let result = service.send_order_delivered(Some("misty@kado.test"), &order()).await;
        assert!(matches!(result, Err(EmailError::Disabled)));
        assert!(!sent_or_logged(result, "delivered"));
    }
}
