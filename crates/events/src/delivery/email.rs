//! Email delivery via SMTP.
//!
//! [`EmailTransport`] is the seam the dispatcher sends through. [`SmtpMailer`]
//! implements it on top of the `lettre` async SMTP transport, rendering a
//! plain-text body from the notification context. HTML rendering of the named
//! template is owned by the mail relay; the template name travels in the
//! `X-Template` header.

use std::fmt::Write as _;
use std::future::Future;

use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Sends one rendered notification.
pub trait EmailTransport: Send + Sync {
    /// Deliver `context` rendered with `template_name` to `to`.
    fn send(
        &self,
        template_name: &str,
        context: &Value,
        subject: &str,
        to: &str,
    ) -> impl Future<Output = Result<(), EmailError>> + Send;
}

impl<T: EmailTransport + ?Sized> EmailTransport for &T {
    fn send(
        &self,
        template_name: &str,
        context: &Value,
        subject: &str,
        to: &str,
    ) -> impl Future<Output = Result<(), EmailError>> + Send {
        (**self).send(template_name, context, subject, to)
    }
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@autobridge.local";

/// Configuration for the SMTP mailer.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server hostname.
    pub smtp_host: String,
    /// SMTP server port (defaults to 587).
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    /// Optional SMTP username.
    pub smtp_user: Option<String>,
    /// Optional SMTP password.
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set.
    ///
    /// | Variable        | Required | Default                     |
    /// |-----------------|----------|-----------------------------|
    /// | `SMTP_HOST`     | yes      |                             |
    /// | `SMTP_PORT`     | no       | `587`                       |
    /// | `SMTP_FROM`     | no       | `noreply@autobridge.local`  |
    /// | `SMTP_USER`     | no       |                             |
    /// | `SMTP_PASSWORD` | no       |                             |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// X-Template header
// ---------------------------------------------------------------------------

/// Carries the template name so the relay can pick the HTML rendering.
#[derive(Debug, Clone)]
struct TemplateHeader(String);

impl Header for TemplateHeader {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Template")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

/// SMTP-backed [`EmailTransport`]. The connection pool inside the lettre
/// transport is built once and reused for every send.
pub struct SmtpMailer {
    from_address: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the mailer. Fails if the relay hostname or TLS setup is invalid.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from_address: config.from_address,
            mailer: transport_builder.build(),
        })
    }
}

impl EmailTransport for SmtpMailer {
    async fn send(
        &self,
        template_name: &str,
        context: &Value,
        subject: &str,
        to: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .header(TemplateHeader(template_name.to_string()))
            .body(render_plain_text(context))
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.mailer.send(email).await?;

        tracing::info!(to, template = template_name, "Saved-search email sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Plain-text rendering
// ---------------------------------------------------------------------------

/// Render the notification context as a plain-text body.
///
/// Missing keys render as empty strings so a partially populated context
/// still produces a readable mail.
pub fn render_plain_text(context: &Value) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "Hi {},", text(&context["recipient_name"]));
    body.push('\n');

    let searches = context["searches"].as_array().map(Vec::as_slice).unwrap_or_default();
    for search in searches {
        let _ = writeln!(
            body,
            "{} ({})",
            text(&search["name"]),
            text(&search["criteria_summary"])
        );
        let count = search["match_count"].as_i64().unwrap_or(0);
        let noun = if count == 1 { "match" } else { "matches" };
        let _ = writeln!(body, "{count} new {noun}");

        let vehicles = search["vehicles"].as_array().map(Vec::as_slice).unwrap_or_default();
        for vehicle in vehicles {
            let _ = writeln!(
                body,
                "  - {} {} {}, {}, {} km, {}",
                text(&vehicle["year"]),
                text(&vehicle["make"]),
                text(&vehicle["model"]),
                text(&vehicle["price_display"]),
                text(&vehicle["mileage_display"]),
                text(&vehicle["condition"]),
            );
        }

        let more = search["more_count"].as_i64().unwrap_or(0);
        if more > 0 {
            let _ = writeln!(body, "  +{more} more");
        }
        body.push('\n');
    }

    body.push_str("You are receiving this because of your saved searches on AutoBridge.\n");
    body
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
