//! Outbound mail — SMTP via lettre, plus the campaign templates.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mail::Mailer;

// ── Subjects ────────────────────────────────────────────────────────

pub const INQUIRY_SUBJECT: &str = "Anfrage: Baugrundgutachten / Feldarbeiten";
pub const FOLLOWUP_SUBJECT: &str = "Follow-up: Baugrundgutachten / Feldarbeiten";
pub const REPLY_SUBJECT: &str = "Re: Anfrage: Baugrundgutachten / Feldarbeiten";

// ── Templates ───────────────────────────────────────────────────────

const SIGNATURE: &str = "\
Mit freundlichen Grüßen

Einkaufs-Team Erdbaron
Telefon: +49 (0)7041 806-9900
Web: www.erdbaron.com
";

/// Name fields available for personalizing the initial inquiry.
#[derive(Debug, Clone, Default)]
pub struct Personalization {
    pub salutation: String,
    pub first_name: String,
    pub last_name: String,
}

impl Personalization {
    /// Personalization is worthwhile only if at least one field is set.
    pub fn is_empty(&self) -> bool {
        self.salutation.is_empty() && self.first_name.is_empty() && self.last_name.is_empty()
    }
}

/// Initial inquiry body; personalized form when any name field is present.
pub fn inquiry_body(personalization: Option<&Personalization>) -> String {
    match personalization.filter(|p| !p.is_empty()) {
        Some(p) => format!(
            "Sehr geehrte/r {} {},\n\n\
             wir sind auf der Suche nach Fachleuten wie Ihnen ({} {})\n\
             für Baugrundgutachten und Feldarbeiten.\n\n\
             Hätten Sie generell Interesse und Kapazität, solche Gutachten für uns durchzuführen?\n\n\
             Wir freuen uns auf Ihre Rückmeldung.\n\n{}",
            p.salutation, p.last_name, p.first_name, p.last_name, SIGNATURE
        ),
        None => format!(
            "Sehr geehrte Damen und Herren,\n\n\
             wir sind auf der Suche nach Fachleuten für Baugrundgutachten und Feldarbeiten.\n\n\
             Hätten Sie generell Interesse und Kapazität, solche Gutachten für uns durchzuführen?\n\n\
             Über eine kurze Rückmeldung würden wir uns freuen.\n\n{}",
            SIGNATURE
        ),
    }
}

/// Follow-up nudge body.
pub fn followup_body() -> String {
    format!(
        "Sehr geehrte Damen und Herren,\n\n\
         wir wollten noch einmal nachhaken, ob Sie Interesse am Thema\n\
         Baugrundgutachten und Feldarbeiten haben.\n\n\
         Über eine kurze Rückmeldung würden wir uns sehr freuen!\n\n{}",
        SIGNATURE
    )
}

// ── SMTP ────────────────────────────────────────────────────────────

/// Send a plain-text mail over SMTP.
///
/// Blocking — async callers go through [`MailSender`].
pub fn send_mail(
    config: &MailConfig,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<(), MailError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.smtp_host)
        .map_err(|e| MailError::Send {
            to: to.to_string(),
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.smtp_port)
        .credentials(creds)
        .build();

    let message = Message::builder()
        .from(
            config
                .from_header()
                .parse()
                .map_err(|e| MailError::InvalidAddress {
                    address: config.from_header(),
                    reason: format!("{e}"),
                })?,
        )
        .to(to.parse().map_err(|e| MailError::InvalidAddress {
            address: to.to_string(),
            reason: format!("{e}"),
        })?)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| MailError::Send {
            to: to.to_string(),
            reason: format!("failed to build message: {e}"),
        })?;

    transport.send(&message).map_err(|e| MailError::Send {
        to: to.to_string(),
        reason: format!("SMTP send failed: {e}"),
    })?;

    tracing::info!(to = %to, subject = %subject, "Mail sent");
    Ok(())
}

/// Async mail transport backed by the blocking lettre sender.
pub struct MailSender {
    config: MailConfig,
}

impl MailSender {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for MailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let config = self.config.clone();
        let to_addr = to.to_string();
        let subject = subject.to_string();
        let body = body.to_string();
        tokio::task::spawn_blocking(move || send_mail(&config, &to_addr, &subject, &body))
            .await
            .map_err(|e| MailError::Send {
                to: to.to_string(),
                reason: format!("send task panicked: {e}"),
            })?
    }
}
