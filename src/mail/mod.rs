//! Mailbox access — IMAP reader for inbound, SMTP via lettre for outbound.

pub mod reader;
pub mod sender;
pub mod types;

pub use reader::ImapInbox;
pub use sender::MailSender;
pub use types::InboundEmail;

use async_trait::async_trait;

use crate::error::MailError;

/// Source of unread inbound mail.
///
/// Fetching flags messages seen as a side effect (at-least-once).
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch_unread(&self) -> Result<Vec<InboundEmail>, MailError>;
}

/// Outbound mail transport — pure I/O, no template logic.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError>;
}
