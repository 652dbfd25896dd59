//! Inbound processing pipeline.
//!
//! Per cycle: fetch unread (subject-filtered) → classify via the
//! assistant → strip the status marker → reply to the bare sender
//! address → look up the lead by email → patch its status. Per-item
//! failures are logged and the loop continues; a lookup miss is a
//! warning, not a failure.

use std::sync::Arc;

use crate::assistant::Classifier;
use crate::crm::LeadStore;
use crate::error::Result;
use crate::mail::sender::REPLY_SUBJECT;
use crate::mail::{InboundEmail, MailSource, Mailer};
use crate::status::extract_status;

/// Wires mailbox, assistant and CRM into the inbound flow.
pub struct InboundPipeline {
    source: Arc<dyn MailSource>,
    mailer: Arc<dyn Mailer>,
    classifier: Arc<dyn Classifier>,
    leads: Arc<dyn LeadStore>,
}

impl InboundPipeline {
    pub fn new(
        source: Arc<dyn MailSource>,
        mailer: Arc<dyn Mailer>,
        classifier: Arc<dyn Classifier>,
        leads: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            source,
            mailer,
            classifier,
            leads,
        }
    }

    /// Run one inbox cycle. Returns the number of successfully
    /// processed messages; a failed fetch surfaces upward.
    pub async fn process_inbox(&self) -> Result<usize> {
        let emails = self.source.fetch_unread().await?;
        if emails.is_empty() {
            return Ok(0);
        }

        tracing::info!(count = emails.len(), "Processing unread emails");
        let mut processed = 0;
        for email in &emails {
            match self.process_one(email).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    tracing::error!(sender = %email.sender, error = %e, "Failed to process email");
                }
            }
        }
        Ok(processed)
    }

    async fn process_one(&self, email: &InboundEmail) -> Result<()> {
        let reply = self.classifier.classify(email).await?;
        let (cleaned, status) = extract_status(&reply);
        tracing::info!(sender = %email.sender, status = %status, "Email classified");

        let recipient = email.sender_address();
        self.mailer.send(recipient, REPLY_SUBJECT, &cleaned).await?;

        let Some(lead) = self.leads.find_by_email(recipient).await? else {
            tracing::warn!(email = %recipient, "No CRM record for sender");
            return Ok(());
        };
        self.leads.update_status(&lead.id, status).await?;
        Ok(())
    }
}
