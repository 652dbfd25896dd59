//! Outbound campaign — initial template sends and follow-up scans.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};

use crate::crm::{Lead, LeadStore};
use crate::error::Result;
use crate::mail::Mailer;
use crate::mail::sender::{
    FOLLOWUP_SUBJECT, INQUIRY_SUBJECT, Personalization, followup_body, inquiry_body,
};
use crate::status::LeadStatus;

/// A lead whose initial send is older than this is due for a follow-up.
pub const FOLLOWUP_STALE_DAYS: i64 = 5;

/// Leads past this many follow-ups are marked disengaged.
pub const MAX_FOLLOWUPS: u32 = 3;

/// What the follow-up scan decided for one lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowupPlan {
    /// Patch the lead to `Uninteressiert` before sending.
    pub disengage: bool,
    /// New value for the follow-up counter.
    pub next_count: u32,
}

/// Decide whether a lead is due for a follow-up.
///
/// Due means the initial send is recorded and more than
/// [`FOLLOWUP_STALE_DAYS`] older than the last modification. When the
/// counter already exceeds [`MAX_FOLLOWUPS`], the lead is additionally
/// marked disengaged — a final follow-up still goes out alongside the
/// disengagement patch.
pub fn plan_followup(
    mail_sent: Option<DateTime<FixedOffset>>,
    modified: DateTime<FixedOffset>,
    followup_count: Option<u32>,
) -> Option<FollowupPlan> {
    let sent_at = mail_sent?;
    if modified.signed_duration_since(sent_at) <= chrono::Duration::days(FOLLOWUP_STALE_DAYS) {
        return None;
    }
    let count = followup_count.unwrap_or(0);
    Some(FollowupPlan {
        disengage: count > MAX_FOLLOWUPS,
        next_count: count + 1,
    })
}

fn personalization_of(lead: &Lead) -> Option<Personalization> {
    lead.has_name_fields().then(|| Personalization {
        salutation: lead.salutation.clone().unwrap_or_default(),
        first_name: lead.first_name.clone().unwrap_or_default(),
        last_name: lead.last_name.clone().unwrap_or_default(),
    })
}

/// Runs the outbound jobs against the CRM's outreach segment.
pub struct Campaign {
    leads: Arc<dyn LeadStore>,
    mailer: Arc<dyn Mailer>,
}

impl Campaign {
    pub fn new(leads: Arc<dyn LeadStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self { leads, mailer }
    }

    /// Send the initial inquiry to every lead lacking a prior send and
    /// stamp the sent timestamp. Returns the number of leads mailed.
    pub async fn run_initial_queue(&self) -> Result<usize> {
        let leads = self.leads.leads_for_outreach().await?;
        let mut processed = 0;

        for lead in &leads {
            if lead.mail_sent.as_deref().is_some_and(|s| !s.is_empty()) {
                continue;
            }
            match self.send_initial(lead).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(email = %lead.email, error = %e, "Initial send failed");
                }
            }
        }

        Ok(processed)
    }

    async fn send_initial(&self, lead: &Lead) -> Result<bool> {
        let Some(lead_ref) = self.leads.find_by_email(&lead.email).await? else {
            tracing::warn!(email = %lead.email, "No CRM record for lead");
            return Ok(false);
        };

        let personalization = personalization_of(lead);
        let body = inquiry_body(personalization.as_ref());
        self.mailer
            .send(&lead.email, INQUIRY_SUBJECT, &body)
            .await?;
        self.leads
            .update_mail_sent(&lead_ref.id, Utc::now())
            .await?;
        Ok(true)
    }

    /// Scan for stale leads and send follow-ups. Returns the number of
    /// follow-ups sent.
    pub async fn run_followups(&self) -> Result<usize> {
        let leads = self.leads.leads_for_outreach().await?;
        let mut processed = 0;

        for lead in &leads {
            match self.followup_one(lead).await {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(email = %lead.email, error = %e, "Follow-up failed");
                }
            }
        }

        Ok(processed)
    }

    async fn followup_one(&self, lead: &Lead) -> Result<bool> {
        let modified = lead
            .modified_at()
            .unwrap_or_else(|| Utc::now().fixed_offset());
        let Some(plan) = plan_followup(lead.mail_sent_at(), modified, lead.followup_count) else {
            return Ok(false);
        };

        let Some(lead_ref) = self.leads.find_by_email(&lead.email).await? else {
            tracing::warn!(email = %lead.email, "No CRM record for lead");
            return Ok(false);
        };

        if plan.disengage {
            tracing::info!(
                email = %lead.email,
                count = plan.next_count - 1,
                "Follow-up limit exceeded; marking lead disengaged"
            );
            self.leads
                .update_status(&lead_ref.id, LeadStatus::NotInterested)
                .await?;
        }

        self.mailer
            .send(&lead.email, FOLLOWUP_SUBJECT, &followup_body())
            .await?;
        self.leads
            .update_followup_count(&lead_ref.id, plan.next_count)
            .await?;
        Ok(true)
    }
}
