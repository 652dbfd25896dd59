//! End-to-end flow tests with in-memory collaborators.
//!
//! Covers the inbound classify → reply → CRM-sync flow and the outbound
//! initial-queue and follow-up jobs, with scripted mailbox, assistant
//! and CRM fakes.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use outreach_assist::assistant::Classifier;
use outreach_assist::campaign::Campaign;
use outreach_assist::crm::{Lead, LeadRef, LeadStore};
use outreach_assist::error::{AssistantError, CrmError, MailError};
use outreach_assist::mail::{InboundEmail, MailSource, Mailer};
use outreach_assist::pipeline::InboundPipeline;
use outreach_assist::status::LeadStatus;

// ── Fakes ───────────────────────────────────────────────────────────

struct ScriptedInbox {
    emails: Vec<InboundEmail>,
}

#[async_trait]
impl MailSource for ScriptedInbox {
    async fn fetch_unread(&self) -> Result<Vec<InboundEmail>, MailError> {
        Ok(self.emails.clone())
    }
}

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.into(), subject.into(), body.into()));
        Ok(())
    }
}

struct ScriptedAssistant {
    reply: String,
}

#[async_trait]
impl Classifier for ScriptedAssistant {
    async fn classify(&self, _email: &InboundEmail) -> Result<String, AssistantError> {
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
struct InMemoryCrm {
    leads: Vec<Lead>,
    status_updates: Mutex<Vec<(String, LeadStatus)>>,
    mail_sent_updates: Mutex<Vec<String>>,
    followup_updates: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl LeadStore for InMemoryCrm {
    async fn leads_for_outreach(&self) -> Result<Vec<Lead>, CrmError> {
        Ok(self.leads.clone())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LeadRef>, CrmError> {
        Ok(self
            .leads
            .iter()
            .find(|l| l.email.eq_ignore_ascii_case(email))
            .map(|l| LeadRef {
                id: l.id.clone(),
                followup_count: l.followup_count,
            }))
    }

    async fn update_status(&self, id: &str, status: LeadStatus) -> Result<(), CrmError> {
        self.status_updates.lock().unwrap().push((id.into(), status));
        Ok(())
    }

    async fn update_mail_sent(&self, id: &str, _sent_at: DateTime<Utc>) -> Result<(), CrmError> {
        self.mail_sent_updates.lock().unwrap().push(id.into());
        Ok(())
    }

    async fn update_followup_count(&self, id: &str, count: u32) -> Result<(), CrmError> {
        self.followup_updates.lock().unwrap().push((id.into(), count));
        Ok(())
    }
}

fn lead(id: &str, email: &str) -> Lead {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "Email": email,
    }))
    .unwrap()
}

// ── Inbound flow ────────────────────────────────────────────────────

#[tokio::test]
async fn interested_inquiry_is_acknowledged_and_synced() {
    let inbox = ScriptedInbox {
        emails: vec![InboundEmail {
            sender: "Schmidt Geotechnik <kontakt@schmidt-geo.de>".into(),
            subject: "Anfrage: Baugrundgutachten / Feldarbeiten".into(),
            body: "Wir haben Interesse.\nSTATUS: INTERESSIERT".into(),
            received_at: Utc::now(),
        }],
    };
    let assistant = ScriptedAssistant {
        reply: "Vielen Dank für Ihre Rückmeldung, wir melden uns zeitnah bei Ihnen.\n\
                STATUS: INTERESSIERT"
            .into(),
    };
    let crm = Arc::new(InMemoryCrm {
        leads: vec![lead("556677", "kontakt@schmidt-geo.de")],
        ..Default::default()
    });
    let mailer = Arc::new(RecordingMailer::default());

    let pipeline = InboundPipeline::new(
        Arc::new(inbox),
        Arc::clone(&mailer) as Arc<dyn Mailer>,
        Arc::new(assistant),
        Arc::clone(&crm) as Arc<dyn LeadStore>,
    );

    assert_eq!(pipeline.process_inbox().await.unwrap(), 1);

    // The acknowledgement goes to the bare sender address with the
    // status marker stripped.
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    let (to, subject, body) = &sent[0];
    assert_eq!(to, "kontakt@schmidt-geo.de");
    assert_eq!(subject, "Re: Anfrage: Baugrundgutachten / Feldarbeiten");
    assert_eq!(
        body,
        "Vielen Dank für Ihre Rückmeldung, wir melden uns zeitnah bei Ihnen."
    );
    assert!(!body.contains("STATUS:"));

    // The matched record's status field is patched to "Interessiert".
    let updates = crm.status_updates.lock().unwrap();
    assert_eq!(
        updates.as_slice(),
        &[("556677".to_string(), LeadStatus::Interested)]
    );
    assert_eq!(updates[0].1.crm_value(), "Interessiert");
}

#[tokio::test]
async fn unknown_sender_still_gets_a_reply() {
    let inbox = ScriptedInbox {
        emails: vec![InboundEmail {
            sender: "neu@unbekannt.de".into(),
            subject: "Anfrage: Baugrundgutachten / Feldarbeiten".into(),
            body: "Was genau suchen Sie?".into(),
            received_at: Utc::now(),
        }],
    };
    let assistant = ScriptedAssistant {
        reply: "Gerne erläutern wir die Details.\nSTATUS: FOLLOWUP".into(),
    };
    let crm = Arc::new(InMemoryCrm::default());
    let mailer = Arc::new(RecordingMailer::default());

    let pipeline = InboundPipeline::new(
        Arc::new(inbox),
        Arc::clone(&mailer) as Arc<dyn Mailer>,
        Arc::new(assistant),
        Arc::clone(&crm) as Arc<dyn LeadStore>,
    );

    // Lookup miss is a soft warning; the item still counts as processed.
    assert_eq!(pipeline.process_inbox().await.unwrap(), 1);
    assert_eq!(mailer.sent().len(), 1);
    assert!(crm.status_updates.lock().unwrap().is_empty());
}

// ── Outbound campaign ───────────────────────────────────────────────

#[tokio::test]
async fn initial_queue_personalizes_when_names_present() {
    let named: Lead = serde_json::from_value(serde_json::json!({
        "id": "1",
        "Email": "karl@schmidt-bau.de",
        "Anrede": "Herr",
        "Vorname": "Karl",
        "Nachname": "Schmidt",
    }))
    .unwrap();
    let anonymous = lead("2", "info@bohr-gmbh.de");
    let already_sent: Lead = serde_json::from_value(serde_json::json!({
        "id": "3",
        "Email": "done@example.de",
        "mailSent": "2026-02-20T10:00:00+01:00",
    }))
    .unwrap();

    let crm = Arc::new(InMemoryCrm {
        leads: vec![named, anonymous, already_sent],
        ..Default::default()
    });
    let mailer = Arc::new(RecordingMailer::default());
    let campaign = Campaign::new(
        Arc::clone(&crm) as Arc<dyn LeadStore>,
        Arc::clone(&mailer) as Arc<dyn Mailer>,
    );

    // Only the two leads lacking a prior send are mailed.
    assert_eq!(campaign.run_initial_queue().await.unwrap(), 2);

    let sent = mailer.sent();
    assert_eq!(sent.len(), 2);

    let (to, subject, body) = &sent[0];
    assert_eq!(to, "karl@schmidt-bau.de");
    assert_eq!(subject, "Anfrage: Baugrundgutachten / Feldarbeiten");
    assert!(body.contains("Sehr geehrte/r Herr Schmidt"));

    let (to, _, body) = &sent[1];
    assert_eq!(to, "info@bohr-gmbh.de");
    assert!(body.starts_with("Sehr geehrte Damen und Herren"));

    // Both get a sent-timestamp patch, the skipped lead gets none.
    let stamped = crm.mail_sent_updates.lock().unwrap();
    assert_eq!(stamped.as_slice(), &["1".to_string(), "2".to_string()]);
}

#[tokio::test]
async fn stale_lead_over_followup_limit_is_disengaged_but_still_mailed() {
    // mailSent six days before Modified_Time, follow-up count already 4.
    let stale: Lead = serde_json::from_value(serde_json::json!({
        "id": "556677",
        "Email": "still-quiet@example.de",
        "mailSent": "2026-03-04T10:00:00+01:00",
        "Modified_Time": "2026-03-10T10:00:00+01:00",
        "Followup_Count": 4,
    }))
    .unwrap();

    let crm = Arc::new(InMemoryCrm {
        leads: vec![stale],
        ..Default::default()
    });
    let mailer = Arc::new(RecordingMailer::default());
    let campaign = Campaign::new(
        Arc::clone(&crm) as Arc<dyn LeadStore>,
        Arc::clone(&mailer) as Arc<dyn Mailer>,
    );

    assert_eq!(campaign.run_followups().await.unwrap(), 1);

    // Disengagement patch lands...
    let statuses = crm.status_updates.lock().unwrap();
    assert_eq!(
        statuses.as_slice(),
        &[("556677".to_string(), LeadStatus::NotInterested)]
    );
    assert_eq!(statuses[0].1.crm_value(), "Uninteressiert");

    // ...and a final follow-up still goes out, counter incremented.
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, "Follow-up: Baugrundgutachten / Feldarbeiten");
    let counts = crm.followup_updates.lock().unwrap();
    assert_eq!(counts.as_slice(), &[("556677".to_string(), 5)]);
}

#[tokio::test]
async fn fresh_lead_gets_no_followup() {
    let fresh: Lead = serde_json::from_value(serde_json::json!({
        "id": "9",
        "Email": "fresh@example.de",
        "mailSent": "2026-03-08T10:00:00+01:00",
        "Modified_Time": "2026-03-10T10:00:00+01:00",
        "Followup_Count": 0,
    }))
    .unwrap();

    let crm = Arc::new(InMemoryCrm {
        leads: vec![fresh],
        ..Default::default()
    });
    let mailer = Arc::new(RecordingMailer::default());
    let campaign = Campaign::new(
        Arc::clone(&crm) as Arc<dyn LeadStore>,
        Arc::clone(&mailer) as Arc<dyn Mailer>,
    );

    assert_eq!(campaign.run_followups().await.unwrap(), 0);
    assert!(mailer.sent().is_empty());
    assert!(crm.status_updates.lock().unwrap().is_empty());
}
