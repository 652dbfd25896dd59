//! HTTP control surface — trigger endpoints for the outbound jobs.
//!
//! The same campaign functions run here and under the scheduler; the
//! endpoints exist so operators can trigger a cycle on demand.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use crate::campaign::Campaign;
use crate::error::Error;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub campaign: Arc<Campaign>,
}

/// Build the control-surface router.
pub fn routes(campaign: Arc<Campaign>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process_email_queue", post(process_email_queue))
        .route("/send_followups", post(send_followups))
        .with_state(AppState { campaign })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "outreach-assist",
    }))
}

async fn process_email_queue(State(state): State<AppState>) -> impl IntoResponse {
    job_response("process_email_queue", state.campaign.run_initial_queue().await)
}

async fn send_followups(State(state): State<AppState>) -> impl IntoResponse {
    job_response("send_followups", state.campaign.run_followups().await)
}

fn job_response(job: &str, outcome: Result<usize, Error>) -> (StatusCode, Json<serde_json::Value>) {
    match outcome {
        Ok(processed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "processed_entries": processed,
            })),
        ),
        Err(e) => {
            tracing::error!(job = job, error = %e, "Triggered job failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::crm::{Lead, LeadRef, LeadStore};
    use crate::error::{CrmError, MailError};
    use crate::mail::Mailer;
    use crate::status::LeadStatus;

    struct EmptyLeads;

    #[async_trait]
    impl LeadStore for EmptyLeads {
        async fn leads_for_outreach(&self) -> Result<Vec<Lead>, CrmError> {
            Ok(Vec::new())
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<LeadRef>, CrmError> {
            Ok(None)
        }
        async fn update_status(&self, _id: &str, _status: LeadStatus) -> Result<(), CrmError> {
            Ok(())
        }
        async fn update_mail_sent(
            &self,
            _id: &str,
            _sent_at: DateTime<Utc>,
        ) -> Result<(), CrmError> {
            Ok(())
        }
        async fn update_followup_count(&self, _id: &str, _count: u32) -> Result<(), CrmError> {
            Ok(())
        }
    }

    struct FailingLeads;

    #[async_trait]
    impl LeadStore for FailingLeads {
        async fn leads_for_outreach(&self) -> Result<Vec<Lead>, CrmError> {
            Err(CrmError::Transport("connection refused".into()))
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<LeadRef>, CrmError> {
            Ok(None)
        }
        async fn update_status(&self, _id: &str, _status: LeadStatus) -> Result<(), CrmError> {
            Ok(())
        }
        async fn update_mail_sent(
            &self,
            _id: &str,
            _sent_at: DateTime<Utc>,
        ) -> Result<(), CrmError> {
            Ok(())
        }
        async fn update_followup_count(&self, _id: &str, _count: u32) -> Result<(), CrmError> {
            Ok(())
        }
    }

    struct NullMailer;

    #[async_trait]
    impl Mailer for NullMailer {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_queue_reports_zero_processed() {
        let campaign = Arc::new(Campaign::new(Arc::new(EmptyLeads), Arc::new(NullMailer)));
        let outcome = campaign.run_initial_queue().await;
        let (status, Json(body)) = job_response("process_email_queue", outcome);

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["processed_entries"], 0);
    }

    #[tokio::test]
    async fn failed_job_maps_to_500_with_message() {
        let campaign = Arc::new(Campaign::new(Arc::new(FailingLeads), Arc::new(NullMailer)));
        let outcome = campaign.run_initial_queue().await;
        let (status, Json(body)) = job_response("process_email_queue", outcome);

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("connection refused")
        );
    }

    #[test]
    fn routes_build() {
        let campaign = Arc::new(Campaign::new(Arc::new(EmptyLeads), Arc::new(NullMailer)));
        let _router = routes(campaign);
    }
}
