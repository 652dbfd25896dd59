//! CRM synchronizer — lead lookup and partial-field patches.
//!
//! The CRM is the sole source of truth for lead state; this module only
//! issues lookups and partial patches keyed by a prior lookup-by-email.
//! Access tokens live in an explicit [`CrmSession`] refreshed on expiry;
//! a 401 still triggers one forced refresh and a single replay before
//! the generic retry policy takes over.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::config::CrmConfig;
use crate::error::CrmError;
use crate::retry::{RetryPolicy, retry};
use crate::status::LeadStatus;

/// Refresh this long before the recorded expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Fallback token lifetime when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

// ── Records ─────────────────────────────────────────────────────────

/// A lead record as returned by the CRM search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(rename = "Email", default)]
    pub email: String,
    #[serde(rename = "Anrede", default)]
    pub salutation: Option<String>,
    #[serde(rename = "Vorname", default)]
    pub first_name: Option<String>,
    #[serde(rename = "Nachname", default)]
    pub last_name: Option<String>,
    #[serde(rename = "mailSent", default)]
    pub mail_sent: Option<String>,
    #[serde(rename = "Modified_Time", default)]
    pub modified_time: Option<String>,
    #[serde(rename = "Followup_Count", default)]
    pub followup_count: Option<u32>,
    #[serde(rename = "make_com_Status", default)]
    pub status: Option<String>,
}

impl Lead {
    /// When the initial mail went out, if recorded.
    pub fn mail_sent_at(&self) -> Option<DateTime<FixedOffset>> {
        parse_crm_timestamp(self.mail_sent.as_deref())
    }

    /// Last modification timestamp, if present.
    pub fn modified_at(&self) -> Option<DateTime<FixedOffset>> {
        parse_crm_timestamp(self.modified_time.as_deref())
    }

    /// Does any name field carry a value?
    pub fn has_name_fields(&self) -> bool {
        let filled = |f: &Option<String>| f.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.salutation) || filled(&self.first_name) || filled(&self.last_name)
    }
}

fn parse_crm_timestamp(raw: Option<&str>) -> Option<DateTime<FixedOffset>> {
    raw.filter(|s| !s.is_empty())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Outcome of a lookup-by-email: the record id plus its follow-up count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadRef {
    pub id: String,
    pub followup_count: Option<u32>,
}

// ── Store trait ─────────────────────────────────────────────────────

/// Lead operations the pipeline and campaign need from the CRM.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Leads in the configured outreach segment.
    async fn leads_for_outreach(&self) -> Result<Vec<Lead>, CrmError>;

    /// Exact-match lookup by email. Zero matches is `Ok(None)`, never an
    /// error; with duplicates the first record wins.
    async fn find_by_email(&self, email: &str) -> Result<Option<LeadRef>, CrmError>;

    async fn update_status(&self, id: &str, status: LeadStatus) -> Result<(), CrmError>;

    async fn update_mail_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<(), CrmError>;

    async fn update_followup_count(&self, id: &str, count: u32) -> Result<(), CrmError>;
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Lead>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
    error: Option<String>,
}

/// Exact-match criteria for a lookup-by-email.
pub fn email_criteria(email: &str) -> String {
    format!("(Email:equals:{email})")
}

/// Partial patch body updating only the status field.
pub fn status_patch(id: &str, status: LeadStatus) -> serde_json::Value {
    serde_json::json!({
        "data": [{
            "id": id,
            "make_com_Status": status.crm_value(),
        }]
    })
}

/// Partial patch body stamping the initial-mail timestamp.
pub fn mail_sent_patch(id: &str, sent_at: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "data": [{
            "id": id,
            "mailSent": sent_at.to_rfc3339_opts(SecondsFormat::Secs, false),
        }]
    })
}

/// Partial patch body updating only the follow-up counter.
pub fn followup_patch(id: &str, count: u32) -> serde_json::Value {
    serde_json::json!({
        "data": [{
            "id": id,
            "Followup_Count": count,
        }]
    })
}

// ── Client ──────────────────────────────────────────────────────────

/// Access token with its recorded expiry.
#[derive(Debug, Clone)]
struct CrmSession {
    access_token: String,
    expires_at: Instant,
}

impl CrmSession {
    fn is_valid(&self, now: Instant) -> bool {
        now + EXPIRY_SKEW < self.expires_at
    }
}

/// CRM REST client with explicit session state.
pub struct CrmClient {
    http: reqwest::Client,
    config: CrmConfig,
    policy: RetryPolicy,
    session: RwLock<Option<CrmSession>>,
}

impl CrmClient {
    pub fn new(config: CrmConfig) -> Self {
        Self::with_policy(config, RetryPolicy::default())
    }

    pub fn with_policy(config: CrmConfig, policy: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            policy,
            session: RwLock::new(None),
        }
    }

    /// A currently valid access token, refreshing if expired or absent.
    async fn access_token(&self) -> Result<String, CrmError> {
        {
            let session = self.session.read().await;
            if let Some(s) = session.as_ref()
                && s.is_valid(Instant::now())
            {
                return Ok(s.access_token.clone());
            }
        }
        self.refresh_session().await
    }

    /// Exchange the refresh token for a fresh access token.
    async fn refresh_session(&self) -> Result<String, CrmError> {
        let token_url = self.config.token_url();
        let this = self;
        let token_url_ref: &str = &token_url;
        let response = retry(&self.policy, "crm.token_refresh", move || async move {
            let params = [
                ("refresh_token", this.config.refresh_token.expose_secret()),
                ("client_id", this.config.client_id.as_str()),
                ("client_secret", this.config.client_secret.expose_secret()),
                ("grant_type", "refresh_token"),
            ];
            let resp = this
                .http
                .post(token_url_ref)
                .form(&params)
                .send()
                .await
                .map_err(|e| CrmError::Transport(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(CrmError::Http {
                    status: status.as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                });
            }
            resp.json::<TokenResponse>()
                .await
                .map_err(|e| CrmError::InvalidResponse(e.to_string()))
        })
        .await?;

        let access_token = response.access_token.ok_or_else(|| {
            CrmError::TokenRefresh(
                response
                    .error
                    .unwrap_or_else(|| "no access_token in token response".into()),
            )
        })?;

        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        *self.session.write().await = Some(CrmSession {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });

        tracing::debug!("CRM session refreshed");
        Ok(access_token)
    }

    /// Send an authorized request; on 401 refresh once and replay.
    async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, CrmError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.access_token().await?;
        let resp = build(&token)
            .send()
            .await
            .map_err(|e| CrmError::Transport(e.to_string()))?;

        if resp.status().as_u16() != 401 {
            return Ok(resp);
        }

        tracing::info!("CRM access token rejected; refreshing and replaying once");
        let token = self.refresh_session().await?;
        build(&token)
            .send()
            .await
            .map_err(|e| CrmError::Transport(e.to_string()))
    }

    /// Criteria search against the module search endpoint.
    ///
    /// The CRM answers an empty segment with 204 No Content.
    async fn search(&self, criteria: &str) -> Result<Vec<Lead>, CrmError> {
        let url = self.config.search_url();
        let this = self;
        let url_ref: &str = &url;
        retry(&self.policy, "crm.search", move || async move {
            let resp = this
                .send_authorized(|token| {
                    this.http
                        .get(url_ref)
                        .header(
                            reqwest::header::AUTHORIZATION,
                            format!("Zoho-oauthtoken {token}"),
                        )
                        .query(&[("criteria", criteria)])
                })
                .await?;

            let status = resp.status();
            if status.as_u16() == 204 {
                return Ok(Vec::new());
            }
            if !status.is_success() {
                return Err(CrmError::Http {
                    status: status.as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                });
            }
            resp.json::<SearchResponse>()
                .await
                .map(|r| r.data)
                .map_err(|e| CrmError::InvalidResponse(e.to_string()))
        })
        .await
    }

    /// PATCH a partial record update.
    async fn patch(&self, id: &str, body: serde_json::Value) -> Result<(), CrmError> {
        let url = self.config.record_url(id);
        let this = self;
        let url_ref: &str = &url;
        let body_ref: &serde_json::Value = &body;
        retry(&self.policy, "crm.patch", move || async move {
            let resp = this
                .send_authorized(|token| {
                    this.http
                        .patch(url_ref)
                        .header(
                            reqwest::header::AUTHORIZATION,
                            format!("Zoho-oauthtoken {token}"),
                        )
                        .json(body_ref)
                })
                .await?;

            let status = resp.status();
            if !status.is_success() {
                return Err(CrmError::Http {
                    status: status.as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                });
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl LeadStore for CrmClient {
    async fn leads_for_outreach(&self) -> Result<Vec<Lead>, CrmError> {
        self.search(&self.config.lead_criteria).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<LeadRef>, CrmError> {
        let leads = self.search(&email_criteria(email)).await?;
        Ok(leads.into_iter().next().map(|lead| LeadRef {
            id: lead.id,
            followup_count: lead.followup_count,
        }))
    }

    async fn update_status(&self, id: &str, status: LeadStatus) -> Result<(), CrmError> {
        tracing::info!(id = %id, status = %status, "Patching lead status");
        self.patch(id, status_patch(id, status)).await
    }

    async fn update_mail_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<(), CrmError> {
        self.patch(id, mail_sent_patch(id, sent_at)).await
    }

    async fn update_followup_count(&self, id: &str, count: u32) -> Result<(), CrmError> {
        self.patch(id, followup_patch(id, count)).await
    }
}
