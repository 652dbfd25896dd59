//! Conversational assistant invoker.
//!
//! Speaks the hosted assistant's thread/run API over reqwest: create a
//! thread, post the composed message, start a run, poll to a terminal
//! state (bounded by a configurable timeout), then take the newest
//! assistant message. Failures are typed — callers must handle them,
//! never treat error text as reply content.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::time::{Instant, sleep};

use crate::config::AssistantConfig;
use crate::error::AssistantError;
use crate::mail::InboundEmail;
use crate::retry::{RetryPolicy, retry};

/// Classifies an inbound email into a reply carrying a status marker.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, email: &InboundEmail) -> Result<String, AssistantError>;
}

/// The message text submitted to the assistant.
pub fn compose_prompt(email: &InboundEmail) -> String {
    format!("Subject: {}\n\nBody: {}", email.subject, email.body)
}

// ── Wire shapes ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunState {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

/// Polling verdict for a run status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPoll {
    Done,
    Pending,
    Failed,
}

fn poll_state(status: &str) -> RunPoll {
    match status {
        "completed" => RunPoll::Done,
        "queued" | "in_progress" | "cancelling" => RunPoll::Pending,
        _ => RunPoll::Failed,
    }
}

/// Newest assistant message text from a (newest-first) message listing.
fn extract_reply(list: &MessageList) -> Result<String, AssistantError> {
    list.data
        .iter()
        .find(|m| m.role == "assistant")
        .and_then(|m| m.content.iter().find_map(|p| p.text.as_ref()))
        .map(|t| t.value.clone())
        .ok_or(AssistantError::EmptyReply)
}

// ── Client ──────────────────────────────────────────────────────────

/// Hosted assistant API client.
pub struct AssistantClient {
    http: reqwest::Client,
    config: AssistantConfig,
    policy: RetryPolicy,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> Self {
        Self::with_policy(config, RetryPolicy::default())
    }

    pub fn with_policy(config: AssistantConfig, policy: RetryPolicy) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            policy,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    async fn post_json<T>(&self, url: &str, body: serde_json::Value) -> Result<T, AssistantError>
    where
        T: DeserializeOwned,
    {
        let this = self;
        let body_ref = &body;
        retry(&self.policy, "assistant.post", move || async move {
            let resp = this
                .http
                .post(url)
                .bearer_auth(this.config.api_key.expose_secret())
                .header("OpenAI-Beta", "assistants=v2")
                .json(body_ref)
                .send()
                .await
                .map_err(|e| AssistantError::Transport(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AssistantError::Http {
                    status: status.as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                });
            }
            resp.json::<T>()
                .await
                .map_err(|e| AssistantError::InvalidResponse(e.to_string()))
        })
        .await
    }

    async fn get_json<T>(&self, url: &str) -> Result<T, AssistantError>
    where
        T: DeserializeOwned,
    {
        let this = self;
        retry(&self.policy, "assistant.get", move || async move {
            let resp = this
                .http
                .get(url)
                .bearer_auth(this.config.api_key.expose_secret())
                .header("OpenAI-Beta", "assistants=v2")
                .send()
                .await
                .map_err(|e| AssistantError::Transport(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AssistantError::Http {
                    status: status.as_u16(),
                    body: resp.text().await.unwrap_or_default(),
                });
            }
            resp.json::<T>()
                .await
                .map_err(|e| AssistantError::InvalidResponse(e.to_string()))
        })
        .await
    }

    /// Poll the run until it completes or the configured timeout elapses.
    async fn await_run(&self, thread_id: &str, run_id: &str) -> Result<(), AssistantError> {
        let url = self.url(&format!("/threads/{thread_id}/runs/{run_id}"));
        let deadline = Instant::now() + self.config.poll_timeout;

        loop {
            let run: RunState = self.get_json(&url).await?;
            match poll_state(&run.status) {
                RunPoll::Done => return Ok(()),
                RunPoll::Failed => {
                    return Err(AssistantError::RunFailed { status: run.status });
                }
                RunPoll::Pending => {
                    if Instant::now() >= deadline {
                        return Err(AssistantError::Timeout {
                            waited: self.config.poll_timeout,
                        });
                    }
                    sleep(self.config.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl Classifier for AssistantClient {
    async fn classify(&self, email: &InboundEmail) -> Result<String, AssistantError> {
        let thread: ApiObject = self
            .post_json(&self.url("/threads"), serde_json::json!({}))
            .await?;
        tracing::debug!(thread = %thread.id, "Assistant thread created");

        let _message: ApiObject = self
            .post_json(
                &self.url(&format!("/threads/{}/messages", thread.id)),
                serde_json::json!({
                    "role": "user",
                    "content": compose_prompt(email),
                }),
            )
            .await?;

        let run: RunState = self
            .post_json(
                &self.url(&format!("/threads/{}/runs", thread.id)),
                serde_json::json!({ "assistant_id": self.config.assistant_id }),
            )
            .await?;

        self.await_run(&thread.id, &run.id).await?;

        let messages: MessageList = self
            .get_json(&self.url(&format!("/threads/{}/messages", thread.id)))
            .await?;
        extract_reply(&messages)
    }
}
