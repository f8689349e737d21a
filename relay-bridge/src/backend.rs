//! Conversational backend client.
//!
//! The backend speaks a blocking chat API: `POST {base_url}/chat-messages`
//! with a bearer token and a JSON body naming the query, the user, and the
//! continuation id of the conversation. A 200 reply carries the answer plus
//! the continuation id to reuse; a 404 means the continuation id is no
//! longer valid on the backend side.

use relay_common::config::BackendConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Wire Types
// ============================================================================

/// Request body for the chat-messages endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatPayload {
    /// Workflow input variables. Always empty for plain chat.
    pub inputs: serde_json::Value,
    /// User message text.
    pub query: String,
    /// Always "blocking": one reply per request.
    pub response_mode: String,
    /// Continuation id from the previous turn, empty to start fresh.
    pub conversation_id: String,
    /// Stable identifier of the person speaking.
    pub user: String,
}

/// Success reply from the chat-messages endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
    /// Answer text, possibly wrapped in reasoning tags.
    #[serde(default)]
    pub answer: String,
    /// Continuation id to reuse on the next turn.
    #[serde(default)]
    pub conversation_id: String,
}

// ============================================================================
// Request / Outcome
// ============================================================================

/// An outbound request descriptor. Immutable once submitted.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// Correlation id carried through to the result.
    pub request_id: String,
    /// Cache key whose conversation binding this turn uses.
    pub conversation_key: String,
    /// Full endpoint URL.
    pub url: String,
    /// Bearer token.
    pub bearer_token: String,
    /// JSON body.
    pub payload: ChatPayload,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Classified outcome of one executed request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// HTTP success with a parsed body.
    Answer {
        answer: String,
        conversation_id: String,
    },
    /// HTTP 404: the continuation id is no longer valid.
    StaleConversation { detail: String },
    /// Any other status, or a transport/timeout error (status absent).
    Failed { status: Option<u16>, detail: String },
}

impl Outcome {
    /// True for a parsed answer.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Answer { .. })
    }

    /// HTTP status associated with this outcome, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Answer { .. } => Some(200),
            Self::StaleConversation { .. } => Some(404),
            Self::Failed { status, .. } => *status,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// HTTP client for the conversational backend.
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    timeout: Duration,
}

impl BackendClient {
    /// Create a new client from configuration.
    pub fn new(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            timeout: config.timeout(),
        }
    }

    /// Build the request descriptor for one conversation turn.
    pub fn chat_request(
        &self,
        conversation_key: &str,
        query: &str,
        conversation_id: &str,
        user: &str,
    ) -> OutboundRequest {
        OutboundRequest {
            request_id: Uuid::new_v4().to_string(),
            conversation_key: conversation_key.to_string(),
            url: format!("{}/chat-messages", self.base_url),
            bearer_token: self.api_token.clone(),
            payload: ChatPayload {
                inputs: serde_json::json!({}),
                query: query.to_string(),
                response_mode: "blocking".to_string(),
                conversation_id: conversation_id.to_string(),
                user: user.to_string(),
            },
            timeout: self.timeout,
        }
    }

    /// Execute a request and classify the outcome.
    ///
    /// Never fails: transport errors, bad statuses, and malformed bodies
    /// all map onto `Outcome` variants so one hung or broken request
    /// cannot take a worker down.
    pub async fn execute(&self, request: &OutboundRequest) -> Outcome {
        tracing::debug!(
            request_id = %request.request_id,
            url = %request.url,
            user = %request.payload.user,
            "Dispatching chat request"
        );

        let response = self
            .client
            .post(&request.url)
            .bearer_auth(&request.bearer_token)
            .json(&request.payload)
            .timeout(request.timeout)
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                return Outcome::Failed {
                    status: None,
                    detail: format!("Request failed: {e}"),
                }
            }
        };

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            let detail = response.text().await.unwrap_or_default();
            return Outcome::StaleConversation { detail };
        }

        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Outcome::Failed {
                status: Some(status.as_u16()),
                detail,
            };
        }

        match response.json::<ChatReply>().await {
            Ok(reply) => Outcome::Answer {
                answer: reply.answer,
                conversation_id: reply.conversation_id,
            },
            Err(e) => Outcome::Failed {
                status: Some(status.as_u16()),
                detail: format!("Malformed reply body: {e}"),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
