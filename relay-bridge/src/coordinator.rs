//! Session lifecycle and message routing.
//!
//! The coordinator owns every piece of per-session state: which sessions
//! are open (tracker), which conversation continuation belongs to which
//! key (cache), and the dispatcher executing backend turns. It is driven
//! from a single engine task, so none of its methods need internal
//! locking beyond what the cache and dispatcher already carry.
//!
//! A session key names a chat window. The conversation key is finer
//! grained: direct chats use the session key itself, group chats use
//! `{session}.{sender}` so the same person in two groups holds two
//! independent continuations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, LocalResult, TimeZone, Utc};

use relay_common::config::EngineConfig;
use relay_common::text::{parse_message_time, strip_mentions, strip_tags};

use crate::backend::{BackendClient, Outcome};
use crate::cache::ConversationCache;
use crate::dispatch::{RequestDispatcher, RequestResult};
use crate::driver::{InboundMessage, MessageKind, SessionDriver};
use crate::tracker::SessionTracker;

/// History older than this is not replayed when a session opens.
const BACKFILL_FRESH_SECS: i64 = 60;

// ============================================================================
// Coordinator
// ============================================================================

/// Routes inbound messages to the backend and replies to the driver.
pub struct SessionCoordinator {
    driver: Arc<dyn SessionDriver>,
    backend: Arc<BackendClient>,
    dispatcher: RequestDispatcher,
    cache: ConversationCache,
    tracker: SessionTracker,
    self_nickname: String,
    max_open_sessions: usize,
    strip_tags: Vec<String>,
}

impl SessionCoordinator {
    /// Create a coordinator and spawn its request workers.
    ///
    /// Must be called from within a runtime.
    pub fn new(
        driver: Arc<dyn SessionDriver>,
        backend: Arc<BackendClient>,
        config: &EngineConfig,
    ) -> Self {
        let dispatcher = RequestDispatcher::new(config.workers, Arc::clone(&backend));
        Self {
            driver,
            backend,
            dispatcher,
            cache: ConversationCache::new(config.cache_capacity),
            tracker: SessionTracker::new(),
            self_nickname: config.self_nickname.clone(),
            max_open_sessions: config.max_open_sessions,
            strip_tags: config.strip_tags.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Open a session, evicting the least recently active one first if
    /// the bound is reached. Returns whether the session is now open.
    ///
    /// A freshly opened session is backfilled: its most recent contact
    /// message is replayed unless the history's newest timestamp marker
    /// says it is stale.
    pub async fn admit(&mut self, session: &str) -> bool {
        self.enforce_capacity().await;
        if let Err(e) = self.driver.listen(session).await {
            tracing::warn!(session = %session, error = %e, "Failed to open session");
            return false;
        }
        self.tracker.touch(session, Utc::now());
        tracing::info!(
            session = %session,
            open = self.tracker.len(),
            "Session opened"
        );
        self.backfill(session).await;
        true
    }

    /// Evict sessions until one admission fits under the bound.
    ///
    /// A close failure moves on to the next-oldest candidate instead of
    /// giving up, so the bound holds even when the driver misbehaves.
    /// Conversation bindings are left alone: they belong to the backend
    /// continuation, not to the open window.
    async fn enforce_capacity(&mut self) {
        if self.tracker.len() < self.max_open_sessions {
            return;
        }
        while let Some((oldest, _)) = self.tracker.oldest() {
            self.tracker.remove(&oldest);
            match self.driver.unlisten(&oldest).await {
                Ok(()) => {
                    tracing::info!(session = %oldest, "Evicted least recently active session");
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        session = %oldest,
                        error = %e,
                        "Failed to close session, trying next oldest"
                    );
                }
            }
        }
    }

    /// Replay the newest history entry of a just-opened session.
    ///
    /// The newest timestamp marker in the history gates the replay: when
    /// it parses to a time older than [`BACKFILL_FRESH_SECS`] the entry
    /// is skipped, though recency is still recorded from the marker so
    /// a quiet session is the first eviction candidate.
    async fn backfill(&mut self, session: &str) {
        let history = match self.driver.history(session).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "Failed to read session history");
                return;
            }
        };
        let Some(last) = history.last() else {
            return;
        };

        let marker = history
            .iter()
            .rev()
            .find(|m| m.kind == MessageKind::TimeMarker);
        if let Some(marker) = marker {
            if let Some(parsed) = parse_message_time(&marker.content, Local::now().naive_local()) {
                let marker_time = marker_to_utc(Local.from_local_datetime(&parsed));
                self.tracker.touch(session, marker_time);
                let age = Utc::now().signed_duration_since(marker_time);
                if age.num_seconds() > BACKFILL_FRESH_SECS {
                    tracing::info!(
                        session = %session,
                        age_secs = age.num_seconds(),
                        "History is stale, not replaying"
                    );
                    return;
                }
            } else {
                tracing::debug!(
                    session = %session,
                    marker = %marker.content,
                    "Unrecognized timestamp marker, replaying ungated"
                );
            }
        }

        if last.kind != MessageKind::Contact {
            tracing::debug!(session = %session, "Newest history entry is not a contact message");
            return;
        }
        self.handle_inbound(last);
    }

    // ------------------------------------------------------------------
    // Inbound routing
    // ------------------------------------------------------------------

    /// Route one inbound message to the backend.
    ///
    /// Only contact messages are routed. Group messages must mention the
    /// configured nickname or they are dropped. Enqueueing never waits
    /// on the network: the request executes on the worker pool and its
    /// result comes back through [`Self::drain_results`].
    pub fn handle_inbound(&mut self, message: &InboundMessage) {
        if message.kind != MessageKind::Contact {
            return;
        }
        if self.tracker.contains(&message.session) {
            self.tracker.touch(&message.session, Utc::now());
        }

        let (conversation_key, user) = if message.is_group() {
            let mention = format!("@{}", self.self_nickname);
            if !message.content.contains(&mention) {
                tracing::debug!(
                    session = %message.session,
                    sender = %message.sender,
                    "Group message does not mention us, ignoring"
                );
                return;
            }
            (
                format!("{}.{}", message.session, message.sender),
                message.sender.as_str(),
            )
        } else {
            (message.session.clone(), message.session.as_str())
        };

        let query = strip_mentions(&message.content);
        let conversation_id = self.cache.lookup(&conversation_key).unwrap_or_default();
        let request = self
            .backend
            .chat_request(&conversation_key, &query, &conversation_id, user);
        tracing::info!(
            session = %message.session,
            sender = %message.sender,
            conversation_key = %conversation_key,
            request_id = %request.request_id,
            "Dispatching chat request"
        );
        if let Err(e) = self.dispatcher.submit(request, &message.session, &message.sender) {
            tracing::warn!(session = %message.session, error = %e, "Failed to dispatch request");
        }
    }

    // ------------------------------------------------------------------
    // Result delivery
    // ------------------------------------------------------------------

    /// Drain every completed result and reply to its session.
    pub async fn drain_results(&mut self) {
        while let Some(result) = self.dispatcher.poll(Duration::ZERO).await {
            self.handle_result(result).await;
        }
    }

    /// Wait up to `timeout` for one completed result.
    pub async fn next_result(&mut self, timeout: Duration) -> Option<RequestResult> {
        self.dispatcher.poll(timeout).await
    }

    /// Wait for the next completed result, however long it takes.
    ///
    /// Returns `None` only if the worker pool has gone away entirely.
    pub async fn recv_result(&mut self) -> Option<RequestResult> {
        self.dispatcher.recv().await
    }

    /// Apply one completed result: update the conversation binding and
    /// send the reply (or a diagnostic) back through the driver.
    pub async fn handle_result(&mut self, result: RequestResult) {
        if self.tracker.contains(&result.session_key) {
            self.tracker.touch(&result.session_key, Utc::now());
        }

        let reply = match result.outcome {
            Outcome::Answer {
                answer,
                conversation_id,
            } => {
                self.cache
                    .lookup_or_seed(&result.conversation_key, &conversation_id);
                tracing::info!(
                    request_id = %result.request_id,
                    conversation_key = %result.conversation_key,
                    "Chat request succeeded"
                );
                strip_tags(&answer, &self.strip_tags).trim().to_string()
            }
            Outcome::StaleConversation { detail } => {
                self.cache.remove(&result.conversation_key);
                tracing::warn!(
                    request_id = %result.request_id,
                    conversation_key = %result.conversation_key,
                    detail = %detail,
                    "Conversation no longer exists, binding dropped"
                );
                format!("This conversation has expired, please start a new one. {detail}")
            }
            Outcome::Failed { status, detail } => {
                tracing::warn!(
                    request_id = %result.request_id,
                    status = ?status,
                    detail = %detail,
                    "Chat request failed"
                );
                match status {
                    Some(status) => {
                        format!("Request failed, please try again later (status {status}): {detail}")
                    }
                    None => format!("Request failed, please try again later: {detail}"),
                }
            }
        };

        let at = (result.session_key != result.sender_key).then_some(result.sender_key.as_str());
        if let Err(e) = self.driver.send(&result.session_key, &reply, at).await {
            tracing::warn!(
                session = %result.session_key,
                error = %e,
                "Failed to deliver reply"
            );
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Number of currently open sessions.
    pub fn open_sessions(&self) -> usize {
        self.tracker.len()
    }

    /// Whether `session` is currently open.
    pub fn is_listening(&self, session: &str) -> bool {
        self.tracker.contains(session)
    }

    /// Conversation binding for `conversation_key`, if one exists.
    pub fn binding(&self, conversation_key: &str) -> Option<String> {
        self.cache.lookup(conversation_key)
    }

    /// Shut the dispatcher down. With `wait`, in-flight requests finish
    /// first and their results stay available via [`Self::next_result`].
    pub async fn shutdown(&mut self, wait: bool) {
        self.dispatcher.shutdown(wait).await;
    }
}

/// Resolve a parsed local marker time to UTC.
///
/// An ambiguous local time (clocks rolled back over it) resolves to its
/// earlier instant; a nonexistent one (clocks jumped over it) counts as
/// just now.
fn marker_to_utc(local: LocalResult<DateTime<Local>>) -> DateTime<Utc> {
    local
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

// ============================================================================
// Tests
// ============================================================================
