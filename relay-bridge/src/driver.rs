//! Driver trait for chat automation front-ends.
//!
//! A driver wraps whatever mechanism controls the actual chat program
//! (UI automation, a local socket, a terminal). The engine only ever
//! talks to this trait: enumerate sessions, open or close a listener,
//! read history, send a reply.
//!
//! Live inbound messages are not pulled through the trait. A driver
//! delivers them on an `mpsc` channel handed to the engine when the
//! driver is constructed, so the poll loop drains messages without
//! blocking on the automation layer.

use async_trait::async_trait;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Driver error type.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Failed to listen on session: {0}")]
    ListenFailed(String),

    #[error("Failed to close session: {0}")]
    CloseFailed(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Driver not ready")]
    NotReady,
}

/// One row of the chat program's session panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session name as shown in the panel.
    pub name: String,
    /// Summary of the most recent message.
    pub last_message: String,
    /// Human-readable time text of the most recent message.
    pub last_time_text: String,
    /// Unread message count.
    pub unread: u32,
}

/// Kind of an inbound driver event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Message written by another account.
    Contact,
    /// Echo of a message this account sent.
    SelfSent,
    /// System notice (member joined, recall, ...).
    System,
    /// Timestamp marker rendered between messages.
    TimeMarker,
}

/// A message observed in a listened session.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Session the message belongs to.
    pub session: String,
    /// Sender display name. Equal to `session` for direct chats.
    pub sender: String,
    /// Event kind.
    pub kind: MessageKind,
    /// Raw message text (or time text for markers).
    pub content: String,
}

impl InboundMessage {
    /// True when the sender differs from the session, i.e. a group chat.
    pub fn is_group(&self) -> bool {
        self.sender != self.session
    }
}

/// Chat automation driver.
///
/// Implement this trait to bridge a new chat front-end.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Get the driver name.
    fn name(&self) -> &'static str;

    /// Enumerate the sessions currently visible in the panel.
    async fn sessions(&self) -> DriverResult<Vec<SessionSummary>>;

    /// Start listening on a session. Messages arriving after this call
    /// are delivered on the driver's inbound channel.
    async fn listen(&self, session: &str) -> DriverResult<()>;

    /// Stop listening on a session and release its window.
    async fn unlisten(&self, session: &str) -> DriverResult<()>;

    /// Retrieve all currently loaded messages of a listened session,
    /// oldest first.
    async fn history(&self, session: &str) -> DriverResult<Vec<InboundMessage>>;

    /// Send a message to a session, optionally @-addressed to a member.
    async fn send(&self, session: &str, text: &str, at: Option<&str>) -> DriverResult<()>;
}
