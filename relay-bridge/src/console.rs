//! Console driver for local runs.
//!
//! Presents stdin as a single direct chat session named
//! [`CONSOLE_SESSION`]: every line typed becomes a contact message and
//! replies print to stdout.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::driver::{DriverResult, InboundMessage, MessageKind, SessionDriver, SessionSummary};

/// Name of the synthetic console session.
pub const CONSOLE_SESSION: &str = "console";

/// Stdin/stdout driver, always available, zero deps.
pub struct ConsoleDriver {
    /// Keeps the inbound channel open after stdin reaches end of file,
    /// so replies to in-flight requests still print. Ctrl-C exits.
    _inbound: mpsc::UnboundedSender<InboundMessage>,
}

impl ConsoleDriver {
    /// Spawn the stdin reader and return the driver together with the
    /// receiving end of its inbound channel.
    ///
    /// Must be called from within a runtime.
    pub fn start() -> (Arc<Self>, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(read_stdin(tx.clone()));
        (Arc::new(Self { _inbound: tx }), rx)
    }
}

async fn read_stdin(tx: mpsc::UnboundedSender<InboundMessage>) {
    let stdin = io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let message = InboundMessage {
            session: CONSOLE_SESSION.to_string(),
            sender: CONSOLE_SESSION.to_string(),
            kind: MessageKind::Contact,
            content: line,
        };
        if tx.send(message).is_err() {
            break;
        }
    }
}

#[async_trait]
impl SessionDriver for ConsoleDriver {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn sessions(&self) -> DriverResult<Vec<SessionSummary>> {
        Ok(vec![SessionSummary {
            name: CONSOLE_SESSION.to_string(),
            last_message: String::new(),
            last_time_text: String::new(),
            unread: 0,
        }])
    }

    async fn listen(&self, _session: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn unlisten(&self, _session: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn history(&self, _session: &str) -> DriverResult<Vec<InboundMessage>> {
        Ok(vec![])
    }

    async fn send(&self, _session: &str, text: &str, at: Option<&str>) -> DriverResult<()> {
        match at {
            Some(at) => println!("@{at} {text}"),
            None => println!("{text}"),
        }
        Ok(())
    }
}
