//! The bridge's main loop.
//!
//! One task owns the whole control flow: a periodic tick scans the
//! driver's session panel for candidates to admit, while inbound
//! messages and completed backend results are handled as they arrive.
//! Workers executing HTTP turns are the only other tasks; everything
//! they produce flows back here through the dispatcher's queue.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use relay_common::{Error, Result};

use crate::coordinator::SessionCoordinator;
use crate::driver::{InboundMessage, SessionDriver};

// ============================================================================
// Engine
// ============================================================================

/// Discovery and event loop around a [`SessionCoordinator`].
pub struct Engine {
    coordinator: SessionCoordinator,
    driver: Arc<dyn SessionDriver>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
    poll_interval: Duration,
    filter_sessions: HashSet<String>,
    listen_sessions: Vec<String>,
    /// Sessions already admitted once. A seen session is only admitted
    /// again when the panel shows unread activity for it.
    seen: HashSet<String>,
}

impl Engine {
    /// Wire an engine to a coordinator and a driver's inbound channel.
    pub fn new(
        coordinator: SessionCoordinator,
        driver: Arc<dyn SessionDriver>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        config: &relay_common::config::EngineConfig,
    ) -> Self {
        Self {
            coordinator,
            driver,
            inbound,
            poll_interval: config.poll_interval(),
            filter_sessions: config.filter_sessions.clone(),
            listen_sessions: config.listen_sessions.clone(),
            seen: HashSet::new(),
        }
    }

    /// Run until the driver's channels close.
    ///
    /// Per-tick trouble (an unreadable panel, one failed admission) is
    /// logged and retried on the next tick; only a torn-down channel
    /// ends the loop, and that is left to the supervisor to handle.
    pub async fn run(&mut self) -> Result<()> {
        self.bootstrap().await;

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.discover_sessions().await;
                }
                message = self.inbound.recv() => {
                    let Some(message) = message else {
                        return Err(Error::ChannelRecv
                            .with_context("inbound message channel closed"));
                    };
                    self.coordinator.handle_inbound(&message);
                }
                result = self.coordinator.recv_result() => {
                    let Some(result) = result else {
                        return Err(Error::ChannelRecv
                            .with_context("result delivery queue closed"));
                    };
                    self.coordinator.handle_result(result).await;
                }
            }
        }
    }

    /// Open the configured listen list before the first tick.
    async fn bootstrap(&mut self) {
        for session in &self.listen_sessions {
            if self.coordinator.admit(session).await {
                self.seen.insert(session.clone());
            }
        }
    }

    /// Admit panel sessions that are new or showing unread activity.
    async fn discover_sessions(&mut self) {
        let summaries = match self.driver.sessions().await {
            Ok(summaries) => summaries,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session panel");
                return;
            }
        };

        let mut fresh: Vec<String> = Vec::new();
        for summary in summaries {
            if summary.name.is_empty()
                || self.filter_sessions.contains(&summary.name)
                || self.coordinator.is_listening(&summary.name)
            {
                continue;
            }
            if self.seen.contains(&summary.name) && summary.unread == 0 {
                continue;
            }
            fresh.push(summary.name);
        }
        if fresh.is_empty() {
            return;
        }

        tracing::info!(sessions = ?fresh, "Admitting sessions");
        // The panel lists newest first; admit bottom-up so the newest
        // session ends up most recently touched. Failed admissions are
        // not marked seen and get another attempt next tick.
        for session in fresh.into_iter().rev() {
            if self.coordinator.admit(&session).await {
                self.seen.insert(session);
            }
        }
    }

    /// The coordinator behind this engine.
    pub fn coordinator(&self) -> &SessionCoordinator {
        &self.coordinator
    }

    /// Shut the request pool down and deliver whatever replies have
    /// already completed. With `wait`, in-flight turns finish first.
    pub async fn shutdown(&mut self, wait: bool) {
        self.coordinator.shutdown(wait).await;
        self.coordinator.drain_results().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendClient;
    use crate::driver::{DriverResult, MessageKind, SessionSummary};
    use relay_common::config::{BackendConfig, EngineConfig};
    use std::sync::Mutex;

    /// Driver stub with a mutable session panel.
    #[derive(Default)]
    struct PanelDriver {
        panel: Mutex<Vec<SessionSummary>>,
        listened: Mutex<Vec<String>>,
        closed: Mutex<Vec<String>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl PanelDriver {
        fn set_panel(&self, names: &[(&str, u32)]) {
            let rows = names
                .iter()
                .map(|(name, unread)| SessionSummary {
                    name: (*name).to_string(),
                    last_message: String::new(),
                    last_time_text: String::new(),
                    unread: *unread,
                })
                .collect();
            *self.panel.lock().unwrap() = rows;
        }
    }

    #[async_trait::async_trait]
    impl SessionDriver for PanelDriver {
        fn name(&self) -> &'static str {
            "panel"
        }

        async fn sessions(&self) -> DriverResult<Vec<SessionSummary>> {
            Ok(self.panel.lock().unwrap().clone())
        }

        async fn listen(&self, session: &str) -> DriverResult<()> {
            self.listened.lock().unwrap().push(session.to_string());
            Ok(())
        }

        async fn unlisten(&self, session: &str) -> DriverResult<()> {
            self.closed.lock().unwrap().push(session.to_string());
            Ok(())
        }

        async fn history(&self, _session: &str) -> DriverResult<Vec<InboundMessage>> {
            Ok(vec![])
        }

        async fn send(&self, session: &str, text: &str, _at: Option<&str>) -> DriverResult<()> {
            self.sent
                .lock()
                .unwrap()
                .push((session.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn test_config(max_open_sessions: usize, listen_sessions: Vec<String>) -> EngineConfig {
        EngineConfig {
            self_nickname: "bot".to_string(),
            max_open_sessions,
            workers: 2,
            poll_interval_ms: 10,
            listen_sessions,
            ..EngineConfig::default()
        }
    }

    fn build_engine(
        driver: Arc<PanelDriver>,
        config: &EngineConfig,
    ) -> (Engine, mpsc::UnboundedSender<InboundMessage>) {
        let backend = Arc::new(BackendClient::new(&BackendConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            api_token: String::new(),
            timeout_secs: 5,
        }));
        let coordinator = SessionCoordinator::new(
            Arc::clone(&driver) as Arc<dyn SessionDriver>,
            backend,
            config,
        );
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = Engine::new(coordinator, driver, rx, config);
        (engine, tx)
    }

    async fn run_for(engine: &mut Engine, millis: u64) {
        let _ = tokio::time::timeout(Duration::from_millis(millis), engine.run()).await;
    }

    #[tokio::test]
    async fn bootstrap_opens_configured_sessions() {
        let driver = Arc::new(PanelDriver::default());
        let config = test_config(4, vec!["alice".to_string()]);
        let (mut engine, _tx) = build_engine(Arc::clone(&driver), &config);

        run_for(&mut engine, 100).await;

        assert!(engine.coordinator().is_listening("alice"));
        assert_eq!(driver.listened.lock().unwrap().as_slice(), ["alice"]);
    }

    #[tokio::test]
    async fn discovery_admits_new_panel_sessions_once() {
        let driver = Arc::new(PanelDriver::default());
        driver.set_panel(&[("bob", 0)]);
        let config = test_config(4, vec![]);
        let (mut engine, _tx) = build_engine(Arc::clone(&driver), &config);

        run_for(&mut engine, 150).await;

        assert!(engine.coordinator().is_listening("bob"));
        assert_eq!(driver.listened.lock().unwrap().as_slice(), ["bob"]);
    }

    #[tokio::test]
    async fn filtered_sessions_are_never_admitted() {
        let driver = Arc::new(PanelDriver::default());
        driver.set_panel(&[("system notice", 3)]);
        let mut config = test_config(4, vec![]);
        config.filter_sessions.insert("system notice".to_string());
        let (mut engine, _tx) = build_engine(Arc::clone(&driver), &config);

        run_for(&mut engine, 150).await;

        assert!(driver.listened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn evicted_session_readmitted_only_on_unread_activity() {
        let driver = Arc::new(PanelDriver::default());
        driver.set_panel(&[("alice", 0)]);
        let config = test_config(1, vec![]);
        let (engine, _tx) = build_engine(Arc::clone(&driver), &config);

        let handle = tokio::spawn(async move {
            let mut engine = engine;
            run_for(&mut engine, 700).await;
            engine
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        // Bob shows up: capacity 1 evicts alice.
        driver.set_panel(&[("bob", 0), ("alice", 0)]);
        tokio::time::sleep(Duration::from_millis(200)).await;
        // A quiet alice stays evicted until she has unread messages.
        assert_eq!(driver.listened.lock().unwrap().as_slice(), ["alice", "bob"]);
        driver.set_panel(&[("bob", 0), ("alice", 2)]);
        tokio::time::sleep(Duration::from_millis(200)).await;

        let engine = handle.await.expect("engine task");
        assert_eq!(
            driver.listened.lock().unwrap().as_slice(),
            ["alice", "bob", "alice"]
        );
        assert!(engine.coordinator().is_listening("alice"));
        assert!(!engine.coordinator().is_listening("bob"));
    }

    #[tokio::test]
    async fn closed_inbound_channel_ends_the_run() {
        let driver = Arc::new(PanelDriver::default());
        let config = test_config(4, vec![]);
        let (mut engine, tx) = build_engine(driver, &config);
        drop(tx);

        let outcome = tokio::time::timeout(Duration::from_secs(1), engine.run()).await;
        let result = outcome.expect("run should end promptly");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn inbound_message_produces_a_reply() {
        let driver = Arc::new(PanelDriver::default());
        let config = test_config(4, vec![]);
        let (mut engine, tx) = build_engine(Arc::clone(&driver), &config);

        tx.send(InboundMessage {
            session: "alice".to_string(),
            sender: "alice".to_string(),
            kind: MessageKind::Contact,
            content: "hello".to_string(),
        })
        .expect("send inbound");

        run_for(&mut engine, 500).await;

        let sent = driver.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "alice");
        assert!(sent[0].1.contains("Request failed"));
    }
}
