//! Bridge session: connection manager plus RPC client.
//!
//! State machine, per session:
//!
//! | from           | event                    | to             |
//! |----------------|--------------------------|----------------|
//! | Disconnected   | `ensure_connection`      | Connecting     |
//! | Connecting     | socket open              | Authenticating |
//! | Connecting     | error / timeout          | Disconnected   |
//! | Authenticating | `auth_ok`                | Ready          |
//! | Authenticating | bad secret / close       | Disconnected   |
//! | Ready          | close                    | Disconnected   |
//!
//! No request frame is written unless the connection it goes out on is
//! `Ready`.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::bridge::connection::{wait_for_open, Connection};
use crate::bridge::gate::GateState;
use crate::bridge::wire::encode_request;
use crate::bridge::RemoteCaller;
use crate::config::{Config, DEFAULT_TIMEOUT_MS};
use crate::errors::BridgeError;
use crate::local_socket::Connector;
use crate::logging::log_call_summary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Authenticating,
    Ready,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub secret: Option<String>,
    /// Bounds socket open, the authentication wait and each call.
    pub timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            secret: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            secret: config.secret.clone(),
            timeout: config.timeout(),
        }
    }
}

pub struct BridgeSession {
    connector: Arc<dyn Connector>,
    settings: SessionSettings,
    current: Mutex<Option<Arc<Connection>>>,
    connect_lock: tokio::sync::Mutex<()>,
    connecting: AtomicBool,
    next_call_id: AtomicU64,
    next_generation: AtomicU64,
}

impl BridgeSession {
    pub fn new(connector: Arc<dyn Connector>, settings: SessionSettings) -> Self {
        Self {
            connector,
            settings,
            current: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
            connecting: AtomicBool::new(false),
            next_call_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn state(&self) -> SessionState {
        if self.connecting.load(Ordering::SeqCst) {
            return SessionState::Connecting;
        }

        match self.live_connection() {
            None => SessionState::Disconnected,
            Some(connection) => match connection.gate().state() {
                GateState::Pending => SessionState::Authenticating,
                GateState::Open => SessionState::Ready,
                GateState::Failed(_) => SessionState::Disconnected,
            },
        }
    }

    pub fn current_connection(&self) -> Option<Arc<Connection>> {
        self.current_slot().clone()
    }

    /// Returns the open (or still authenticating) connection, or replaces a
    /// closed one with a fresh connection and a fresh authentication gate.
    /// Concurrent callers share a single connection attempt.
    pub async fn ensure_connection(&self) -> Result<Arc<Connection>, BridgeError> {
        if let Some(connection) = self.live_connection() {
            return Ok(connection);
        }

        let _attempt = self.connect_lock.lock().await;
        if let Some(connection) = self.live_connection() {
            return Ok(connection);
        }

        let stale = self.current_slot().take();
        if let Some(stale) = stale {
            debug!(
                generation = stale.generation(),
                "discarding stale connection"
            );
            stale.terminate();
        }

        self.connecting.store(true, Ordering::SeqCst);
        let opened = wait_for_open(self.connector.as_ref(), self.settings.timeout).await;
        self.connecting.store(false, Ordering::SeqCst);

        let (reader, writer) = match opened {
            Ok(halves) => halves,
            Err(err) => {
                warn!(
                    endpoint = %self.connector.endpoint(),
                    error = %err,
                    "local socket unavailable"
                );
                return Err(err);
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let connection = Connection::start(
            generation,
            reader,
            writer,
            self.settings.secret.clone(),
        );
        *self.current_slot() = Some(connection.clone());
        info!(
            generation,
            endpoint = %self.connector.endpoint(),
            "local socket connected, awaiting authentication"
        );

        Ok(connection)
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let started_at = Instant::now();
        let outcome = self.dispatch(method, params).await;
        log_call_summary(method, started_at, &outcome);
        outcome
    }

    async fn dispatch(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        let connection = self.ensure_connection().await?;

        match tokio::time::timeout(self.settings.timeout, connection.authenticated()).await {
            Ok(authenticated) => authenticated?,
            Err(_) => {
                let err = BridgeError::unavailable(format!(
                    "no authentication handshake within {}ms",
                    self.settings.timeout.as_millis()
                ));
                connection.close(err.clone());
                return Err(err);
            }
        }

        // A close can land between the gate opening and this task resuming.
        if connection.is_closed() {
            return Err(BridgeError::unavailable(
                "connection closed during authentication",
            ));
        }

        let id = self.next_call_id.fetch_add(1, Ordering::SeqCst).to_string();
        let reply = connection
            .pending()
            .register(&id, method, self.settings.timeout);

        let sent = match encode_request(&id, method, &params) {
            Ok(frame) => connection.send(&frame).await,
            Err(err) => Err(err),
        };
        if let Err(err) = sent {
            connection.pending().reject(&id, err);
        }

        reply
            .await
            .unwrap_or_else(|_| Err(BridgeError::unavailable("reply channel dropped")))
    }

    fn live_connection(&self) -> Option<Arc<Connection>> {
        self.current_slot()
            .as_ref()
            .filter(|connection| !connection.is_closed())
            .cloned()
    }

    fn current_slot(&self) -> MutexGuard<'_, Option<Arc<Connection>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RemoteCaller for BridgeSession {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError> {
        BridgeSession::call(self, method, params).await
    }
}
