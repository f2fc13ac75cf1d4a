//! One live duplex channel to the remote application.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::auth::sign_challenge;
use crate::bridge::gate::AuthGate;
use crate::bridge::pending::PendingCalls;
use crate::bridge::wire::{
    decode_inbound, encode_handshake, HandshakeMessage, HandshakeResponse, Inbound,
};
use crate::errors::BridgeError;
use crate::local_socket::{BoxedReader, BoxedWriter, Connector};

/// Races the connector against `timeout`; resolves only once the channel is
/// open. Dropping the losing future releases whatever the connector held.
pub async fn wait_for_open(
    connector: &dyn Connector,
    timeout: Duration,
) -> Result<(BoxedReader, BoxedWriter), BridgeError> {
    match tokio::time::timeout(timeout, connector.connect()).await {
        Ok(Ok(halves)) => Ok(halves),
        Ok(Err(err)) => Err(BridgeError::unavailable(format!(
            "failed to connect to {}: {err}",
            connector.endpoint()
        ))),
        Err(_) => Err(BridgeError::unavailable(format!(
            "timed out after {}ms connecting to {}",
            timeout.as_millis(),
            connector.endpoint()
        ))),
    }
}

pub struct Connection {
    generation: u64,
    writer: tokio::sync::Mutex<BoxedWriter>,
    gate: AuthGate,
    pending: PendingCalls,
    closed: AtomicBool,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Wraps freshly opened halves and starts the inbound frame loop. The
    /// connection starts unauthenticated with an empty registry.
    pub fn start(
        generation: u64,
        reader: BoxedReader,
        writer: BoxedWriter,
        secret: Option<String>,
    ) -> Arc<Self> {
        let connection = Arc::new(Self {
            generation,
            writer: tokio::sync::Mutex::new(writer),
            gate: AuthGate::new(),
            pending: PendingCalls::new(),
            closed: AtomicBool::new(false),
            reader_task: Mutex::new(None),
        });

        let task = tokio::spawn(read_loop(connection.clone(), reader, secret));
        *connection
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        connection
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn authenticated(&self) -> Result<(), BridgeError> {
        self.gate.wait().await
    }

    pub async fn send(&self, frame: &str) -> Result<(), BridgeError> {
        if self.is_closed() {
            return Err(BridgeError::unavailable("connection closed"));
        }

        let mut writer = self.writer.lock().await;
        writer
            .write_all(frame.as_bytes())
            .await
            .map_err(|err| BridgeError::unavailable(format!("failed to write frame: {err}")))?;
        writer
            .flush()
            .await
            .map_err(|err| BridgeError::unavailable(format!("failed to flush frame: {err}")))?;
        Ok(())
    }

    /// Marks the connection closed, fails an unsettled gate with `cause` and
    /// rejects every pending call. Runs without yielding, so no other task
    /// observes a closed connection with live entries.
    pub fn close(&self, cause: BridgeError) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.gate.fail(cause.clone());
        let drained = self
            .pending
            .drain(&BridgeError::unavailable("connection closed"));
        info!(
            generation = self.generation,
            drained,
            reason = %cause,
            "local socket connection closed"
        );
        true
    }

    /// Forcibly discards the connection. An unsettled gate is reset first.
    pub fn terminate(&self) {
        self.close(BridgeError::AuthenticationReset);
        if let Some(task) = self
            .reader_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    async fn handle_frame(&self, frame: &str, secret: Option<&str>) {
        let inbound = match decode_inbound(frame) {
            Ok(inbound) => inbound,
            Err(err) => {
                warn!(
                    generation = self.generation,
                    error = %err,
                    "dropping malformed frame"
                );
                return;
            }
        };

        match inbound {
            Inbound::Handshake(HandshakeMessage::Nonce { nonce }) => {
                self.answer_challenge(&nonce, secret).await;
            }
            Inbound::Handshake(HandshakeMessage::AuthOk) => {
                if self.gate.open() {
                    info!(
                        generation = self.generation,
                        "authenticated with remote application"
                    );
                }
            }
            Inbound::Reply(reply) => {
                let id = reply.id.clone();
                if !self.pending.settle(&id, reply.into_outcome()) {
                    warn!(
                        generation = self.generation,
                        id = %id,
                        "dropping reply for unknown call id"
                    );
                }
            }
            Inbound::Unrecognized(_) => {
                debug!(generation = self.generation, "dropping unrecognized frame");
            }
        }
    }

    async fn answer_challenge(&self, nonce: &str, secret: Option<&str>) {
        let frame = sign_challenge(secret, nonce)
            .and_then(|hmac| encode_handshake(&HandshakeResponse::Auth { hmac }));

        let result = match frame {
            Ok(frame) => self.send(&frame).await,
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            error!(
                generation = self.generation,
                error = %err,
                "authentication handshake failed"
            );
            self.close(err);
        }
    }

    async fn shutdown_writer(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

async fn read_loop(connection: Arc<Connection>, reader: BoxedReader, secret: Option<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!(
                    generation = connection.generation,
                    "remote application closed the socket"
                );
                break;
            }
            Ok(_) => {
                let Ok(line) = std::str::from_utf8(&buf) else {
                    warn!(
                        generation = connection.generation,
                        bytes = buf.len(),
                        "dropping frame that is not valid utf-8"
                    );
                    continue;
                };
                let frame = line.trim();
                if frame.is_empty() {
                    continue;
                }
                connection.handle_frame(frame, secret.as_deref()).await;
                if connection.is_closed() {
                    break;
                }
            }
            Err(err) => {
                warn!(
                    generation = connection.generation,
                    error = %err,
                    "local socket read failed"
                );
                break;
            }
        }
    }

    connection.close(BridgeError::unavailable("connection closed"));
    connection.shutdown_writer().await;
}
