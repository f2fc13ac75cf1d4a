//! In-memory stand-in for the remote application.

use std::{
    io,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf},
    sync::mpsc,
};

use crate::local_socket::{BoxedReader, BoxedWriter, Connector};

pub const SECRET: &str = "c2VjcmV0";

pub struct FakeRemote {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeRemote {
    pub async fn send(&mut self, frame: Value) {
        let mut line = frame.to_string();
        line.push('\n');
        self.send_raw(line.as_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("remote write");
    }

    /// Next frame written by the bridge, `None` once the bridge hung up.
    pub async fn recv(&mut self) -> Option<Value> {
        let line = self.lines.next_line().await.ok()??;
        Some(serde_json::from_str(&line).expect("bridge frames are json"))
    }

    pub async fn handshake(&mut self) {
        self.send(json!({"type": "nonce", "nonce": "abc123"})).await;
        let auth = self.recv().await.expect("auth frame");
        assert_eq!(auth["type"], "auth");
        self.send(json!({"type": "auth_ok"})).await;
    }
}

/// Splits an in-memory pipe into bridge halves and the remote end.
pub fn duplex_pair() -> (BoxedReader, BoxedWriter, FakeRemote) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let (read, write) = tokio::io::split(local);
    let (remote_read, remote_write) = tokio::io::split(remote);
    (
        Box::new(read),
        Box::new(write),
        FakeRemote {
            lines: BufReader::new(remote_read).lines(),
            writer: remote_write,
        },
    )
}

/// Connector that hands the remote end of every accepted connection to the
/// test through a channel.
pub struct DuplexConnector {
    remotes: mpsc::UnboundedSender<FakeRemote>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl DuplexConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FakeRemote>) {
        let (remotes, accepted) = mpsc::unbounded_channel();
        (
            Self {
                remotes,
                refuse: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
            },
            accepted,
        )
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self) -> io::Result<(BoxedReader, BoxedWriter)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }

        let (reader, writer, remote) = duplex_pair();
        let _ = self.remotes.send(remote);
        Ok((reader, writer))
    }

    fn endpoint(&self) -> String {
        "in-memory duplex".to_string()
    }
}
