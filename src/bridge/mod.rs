//! Connection lifecycle and RPC correlation for the local socket
//!
//! A [`session::BridgeSession`] owns at most one [`connection::Connection`]
//! at a time. Each connection carries its own authentication gate and
//! pending-call registry, so a reconnect never observes the previous
//! connection's state.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::BridgeError;

pub mod connection;
pub mod gate;
pub mod pending;
pub mod session;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_support;

/// Issues a single method call to the remote application.
#[async_trait]
pub trait RemoteCaller: Send + Sync {
    async fn call(&self, method: &str, params: Value) -> Result<Value, BridgeError>;
}
