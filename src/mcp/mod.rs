//! Model Context Protocol (MCP) server handling and JSON-RPC implementations
//!
//! Provides protocol-level specifics surrounding JSON-RPC validation, negotiation, formatting, and routing,
//! served over stdio to the MCP host.

pub mod rpc;
pub mod server;
pub mod stdio;
