//! Host-facing capability adapter
//!
//! Bridges MCP tool requests onto remote application calls.

pub mod tools;
