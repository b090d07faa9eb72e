//! hrec records HTTP traffic.
//!
//! In direct mode every inbound request is answered locally and captured to
//! a JSON file. In proxy mode requests are forwarded to an upstream while
//! both the request and the response are captured under one correlation
//! identity. Recorded requests can be replayed with `redo`.

pub mod configuration;
pub mod error_handling;
pub mod recording;
pub mod redaction;
pub mod redo;
pub mod server;
pub mod storage;
