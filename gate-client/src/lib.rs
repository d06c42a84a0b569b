//! Reference client for the gate session framework's stream transport.
//!
//! Dials a TCP gate server and exposes the same envelope wire format
//! and write-queue discipline the server side uses, so a test harness
//! or a small tool can talk to a `gate-net` server without rebuilding
//! any of that plumbing.

pub mod easy;

pub use easy::GateClient;
