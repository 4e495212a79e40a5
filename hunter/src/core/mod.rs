//! Deterministic, pure logic shared by the hunter.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! priority tables and bindings snapshots and return deterministic outputs
//! suitable for tests.

pub mod priority;
pub mod resolve;
pub mod types;
