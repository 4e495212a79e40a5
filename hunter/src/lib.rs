//! Priority-driven course slot hunter.
//!
//! The hunter repeatedly observes which option a student holds in each slot,
//! probes better-ranked options for free seats, and upgrades a slot as soon
//! as a preferred option opens up. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (priority table, resolution).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (portal access, config, audit log).
//!   Behind the [`io::portal::Portal`] trait so tests can script the portal.
//!
//! Orchestration modules ([`cycle`], [`executor`], [`looping`]) coordinate
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod cycle;
pub mod executor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
