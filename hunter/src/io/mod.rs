//! I/O adapters: the portal seam, its file-backed and dry-run
//! implementations, configuration, and the audit log.

pub mod audit_log;
pub mod config;
pub mod dry_run;
pub mod file_portal;
pub mod portal;
