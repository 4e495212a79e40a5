//! Stable exit codes for hunter CLI commands.

/// Command succeeded, or `hunter run` stopped by cancellation or an opt-in
/// stop condition.
pub const OK: i32 = 0;
/// Invalid config, priority table or portal state, or any other error.
pub const INVALID: i32 = 1;
/// The portal session was lost; polling cannot continue without signing in.
pub const SESSION_LOST: i32 = 2;
