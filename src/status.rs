//! Process exit statuses produced by the launcher itself.
//!
//! Any other value returned from `main` is the engine's own status.

pub const SUCCESS: i32 = 0;
pub const INVALID_ARGUMENTS: i32 = 64;
pub const IMAGE_UNAVAILABLE: i32 = 66;
pub const LAUNCH_FAILURE: i32 = 70;
