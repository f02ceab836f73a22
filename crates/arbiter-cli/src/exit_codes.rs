//! Process exit codes. Scripts branch on these, so they are stable.

pub const SUCCESS: i32 = 0;
pub const REJECTED: i32 = 1; // Token failed verification
pub const CONFIG_ERROR: i32 = 2; // Missing or invalid configuration
pub const UNAVAILABLE: i32 = 3; // Governance service or key set unreachable
