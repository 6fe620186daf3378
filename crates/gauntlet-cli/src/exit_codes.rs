//! Process exit codes. Part of the CLI contract: CI pipelines branch on
//! these values.

pub const SUCCESS: i32 = 0;
pub const CASES_FAILED: i32 = 1; // At least one case failed
pub const INTERNAL_ERROR: i32 = 2; // Config or setup error before any case ran
