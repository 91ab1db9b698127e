//! Store schema, one SQL file per version.
//!
//! Versions start at 1 and must stay contiguous; `run_migrations` applies
//! every entry above the recorded version, in order.

/// `(version, sql)` pairs.
pub const MIGRATIONS: &[(i32, &str)] = &[(1, include_str!("v001_initial.sql"))];
