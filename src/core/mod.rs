//! Shared constants and small helpers used by every context.

pub mod keys;
