// SPDX-License-Identifier: MIT OR Apache-2.0
//! Library-level command implementations backing the `govctl` binary.
//!
//! Kept separate from `main.rs` so commands can be exercised directly in
//! tests without spawning the process.

pub mod commands;
pub mod format;
