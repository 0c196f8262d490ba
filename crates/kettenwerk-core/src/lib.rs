// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kettenwerk — Core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod operator_errors;
pub mod types;

pub use config::TrailConfig;
pub use error::{IntegrityKind, KettenwerkError, Result};
pub use types::*;
