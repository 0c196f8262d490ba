// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kettenwerk — Chain verification, checkpointing, and the trail facade.

pub mod checkpoint;
pub mod report;
pub mod trail;
pub mod verify;

pub use checkpoint::{CheckpointScheduler, run_checkpoint};
pub use report::{TrailReport, export_report};
pub use trail::AuditTrail;
pub use verify::{CancelToken, VerificationReport, VerifyOptions, verify_chain};
