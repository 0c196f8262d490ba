// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kettenwerk — Canonical serialization and hash chaining.
//
// The two pure leaves of the trail: turning a structured record into one
// deterministic byte string, and folding those bytes into a hash chain.
// Neither performs I/O; neither holds state between calls.

pub mod canonical;
pub mod chain;

pub use canonical::{canonical_bytes, canonicalize, canonicalize_record, parse_strict};
pub use chain::{GENESIS_HASH, is_chain_digest, link_hash};
