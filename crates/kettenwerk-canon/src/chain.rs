// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hash chaining — SHA-256 linkage between consecutive audit records.

use sha2::{Digest, Sha256};

/// Fixed `prev_chain_hash` for the first link of any scope.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Compute the chain hash of the next link.
///
/// `next = SHA256(prev_chain_hash ∥ payload)`, where the previous hash
/// enters as its 64-character lowercase hex form. Pure function — the
/// previous hash is always supplied by the caller from durable state,
/// never from a process-local cache that could go stale under concurrent
/// writers.
pub fn link_hash(prev_chain_hash: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_chain_hash.as_bytes());
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Whether `s` has the shape of a chain digest (64 lowercase hex chars).
pub fn is_chain_digest(s: &str) -> bool {
    s.len() == 64
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_sixty_four_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.bytes().all(|b| b == b'0'));
        assert!(is_chain_digest(GENESIS_HASH));
    }

    #[test]
    fn link_hash_is_deterministic() {
        let a = link_hash(GENESIS_HASH, b"payload");
        let b = link_hash(GENESIS_HASH, b"payload");
        assert_eq!(a, b);
        assert!(is_chain_digest(&a));
    }

    #[test]
    fn link_hash_depends_on_both_inputs() {
        let base = link_hash(GENESIS_HASH, b"payload");
        assert_ne!(base, link_hash(GENESIS_HASH, b"payloae"));
        assert_ne!(base, link_hash(&link_hash(GENESIS_HASH, b"x"), b"payload"));
    }

    #[test]
    fn known_vector_from_genesis() {
        // SHA-256 of sixty-four '0' characters followed by "abc" —
        // verified against coreutils:
        //   printf '%064d' 0 | tr -d '\n' > v; printf 'abc' >> v; sha256sum v
        let expected = "b64374d04ef9c4f39fddb1e0d6be38a0130f6c057fc0f4ee467ea0e18bc758f1";
        assert_eq!(link_hash(GENESIS_HASH, b"abc"), expected);
    }

    #[test]
    fn digest_shape_check() {
        assert!(!is_chain_digest(""));
        assert!(!is_chain_digest(&"0".repeat(63)));
        assert!(!is_chain_digest(&"G".repeat(64)));
        // Uppercase hex is not canonical.
        assert!(!is_chain_digest(&"A".repeat(64)));
        assert!(is_chain_digest(&link_hash(GENESIS_HASH, b"")));
    }
}
