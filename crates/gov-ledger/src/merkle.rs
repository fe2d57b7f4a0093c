// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merkle batching of receipt hashes, for cheap external anchoring of a
//! whole range of receipts behind a single root.
//!
//! Uses the Bitcoin convention for odd-sized levels: duplicate the last hash
//! before pairing. An empty input hashes to `sha256("")`; a single hash
//! passes through unchanged.

use serde::{Deserialize, Serialize};

/// Compute the Merkle root over `hashes`, each a `0x`-prefixed lowercase hex
/// SHA-256 string (as produced by [`crate::Receipt::receipt_hash`]).
#[must_use]
pub fn merkle_root(hashes: &[String]) -> String {
    if hashes.is_empty() {
        return gov_canon::sha256_hex(b"");
    }
    if hashes.len() == 1 {
        return hashes[0].clone();
    }
    let mut level = hashes.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    level.into_iter().next().unwrap_or_else(|| gov_canon::sha256_hex(b""))
}

fn next_level(level: &[String]) -> Vec<String> {
    let mut padded = level.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(padded.last().cloned().unwrap_or_default());
    }
    padded
        .chunks(2)
        .map(|pair| hash_pair(&pair[0], &pair[1]))
        .collect()
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut bytes = Vec::with_capacity(left.len() + right.len());
    bytes.extend_from_slice(left.as_bytes());
    bytes.extend_from_slice(right.as_bytes());
    gov_canon::sha256_hex(&bytes)
}

/// Which side of its pair a proof step's sibling hash sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// The sibling is the left operand of the pairing hash.
    Left,
    /// The sibling is the right operand of the pairing hash.
    Right,
}

/// One step of a Merkle inclusion proof: the sibling hash to combine with the
/// running hash, and which side it sits on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProofStep {
    /// Sibling hash at this level.
    pub sibling: String,
    /// Side of the pairing the sibling occupies.
    pub side: Side,
}

/// Build an inclusion proof for the hash at `index` within `hashes`.
///
/// Returns `None` if `index` is out of bounds.
#[must_use]
pub fn generate_proof(hashes: &[String], index: usize) -> Option<Vec<MerkleProofStep>> {
    if index >= hashes.len() {
        return None;
    }
    let mut proof = Vec::new();
    let mut level = hashes.to_vec();
    let mut pos = index;
    while level.len() > 1 {
        let mut padded = level.clone();
        if padded.len() % 2 == 1 {
            padded.push(padded.last().cloned().unwrap_or_default());
        }
        let pair_index = pos / 2;
        let is_left = pos % 2 == 0;
        let sibling_pos = if is_left { pos + 1 } else { pos - 1 };
        proof.push(MerkleProofStep {
            sibling: padded[sibling_pos].clone(),
            side: if is_left { Side::Right } else { Side::Left },
        });
        level = next_level(&level);
        pos = pair_index;
    }
    Some(proof)
}

/// Verify that `leaf`, combined with `proof`, reduces to `root`.
#[must_use]
pub fn verify_proof(leaf: &str, proof: &[MerkleProofStep], root: &str) -> bool {
    let mut running = leaf.to_string();
    for step in proof {
        running = match step.side {
            Side::Left => hash_pair(&step.sibling, &running),
            Side::Right => hash_pair(&running, &step.sibling),
        };
    }
    running == root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(n: usize) -> Vec<String> {
        (0..n).map(|i| gov_canon::sha256_hex(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn empty_input_hashes_empty_string() {
        assert_eq!(merkle_root(&[]), gov_canon::sha256_hex(b""));
    }

    #[test]
    fn single_hash_passes_through() {
        let h = hashes(1);
        assert_eq!(merkle_root(&h), h[0]);
    }

    #[test]
    fn two_hashes_combine_once() {
        let h = hashes(2);
        let expected = {
            let mut bytes = Vec::new();
            bytes.extend_from_slice(h[0].as_bytes());
            bytes.extend_from_slice(h[1].as_bytes());
            gov_canon::sha256_hex(&bytes)
        };
        assert_eq!(merkle_root(&h), expected);
    }

    #[test]
    fn odd_count_duplicates_last() {
        let h3 = hashes(3);
        let mut h4 = h3.clone();
        h4.push(h3[2].clone());
        assert_eq!(merkle_root(&h3), merkle_root(&h4));
    }

    #[test]
    fn root_is_deterministic_and_order_sensitive() {
        let h = hashes(5);
        let mut reordered = h.clone();
        reordered.swap(0, 1);
        assert_eq!(merkle_root(&h), merkle_root(&h.clone()));
        assert_ne!(merkle_root(&h), merkle_root(&reordered));
    }

    #[test]
    fn proof_verifies_for_every_leaf() {
        for n in [1, 2, 3, 4, 5, 7, 8] {
            let h = hashes(n);
            let root = merkle_root(&h);
            for i in 0..n {
                let proof = generate_proof(&h, i).unwrap();
                assert!(verify_proof(&h[i], &proof, &root), "leaf {i} of {n} failed to verify");
            }
        }
    }

    #[test]
    fn proof_rejects_wrong_leaf() {
        let h = hashes(4);
        let root = merkle_root(&h);
        let proof = generate_proof(&h, 1).unwrap();
        assert!(!verify_proof(&h[2], &proof, &root));
    }

    #[test]
    fn out_of_bounds_index_returns_none() {
        let h = hashes(3);
        assert!(generate_proof(&h, 3).is_none());
    }
}
