// Copyright 2020 The Halley Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Merkle tree over transaction ids. An odd row duplicates its last entry,
//! which is also why duplicate-leaf mutation has to be detected.

use crate::core::hash::{hash_bytes, Hash, ZERO_HASH};

/// Hash of two sibling nodes.
pub fn hash_sibling_leaves(left: &Hash, right: &Hash) -> Hash {
	let mut buf = Vec::with_capacity(64);
	buf.extend_from_slice(left.as_bytes());
	buf.extend_from_slice(right.as_bytes());
	hash_bytes(&buf)
}

/// Computes the merkle root of the provided leaf hashes, bottom-up. Sets
/// `mutated` when any row hashes a leaf pair with itself, the CVE-2012-2459
/// duplicate-subtree malleation.
pub fn compute_merkle_root(leaves: &[Hash], mutated: &mut bool) -> Hash {
	*mutated = false;
	if leaves.is_empty() {
		return ZERO_HASH;
	}
	let mut row: Vec<Hash> = leaves.to_vec();
	while row.len() > 1 {
		let mut next = Vec::with_capacity((row.len() + 1) / 2);
		for pair in row.chunks(2) {
			let left = pair[0];
			let right = if pair.len() == 2 { pair[1] } else { pair[0] };
			if pair.len() == 2 && left == right {
				*mutated = true;
			}
			next.push(hash_sibling_leaves(&left, &right));
		}
		row = next;
	}
	row[0]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_leaf_is_root() {
		let leaf = hash_bytes(b"leaf");
		let mut mutated = false;
		assert_eq!(compute_merkle_root(&[leaf], &mut mutated), leaf);
		assert!(!mutated);
	}

	#[test]
	fn empty_is_zero() {
		let mut mutated = false;
		assert_eq!(compute_merkle_root(&[], &mut mutated), ZERO_HASH);
	}

	#[test]
	fn odd_row_duplicates_last() {
		let a = hash_bytes(b"a");
		let b = hash_bytes(b"b");
		let c = hash_bytes(b"c");
		let mut mutated = false;
		let root = compute_merkle_root(&[a, b, c], &mut mutated);
		let ab = hash_sibling_leaves(&a, &b);
		let cc = hash_sibling_leaves(&c, &c);
		assert_eq!(root, hash_sibling_leaves(&ab, &cc));
		assert!(!mutated);
	}

	#[test]
	fn duplicate_pair_flags_mutation() {
		let a = hash_bytes(b"a");
		let b = hash_bytes(b"b");
		let mut mutated = false;
		compute_merkle_root(&[a, b, b, b], &mut mutated);
		assert!(mutated);
	}
}
