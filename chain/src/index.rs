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

//! The in-memory header tree. Nodes live in an arena and reference each
//! other through stable `NodeId` handles, which sidesteps the shared
//! ownership cycles a pointer-linked tree would need.

use std::collections::HashMap;

use crate::core::core::hash::Hash;
use crate::types::BlockIndexEntry;

/// Stable handle of a node in the header tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Arena of block index entries keyed by hash. Nodes are never removed;
/// invalid records are dropped before insertion at load time.
#[derive(Default)]
pub struct BlockIndexTree {
	nodes: Vec<BlockIndexEntry>,
	by_hash: HashMap<Hash, NodeId>,
}

/// Height of the skip-list ancestor for a node at `height`. Any height
/// strictly below is acceptable; this expression performs well in
/// simulations (max ~110 steps to go back up to 2^18 blocks).
pub fn skip_height(height: i32) -> i32 {
	fn invert_lowest_one(n: i32) -> i32 {
		n & (n - 1)
	}
	if height < 2 {
		return 0;
	}
	if height & 1 != 0 {
		invert_lowest_one(invert_lowest_one(height - 1)) + 1
	} else {
		invert_lowest_one(height)
	}
}

impl BlockIndexTree {
	/// An empty tree.
	pub fn new() -> BlockIndexTree {
		BlockIndexTree::default()
	}

	/// Number of nodes in the tree.
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	/// True when the tree holds no nodes.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Insert an entry, returning its handle. An entry with a hash already
	/// present returns the existing handle untouched.
	pub fn insert(&mut self, entry: BlockIndexEntry) -> NodeId {
		if let Some(id) = self.by_hash.get(&entry.hash) {
			return *id;
		}
		let id = NodeId(self.nodes.len() as u32);
		self.by_hash.insert(entry.hash, id);
		self.nodes.push(entry);
		id
	}

	/// Handle of the node with the given hash.
	pub fn find(&self, hash: &Hash) -> Option<NodeId> {
		self.by_hash.get(hash).copied()
	}

	/// The entry behind a handle.
	pub fn get(&self, id: NodeId) -> &BlockIndexEntry {
		&self.nodes[id.0 as usize]
	}

	/// Mutable access to the entry behind a handle.
	pub fn get_mut(&mut self, id: NodeId) -> &mut BlockIndexEntry {
		&mut self.nodes[id.0 as usize]
	}

	/// All node handles, in insertion order.
	pub fn ids(&self) -> impl Iterator<Item = NodeId> {
		(0..self.nodes.len() as u32).map(NodeId)
	}

	/// Set the node's skip pointer. Called once, right after `prev` is
	/// linked and the height is known.
	pub fn build_skip(&mut self, id: NodeId) {
		let (height, prev) = {
			let entry = self.get(id);
			(entry.height, entry.prev)
		};
		if let Some(prev) = prev {
			let skip = self.ancestor(prev, skip_height(height));
			self.get_mut(id).skip = skip;
		}
	}

	/// Ancestor of `id` at `dest_height`, walking `skip` pointers where
	/// they do not overshoot and `prev` otherwise.
	pub fn ancestor(&self, id: NodeId, dest_height: i32) -> Option<NodeId> {
		let mut walk = id;
		let mut height_walk = self.get(id).height;
		if dest_height > height_walk || dest_height < 0 {
			return None;
		}
		while height_walk > dest_height {
			let entry = self.get(walk);
			let height_skip = skip_height(height_walk);
			let height_skip_prev = skip_height(height_walk - 1);
			match entry.skip {
				Some(skip)
					if height_skip == dest_height
						|| (height_skip > dest_height
							&& !(height_skip_prev < height_skip - 2
								&& height_skip_prev >= dest_height)) =>
				{
					// only follow the skip if prev->skip isn't better
					walk = skip;
					height_walk = height_skip;
				}
				_ => {
					walk = entry.prev?;
					height_walk -= 1;
				}
			}
		}
		Some(walk)
	}

	/// Deepest node that is an ancestor of both arguments. All branches
	/// eventually meet at genesis.
	pub fn last_common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
		let mut x = a;
		let mut y = b;
		if self.get(x).height > self.get(y).height {
			x = self.ancestor(x, self.get(y).height)?;
		} else if self.get(y).height > self.get(x).height {
			y = self.ancestor(y, self.get(x).height)?;
		}
		while x != y {
			x = self.get(x).prev?;
			y = self.get(y).prev?;
		}
		Some(x)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::core::block::BlockHeader;
	use crate::core::core::hash::Hashed;

	fn build_chain(tree: &mut BlockIndexTree, len: usize) -> Vec<NodeId> {
		let mut ids = Vec::with_capacity(len);
		let mut prev_hash = crate::core::core::hash::ZERO_HASH;
		for height in 0..len {
			let header = BlockHeader {
				prev_hash,
				nonce: height as u32,
				..Default::default()
			};
			prev_hash = header.hash();
			let mut entry = BlockIndexEntry::from_header(header);
			entry.height = height as i32;
			if height > 0 {
				entry.prev = Some(ids[height - 1]);
			}
			let id = tree.insert(entry);
			tree.build_skip(id);
			ids.push(id);
		}
		ids
	}

	#[test]
	fn skip_height_closed_form() {
		assert_eq!(skip_height(0), 0);
		assert_eq!(skip_height(1), 0);
		assert_eq!(skip_height(2), 0);
		assert_eq!(skip_height(3), 1);
		assert_eq!(skip_height(4), 0);
		assert_eq!(skip_height(12), 8);
		assert_eq!(skip_height(13), 1);
		assert_eq!(skip_height(14), 12);
		assert_eq!(skip_height(16), 0);
	}

	#[test]
	fn skip_pointers_match_closed_form() {
		let mut tree = BlockIndexTree::new();
		let ids = build_chain(&mut tree, 300);
		for (height, id) in ids.iter().enumerate().skip(2) {
			let skip = tree.get(*id).skip.expect("skip set");
			assert_eq!(tree.get(skip).height, skip_height(height as i32));
		}
	}

	#[test]
	fn ancestor_walks() {
		let mut tree = BlockIndexTree::new();
		let ids = build_chain(&mut tree, 257);
		for dest in &[0i32, 1, 100, 128, 255, 256] {
			let found = tree.ancestor(ids[256], *dest).expect("ancestor");
			assert_eq!(found, ids[*dest as usize]);
		}
		assert_eq!(tree.ancestor(ids[10], 11), None);
		assert_eq!(tree.ancestor(ids[10], -1), None);
	}

	#[test]
	fn insert_is_idempotent() {
		let mut tree = BlockIndexTree::new();
		let entry = BlockIndexEntry::from_header(BlockHeader::default());
		let id1 = tree.insert(entry.clone());
		let id2 = tree.insert(entry);
		assert_eq!(id1, id2);
		assert_eq!(tree.len(), 1);
	}

	#[test]
	fn common_ancestor_of_fork() {
		let mut tree = BlockIndexTree::new();
		let ids = build_chain(&mut tree, 50);
		// fork off at height 30
		let mut prev = ids[30];
		let mut fork_tip = prev;
		for i in 0..10 {
			let header = BlockHeader {
				prev_hash: tree.get(prev).hash,
				nonce: 0xF000 + i,
				..Default::default()
			};
			let mut entry = BlockIndexEntry::from_header(header);
			entry.height = tree.get(prev).height + 1;
			entry.prev = Some(prev);
			let id = tree.insert(entry);
			tree.build_skip(id);
			fork_tip = id;
			prev = id;
		}
		let lca = tree.last_common_ancestor(ids[49], fork_tip).expect("lca");
		assert_eq!(lca, ids[30]);
	}
}
