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

//! The active chain: a dense vector of index nodes from genesis to the
//! current tip, plus the locator used to negotiate fork points with peers.

use crate::core::core::hash::Hash;
use crate::index::{BlockIndexTree, NodeId};

/// The best chain the node currently knows, indexable by height.
#[derive(Default)]
pub struct ActiveChain {
	blocks: Vec<NodeId>,
}

impl ActiveChain {
	/// An empty chain, not even genesis.
	pub fn new() -> ActiveChain {
		ActiveChain::default()
	}

	/// Height of the tip; -1 while the chain is empty.
	pub fn height(&self) -> i32 {
		self.blocks.len() as i32 - 1
	}

	/// The tip node.
	pub fn tip(&self) -> Option<NodeId> {
		self.blocks.last().copied()
	}

	/// Node at the given height.
	pub fn get(&self, height: i32) -> Option<NodeId> {
		if height < 0 || height as usize >= self.blocks.len() {
			return None;
		}
		Some(self.blocks[height as usize])
	}

	/// O(1) membership: the node sits at its own height.
	pub fn contains(&self, tree: &BlockIndexTree, id: NodeId) -> bool {
		self.get(tree.get(id).height) == Some(id)
	}

	/// Successor of a node along the active chain.
	pub fn next(&self, tree: &BlockIndexTree, id: NodeId) -> Option<NodeId> {
		if !self.contains(tree, id) {
			return None;
		}
		self.get(tree.get(id).height + 1)
	}

	/// Make `id` the tip, walking back through prev links and overwriting
	/// slots until a slot already holds the walked node. Past the shared
	/// prefix this is a no-op.
	pub fn set_tip(&mut self, tree: &BlockIndexTree, id: NodeId) {
		let height = tree.get(id).height;
		self.blocks.resize((height + 1) as usize, id);
		let mut walk = Some(id);
		while let Some(node) = walk {
			let h = tree.get(node).height as usize;
			if self.blocks[h] == node && h != height as usize {
				break;
			}
			self.blocks[h] = node;
			walk = tree.get(node).prev;
		}
	}

	/// Block locator starting from `from` (the tip when None): the block's
	/// hash, then hashes at exponentially growing steps back, always
	/// terminated by genesis.
	pub fn locator(&self, tree: &BlockIndexTree, from: Option<NodeId>) -> Vec<Hash> {
		let mut have = Vec::with_capacity(32);
		let mut step = 1i32;
		let mut node = match from.or_else(|| self.tip()) {
			Some(node) => node,
			None => return have,
		};
		loop {
			have.push(tree.get(node).hash);
			let height = tree.get(node).height;
			if height == 0 {
				break;
			}
			let next_height = (height - step).max(0);
			node = if self.contains(tree, node) {
				// use the O(1) chain index while on the active chain
				match self.get(next_height) {
					Some(n) => n,
					None => break,
				}
			} else {
				match tree.ancestor(node, next_height) {
					Some(n) => n,
					None => break,
				}
			};
			if have.len() > 10 {
				step *= 2;
			}
		}
		have
	}
}
