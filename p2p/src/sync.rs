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

//! The block synchronizer: picks a header requester, drives the
//! getheaders loop and schedules parallel block downloads across peers,
//! feeding everything it receives into the block cache.

use std::collections::HashMap;

use num_bigint::BigUint;

use chain::{BlockCache, NodeId};

use crate::core::consensus::MAX_HEADERS_PER_MSG;
use crate::core::core::block::{Block, BlockHeader};
use crate::core::core::hash::{Hash, Hashed, ZERO_HASH};
use crate::msg::{InvItem, LocatorMsg, Message};
use crate::session::{Session, SessionState};

/// How many blocks past the last common ancestor may be in flight.
pub const BLOCK_DOWNLOAD_WINDOW: i32 = 1024;
/// Blocks per getdata request.
pub const BLOCK_REQUEST_BATCH: usize = 128;

/// Do not re-request headers more often than this.
const HEADER_REQUEST_INTERVAL_MS: i64 = 10_000;
/// A request this old with a silent requester is considered stalled.
const HEADER_REQUEST_STALL_MS: i64 = 5_000;
/// Requester silence that counts as idle.
const HEADER_IDLE_MS: i64 = 3_000;
/// Let the pool grow for this long before settling on a requester.
const STARTUP_GRACE_MS: i64 = 2_000;
/// Sessions wanted before the grace period matters.
const STARTUP_MIN_SESSIONS: usize = 5;

/// Per-peer block download state, embedded in the session.
#[derive(Default)]
pub struct SyncInfo {
	/// Best header this peer is known to have
	pub best_known_block: Option<NodeId>,
	/// Hash the peer announced that we could not place yet
	pub last_unknown_block_hash: Option<Hash>,
	/// Deepest block shared between our chain and the peer's
	pub last_common_block: Option<NodeId>,
	/// Highest block handed to the downloader for this peer
	pub last_download_block: Option<NodeId>,
	/// Outstanding getdata entries
	pub requesting_blocks: HashMap<Hash, NodeId>,
}

impl SyncInfo {
	/// Resolve the last unknown announcement if the cache has since
	/// learned about it.
	pub fn process_block_availability(&mut self, cache: &BlockCache) {
		let hash = match self.last_unknown_block_hash {
			Some(hash) => hash,
			None => return,
		};
		if let Some(id) = cache.get_block_index(&hash) {
			if cache.tree().get(id).chainwork > BigUint::from(0u32) {
				let better = match self.best_known_block {
					Some(best) => {
						cache.tree().get(id).chainwork >= cache.tree().get(best).chainwork
					}
					None => true,
				};
				if better {
					self.best_known_block = Some(id);
				}
				self.last_unknown_block_hash = None;
			}
		}
	}

	/// Track that the peer has `hash`; either an index node with work by
	/// now, or remembered as the last unknown announcement.
	pub fn update_block_availability(&mut self, hash: Hash, cache: &BlockCache) {
		self.process_block_availability(cache);
		match cache.get_block_index(&hash) {
			Some(id) if cache.tree().get(id).chainwork > BigUint::from(0u32) => {
				let better = match self.best_known_block {
					Some(best) => {
						cache.tree().get(id).chainwork >= cache.tree().get(best).chainwork
					}
					None => true,
				};
				if better {
					self.best_known_block = Some(id);
				}
			}
			_ => {
				self.last_unknown_block_hash = Some(hash);
			}
		}
	}

	/// Whether a getdata for blocks is outstanding.
	pub fn is_requesting(&self) -> bool {
		!self.requesting_blocks.is_empty()
	}

	/// Remember an outstanding request set.
	pub fn record_requested(&mut self, blocks: &[NodeId], cache: &BlockCache) {
		debug_assert!(self.requesting_blocks.is_empty());
		for id in blocks {
			self.requesting_blocks.insert(cache.tree().get(*id).hash, *id);
		}
	}

	/// Clear the record for a delivered block.
	pub fn remove_request(&mut self, hash: &Hash) -> bool {
		self.requesting_blocks.remove(hash).is_some()
	}

	/// The next blocks to download from this peer: up to `count` entries
	/// along the peer's best chain, inside the download window past the
	/// last common ancestor. Only peers whose best chain carries at least
	/// as much work as our tip (and the configured minimum) are used.
	pub fn find_blocks_to_download(
		&mut self,
		count: usize,
		cache: &BlockCache,
		min_work: &BigUint,
	) -> Vec<NodeId> {
		self.process_block_availability(cache);
		let best = match self.best_known_block {
			Some(best) => best,
			None => return vec![],
		};
		let tree = cache.tree();
		if tree.get(best).chainwork < cache.tip_chainwork()
			|| tree.get(best).chainwork < *min_work
		{
			// this peer has nothing interesting
			return vec![];
		}
		if self.last_common_block.is_none() {
			// bootstrap by guessing our tip area is the forking point;
			// guessing wrong in either direction is not a problem
			let height = tree.get(best).height.min(cache.chain().height());
			self.last_common_block = cache.chain().get(height);
		}
		let last_common = match self.last_common_block {
			Some(id) => id,
			None => return vec![],
		};
		let last_common = match tree.last_common_ancestor(last_common, best) {
			Some(id) => id,
			None => return vec![],
		};
		self.last_common_block = Some(last_common);
		if last_common == best {
			return vec![];
		}

		let lc_height = tree.get(last_common).height;
		let window_end = lc_height + BLOCK_DOWNLOAD_WINDOW;
		let max_height = tree.get(best).height.min(window_end + 1);
		let real_count = (max_height - lc_height).min(count.max(BLOCK_REQUEST_BATCH) as i32);
		if real_count <= 0 {
			return vec![];
		}
		let target = match tree.ancestor(best, lc_height + real_count) {
			Some(id) => id,
			None => return vec![],
		};
		let mut blocks = Vec::with_capacity(real_count as usize);
		let mut walk = Some(target);
		for _ in 0..real_count {
			match walk {
				Some(id) => {
					blocks.push(id);
					walk = tree.get(id).prev;
				}
				None => break,
			}
		}
		blocks.reverse();
		self.last_download_block = Some(target);
		self.last_common_block = Some(target);
		blocks
	}
}

/// Drives header sync and block download over the whole session set.
pub struct BlockSynchronizer {
	start_time: i64,
	requesting_headers: bool,
	header_requester: Option<u64>,
	last_headers_request: i64,
	protocol_version: u32,
	min_chain_work: BigUint,
}

impl BlockSynchronizer {
	/// Synchronizer with the configured chainwork gate.
	pub fn new(protocol_version: u32, min_chain_work: BigUint, now: i64) -> BlockSynchronizer {
		BlockSynchronizer {
			start_time: now,
			requesting_headers: false,
			header_requester: None,
			last_headers_request: 0,
			protocol_version,
			min_chain_work,
		}
	}

	/// Periodic work: drop a stalled requester, keep one selected, and
	/// keep the getheaders loop moving. Returns sessions the manager
	/// should disconnect.
	pub fn on_tick(
		&mut self,
		sessions: &mut HashMap<u64, Session>,
		cache: &BlockCache,
		now: i64,
	) -> Vec<u64> {
		let mut to_drop = vec![];
		if self.requesting_headers
			&& now - self.last_headers_request > HEADER_REQUEST_STALL_MS
		{
			if let Some(id) = self.header_requester {
				match sessions.get(&id) {
					Some(session) if now - session.last_data_recv > HEADER_IDLE_MS => {
						warn!("sync: header requester {} idle, dropping", session.addr);
						self.requesting_headers = false;
						self.header_requester = None;
						to_drop.push(id);
					}
					None => {
						self.requesting_headers = false;
						self.header_requester = None;
					}
					_ => {}
				}
			}
		}
		self.choose_headers_requester(sessions, cache, now);
		self.schedule_request_headers(sessions, cache, now);
		to_drop
	}

	/// A session completed its handshake.
	pub fn add_session(
		&mut self,
		sessions: &mut HashMap<u64, Session>,
		cache: &BlockCache,
		now: i64,
	) {
		self.choose_headers_requester(sessions, cache, now);
	}

	/// A session went away.
	pub fn remove_session(
		&mut self,
		id: u64,
		sessions: &mut HashMap<u64, Session>,
		cache: &BlockCache,
		now: i64,
	) {
		if self.header_requester == Some(id) {
			self.header_requester = None;
			self.requesting_headers = false;
			self.choose_headers_requester(sessions, cache, now);
		}
	}

	/// A headers batch arrived: push every header into the cache, update
	/// the peer's availability, continue the loop on a full batch, and
	/// once headers dry up start the peer's block download.
	pub fn handle_headers(
		&mut self,
		peer: u64,
		headers: Vec<BlockHeader>,
		sessions: &mut HashMap<u64, Session>,
		cache: &mut BlockCache,
		now: i64,
	) {
		self.requesting_headers = false;
		let full_batch = headers.len() == MAX_HEADERS_PER_MSG;
		let mut last: Option<(Hash, NodeId)> = None;
		for header in &headers {
			match cache.add_header(header) {
				Ok(id) => last = Some((header.hash(), id)),
				Err(e) => {
					warn!("sync: rejected header {}: {}", header.hash(), e);
					break;
				}
			}
		}
		if let Some((hash, id)) = last {
			if let Some(session) = sessions.get_mut(&peer) {
				session.sync.update_block_availability(hash, cache);
			}
			debug!(
				"sync: {} headers up to height {}",
				headers.len(),
				cache.tree().get(id).height
			);
			if full_batch {
				self.request_headers(Some(id), sessions, cache, now);
			}
		}
		if !full_batch {
			let start_download = sessions
				.get(&peer)
				.map(|s| s.sync.last_download_block.is_none())
				.unwrap_or(false);
			if start_download {
				self.check_request_blocks(peer, sessions, cache);
			}
		}
	}

	/// A block arrived: clear the request record, hand it to the cache and
	/// refill the peer's download pipeline as soon as it runs dry.
	pub fn handle_block(
		&mut self,
		peer: u64,
		block: Block,
		sessions: &mut HashMap<u64, Session>,
		cache: &mut BlockCache,
	) {
		let hash = block.hash();
		if let Some(session) = sessions.get_mut(&peer) {
			if !session.sync.remove_request(&hash) {
				debug!("sync: unrequested block {} from {}", hash, session.addr);
			}
		}
		match cache.add_block(&block) {
			Ok(id) => {
				let height = cache.tree().get(id).height;
				if height % 1_000 == 0 {
					info!("sync: chain height {}", cache.chain().height());
				}
			}
			Err(e) => {
				// a bad block marks the index; the peer is not dropped
				// for a single offence
				warn!("sync: block {} rejected: {}", hash, e);
			}
		}
		self.check_request_blocks(peer, sessions, cache);
	}

	fn check_request_blocks(
		&mut self,
		peer: u64,
		sessions: &mut HashMap<u64, Session>,
		cache: &BlockCache,
	) {
		let session = match sessions.get_mut(&peer) {
			Some(session) => session,
			None => return,
		};
		if session.sync.is_requesting() {
			return;
		}
		let blocks =
			session
				.sync
				.find_blocks_to_download(BLOCK_REQUEST_BATCH, cache, &self.min_chain_work);
		if blocks.is_empty() {
			return;
		}
		session.sync.record_requested(&blocks, cache);
		let items: Vec<InvItem> = blocks
			.iter()
			.map(|id| InvItem::block(cache.tree().get(*id).hash))
			.collect();
		debug!("sync: requesting {} blocks from {}", items.len(), session.addr);
		session.queue(Message::GetData(items));
	}

	fn choose_headers_requester(
		&mut self,
		sessions: &mut HashMap<u64, Session>,
		cache: &BlockCache,
		now: i64,
	) {
		if let Some(id) = self.header_requester {
			if sessions.contains_key(&id) {
				return;
			}
			self.header_requester = None;
		}
		self.header_requester = self.find_headers_requester(sessions, now);
		if self.header_requester.is_some() {
			self.request_headers(None, sessions, cache, now);
		}
	}

	fn find_headers_requester(&self, sessions: &HashMap<u64, Session>, now: i64) -> Option<u64> {
		let ready: Vec<&Session> = sessions
			.values()
			.filter(|s| s.state == SessionState::Ready)
			.collect();
		if ready.is_empty() {
			return None;
		}
		// wait a moment at startup so the fastest peers can be compared
		if now - self.start_time < STARTUP_GRACE_MS && ready.len() < STARTUP_MIN_SESSIONS {
			return None;
		}
		let best_outbound = ready
			.iter()
			.filter(|s| !s.inbound)
			.min_by_key(|s| s.rtt_ms as i64);
		match best_outbound {
			Some(session) => {
				debug!(
					"sync: header requester {} (rtt {} ms)",
					session.addr, session.rtt_ms
				);
				Some(session.id)
			}
			None => ready.first().map(|s| s.id),
		}
	}

	fn schedule_request_headers(
		&mut self,
		sessions: &mut HashMap<u64, Session>,
		cache: &BlockCache,
		now: i64,
	) {
		if self.requesting_headers {
			return;
		}
		if now - self.last_headers_request < HEADER_REQUEST_INTERVAL_MS {
			return;
		}
		self.request_headers(None, sessions, cache, now);
	}

	fn request_headers(
		&mut self,
		from: Option<NodeId>,
		sessions: &mut HashMap<u64, Session>,
		cache: &BlockCache,
		now: i64,
	) {
		let requester = match self.header_requester {
			Some(id) => id,
			None => return,
		};
		let session = match sessions.get_mut(&requester) {
			Some(session) => session,
			None => return,
		};
		// start from the parent of the best header so the response
		// overlaps with what we already have
		let start = from.or_else(|| {
			cache
				.best_header()
				.and_then(|best| cache.tree().get(best).prev.or(Some(best)))
		});
		let hashes = cache.locator(start);
		debug!(
			"sync: requesting headers from {} with {} locator hashes",
			session.addr,
			hashes.len()
		);
		session.queue(Message::GetHeaders(LocatorMsg {
			version: self.protocol_version,
			hashes,
			stop_hash: ZERO_HASH,
		}));
		self.requesting_headers = true;
		self.last_headers_request = now;
	}

	/// Whether a getheaders is outstanding; used by the status line.
	pub fn is_requesting_headers(&self) -> bool {
		self.requesting_headers
	}
}
