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

//! The block cache orchestrates everything chain-side: it owns the header
//! tree, the active chain, the UTXO view and the storage layers, ingests
//! headers and blocks from the synchronizer and decides when to flush.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use num_bigint::BigUint;

use halley_store::Store;

use crate::blockfiles::{block_file_path, BlockFiles};
use crate::chain::ActiveChain;
use crate::coins::CoinView;
use crate::core::consensus::{MAX_BLOCKFILE_SIZE, MAX_BLOCK_SIZE};
use crate::core::core::block::{Block, BlockHeader};
use crate::core::core::hash::{Hash, Hashed};
use crate::core::params::ChainParams;
use crate::core::pow;
use crate::core::ser;
use crate::disk::{DiskTask, DiskWorker};
use crate::error::Error;
use crate::index::{BlockIndexTree, NodeId};
use crate::store::{ChainStore, IndexFlushData};
use crate::types::*;
use crate::validate;

/// Flush the dirty index once it holds this many entries, regardless of
/// time.
const FLUSH_DIRTY_LIMIT: usize = 100_000;
/// Milliseconds between index flushes otherwise.
const FLUSH_COOLDOWN_MS: i64 = 5_000;

/// The chain-side brain of the node. All mutation happens on the network
/// loop; only prepared storage tasks cross to the disk worker.
pub struct BlockCache {
	params: ChainParams,
	tree: BlockIndexTree,
	chain: ActiveChain,
	best_header: Option<NodeId>,
	coins: CoinView,
	files: BlockFiles,
	index_store: ChainStore,
	disk: DiskWorker,
	dirty: HashSet<NodeId>,
	last_flush: i64,
}

impl BlockCache {
	/// Open the databases under `data_dir`, start the disk worker and run
	/// the load sequence.
	pub fn open(data_dir: &Path, db_cache: usize, params: ChainParams) -> Result<BlockCache, Error> {
		let blocks_dir = data_dir.join("blocks");
		let index_dir = blocks_dir.join("index");
		let chainstate_dir = data_dir.join("chainstate");
		fs::create_dir_all(&blocks_dir)?;
		fs::create_dir_all(&index_dir)?;
		fs::create_dir_all(&chainstate_dir)?;

		let index_db = Arc::new(Store::open(
			index_dir.to_str().unwrap_or_default(),
			db_cache / 2,
			false,
		)?);
		let coin_db = Arc::new(Store::open(
			chainstate_dir.to_str().unwrap_or_default(),
			db_cache / 2,
			true,
		)?);

		let disk = DiskWorker::start(ChainStore::new(index_db.clone()));
		let mut cache = BlockCache {
			files: BlockFiles::new(blocks_dir, params.magic, MAX_BLOCKFILE_SIZE),
			params,
			tree: BlockIndexTree::new(),
			chain: ActiveChain::new(),
			best_header: None,
			coins: CoinView::new(coin_db),
			index_store: ChainStore::new(index_db),
			disk,
			dirty: HashSet::new(),
			last_flush: util::now_millis(),
		};
		cache.load()?;
		Ok(cache)
	}

	fn load(&mut self) -> Result<(), Error> {
		let data = self.index_store.load_all()?;
		self.files.set_loaded(data.files, data.last_block_file);

		// parents first so prev links resolve in one pass
		let mut records = data.blocks;
		records.sort_by_key(|entry| entry.height);
		let mut dropped = 0usize;
		for mut entry in records {
			if validate::validate_header(&entry.header, &self.params).is_err() {
				warn!("cache: dropping invalid header {} at {}", entry.hash, entry.height);
				dropped += 1;
				continue;
			}
			entry.prev = self.tree.find(&entry.header.prev_hash);
			let id = self.tree.insert(entry);
			self.update_block_info(id);
		}
		if dropped > 0 {
			warn!("cache: dropped {} invalid index records", dropped);
		}

		self.load_genesis()?;
		self.coins.load()?;
		self.load_chain_tip();

		let tip = self.tree.get(self.chain.tip().expect("tip after load"));
		info!(
			"cache: loaded {} headers, tip {} at height {} ({})",
			self.tree.len(),
			tip.hash,
			tip.height,
			NaiveDateTime::from_timestamp(tip.header.timestamp as i64, 0)
		);
		Ok(())
	}

	fn load_genesis(&mut self) -> Result<(), Error> {
		let genesis = self.params.genesis.clone();
		let genesis_hash = genesis.hash();
		if let Some(id) = self.tree.find(&genesis_hash) {
			self.chain.set_tip(&self.tree, id);
			return Ok(());
		}
		debug!("cache: storing genesis block {}", genesis_hash);
		let id = self.add_header(&genesis.header)?;
		self.tree.get_mut(id).tx_count = genesis.transactions.len() as u32;
		self.save_block(&genesis, id)?;
		self.chain.set_tip(&self.tree, id);
		self.flush_index();
		Ok(())
	}

	fn load_chain_tip(&mut self) {
		let best = *self.coins.best_block_hash();
		if best.is_zero() {
			return;
		}
		match self.tree.find(&best) {
			Some(id) => {
				self.chain.set_tip(&self.tree, id);
				let height = self.tree.get(id).height;
				self.coins.set_best_block(best, height);
				info!("cache: resumed chain at {} height {}", best, height);
			}
			None => {
				warn!("cache: best block {} not in index, starting from genesis", best);
			}
		}
	}

	/// Work, cumulative counters and skip pointer of a freshly linked
	/// node, plus the best-header tracking.
	fn update_block_info(&mut self, id: NodeId) {
		let proof = pow::block_proof(self.tree.get(id).header.bits);
		let (chainwork, chain_tx, max_time) = match self.tree.get(id).prev {
			Some(prev) => {
				let prev = self.tree.get(prev);
				(
					prev.chainwork.clone() + proof,
					prev.chain_tx_count + self.tree.get(id).tx_count as u64,
					prev.max_time.max(self.tree.get(id).header.timestamp),
				)
			}
			None => (
				proof,
				self.tree.get(id).tx_count as u64,
				self.tree.get(id).header.timestamp,
			),
		};
		{
			let entry = self.tree.get_mut(id);
			entry.chainwork = chainwork;
			entry.chain_tx_count = chain_tx;
			entry.max_time = max_time;
		}
		self.tree.build_skip(id);

		let better = match self.best_header {
			Some(best) => self.tree.get(best).chainwork < self.tree.get(id).chainwork,
			None => true,
		};
		if better {
			self.best_header = Some(id);
		}
	}

	/// Ingest a header. Re-ingesting a known header returns the existing
	/// node untouched.
	pub fn add_header(&mut self, header: &BlockHeader) -> Result<NodeId, Error> {
		let hash = header.hash();
		if let Some(id) = self.tree.find(&hash) {
			return Ok(id);
		}
		validate::validate_header(header, &self.params)?;

		let mut entry = BlockIndexEntry::from_header(header.clone());
		if !header.prev_hash.is_zero() {
			if let Some(prev) = self.tree.find(&header.prev_hash) {
				entry.height = self.tree.get(prev).height + 1;
				if self.tree.get(prev).status & BLOCK_FAILED_MASK != 0 {
					entry.status |= BLOCK_FAILED_CHILD;
				}
				entry.prev = Some(prev);
			}
		}
		entry.raise_validity(BLOCK_VALID_TREE);
		if entry.height % 20_000 == 1 {
			debug!("cache: header chain reached height {}", entry.height);
		}
		let id = self.tree.insert(entry);
		self.update_block_info(id);
		self.mark_dirty(id);
		Ok(id)
	}

	/// Ingest a full block: header first, data persisted asynchronously,
	/// and, for a strict extension of the current tip, full validation and
	/// UTXO transfer.
	pub fn add_block(&mut self, block: &Block) -> Result<NodeId, Error> {
		let id = self.add_header(&block.header)?;
		{
			let entry = self.tree.get_mut(id);
			debug_assert!(
				entry.tx_count == 0 || entry.tx_count == block.transactions.len() as u32
			);
			entry.tx_count = block.transactions.len() as u32;
		}
		self.save_block(block, id)?;

		let (height, prev, failed) = {
			let entry = self.tree.get(id);
			(
				entry.height,
				entry.prev,
				entry.status & BLOCK_FAILED_MASK != 0,
			)
		};
		let extends_tip = height > 0 && prev == self.chain.tip();
		if extends_tip && !failed {
			match self.connect_block(block, id, height) {
				Ok(()) => {
					let hash = self.tree.get(id).hash;
					self.tree.get_mut(id).raise_validity(BLOCK_VALID_SCRIPTS);
					self.chain.set_tip(&self.tree, id);
					self.coins.set_best_block(hash, height);
					self.coins.maybe_flush(util::now_millis())?;
					self.mark_dirty(id);
				}
				Err(e) if e.is_validation_error() => {
					warn!(
						"cache: block {} at height {} failed validation: {}",
						self.tree.get(id).hash,
						height,
						e
					);
					self.tree.get_mut(id).status |= BLOCK_FAILED_VALID;
					self.mark_dirty(id);
					return Err(e);
				}
				Err(e) => return Err(e),
			}
		}
		self.check_flush();
		Ok(id)
	}

	fn connect_block(&mut self, block: &Block, id: NodeId, height: i32) -> Result<(), Error> {
		let hash = self.tree.get(id).hash;
		validate::verify_block_transactions(block, height, &hash, &mut self.coins)?;
		for tx in &block.transactions {
			self.coins.apply_transaction(tx, height)?;
		}
		Ok(())
	}

	fn save_block(&mut self, block: &Block, id: NodeId) -> Result<(), Error> {
		if self.tree.get(id).status & BLOCK_HAVE_DATA != 0 {
			return Ok(());
		}
		let bytes = ser::ser_vec(block)?;
		if bytes.len() > MAX_BLOCK_SIZE {
			return Err(Error::BadBlockFile(format!("block of {} bytes", bytes.len())));
		}
		let pos = self.files.find_block_pos(bytes.len() as u64 + 8);
		let (height, timestamp) = {
			let entry = self.tree.get(id);
			(entry.height, entry.header.timestamp)
		};
		self.files.add_block(pos, height as u32, timestamp as u64);
		self.disk.post(DiskTask::WriteBlock {
			path: block_file_path(self.files.dir(), pos.file_index),
			position: pos.position,
			magic: self.params.magic,
			bytes,
		});
		let entry = self.tree.get_mut(id);
		entry.set_disk_position(pos);
		entry.status |= BLOCK_HAVE_DATA;
		entry.raise_validity(BLOCK_VALID_TRANSACTIONS);
		self.mark_dirty(id);
		Ok(())
	}

	fn mark_dirty(&mut self, id: NodeId) {
		self.dirty.insert(id);
	}

	fn check_flush(&mut self) {
		let now = util::now_millis();
		if self.dirty.len() >= FLUSH_DIRTY_LIMIT || now - self.last_flush > FLUSH_COOLDOWN_MS {
			self.flush_index();
		}
	}

	/// Stream the dirty index entries and touched file infos to the disk
	/// worker as one batch.
	pub fn flush_index(&mut self) {
		self.last_flush = util::now_millis();
		if self.dirty.is_empty() {
			return;
		}
		let mut blocks = Vec::with_capacity(self.dirty.len());
		for id in self.dirty.drain() {
			let entry = &self.tree.get(id);
			match ser::ser_vec(*entry) {
				Ok(bytes) => blocks.push((entry.hash, bytes)),
				Err(e) => error!("cache: failed to serialize index entry {}: {}", entry.hash, e),
			}
		}
		let (files, last_block_file) = self.files.take_dirty();
		let count = blocks.len();
		self.disk.post(DiskTask::FlushIndex(IndexFlushData {
			blocks,
			files,
			last_block_file,
		}));
		trace!("cache: posted flush of {} index entries", count);
	}

	/// Flush everything that can be flushed; called at shutdown and by
	/// tests before reopening.
	pub fn flush_all(&mut self) -> Result<(), Error> {
		self.flush_index();
		self.coins.flush(util::now_millis())?;
		Ok(())
	}

	/// The header tree.
	pub fn tree(&self) -> &BlockIndexTree {
		&self.tree
	}

	/// The active chain.
	pub fn chain(&self) -> &ActiveChain {
		&self.chain
	}

	/// Node of the active chain tip.
	pub fn tip(&self) -> Option<NodeId> {
		self.chain.tip()
	}

	/// Header with the most accumulated work, regardless of block data.
	pub fn best_header(&self) -> Option<NodeId> {
		self.best_header
	}

	/// Node for a block hash, if known.
	pub fn get_block_index(&self, hash: &Hash) -> Option<NodeId> {
		self.tree.find(hash)
	}

	/// Chain parameters this cache runs against.
	pub fn params(&self) -> &ChainParams {
		&self.params
	}

	/// Work of the current tip.
	pub fn tip_chainwork(&self) -> BigUint {
		self.tip()
			.map(|id| self.tree.get(id).chainwork.clone())
			.unwrap_or_else(|| BigUint::from(0u32))
	}

	/// Locator over the active chain starting at `from` (tip when None).
	pub fn locator(&self, from: Option<NodeId>) -> Vec<Hash> {
		self.chain.locator(&self.tree, from)
	}

	/// Read a stored block back from the block files.
	pub fn read_block(&self, id: NodeId) -> Result<Block, Error> {
		self.files.read_block(self.tree.get(id))
	}

	/// Mutable access to the UTXO view.
	pub fn coins(&mut self) -> &mut CoinView {
		&mut self.coins
	}
}
