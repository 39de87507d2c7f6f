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

//! Block cache integration tests: bootstrap, ingest, validation failures
//! and crash-resume behavior.

pub mod common;

use std::path::Path;

use halley_chain::types::{BLOCK_FAILED_VALID, BLOCK_VALID_TRANSACTIONS};
use halley_chain::{BlockCache, Error};
use halley_core::core::hash::Hashed;
use halley_core::params::ChainParams;
use halley_core::pow::block_proof;

use crate::common::*;

const DB_CACHE: usize = 8 * 1024 * 1024;

fn open_cache(dir: &str) -> BlockCache {
	BlockCache::open(Path::new(dir), DB_CACHE, ChainParams::automated_testing()).unwrap()
}

#[test]
fn genesis_bootstrap() {
	let dir = ".halley_test_genesis_bootstrap";
	clean_output_dir(dir);
	{
		let mut cache = BlockCache::open(Path::new(dir), DB_CACHE, ChainParams::mainnet()).unwrap();
		assert_eq!(cache.chain().height(), 0);
		let tip = cache.tip().unwrap();
		assert_eq!(
			cache.tree().get(tip).hash.to_hex(),
			"000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
		);
		cache.flush_all().unwrap();
	}
	{
		// the best block pointer was persisted with the flush
		let cache = BlockCache::open(Path::new(dir), DB_CACHE, ChainParams::mainnet()).unwrap();
		assert_eq!(cache.chain().height(), 0);
	}
	clean_output_dir(dir);
}

#[test]
fn ingest_blocks_extends_tip() {
	let dir = ".halley_test_ingest";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let blocks = build_chain_on(genesis_hash, 1, 20);
		for block in &blocks {
			cache.add_block(block).unwrap();
		}
		assert_eq!(cache.chain().height(), 20);
		// every block on the active chain has reached TRANSACTIONS
		for height in 0..=20 {
			let id = cache.chain().get(height).unwrap();
			assert!(cache.tree().get(id).is_valid(BLOCK_VALID_TRANSACTIONS));
		}
		// ingesting an already-present header is a no-op
		let id1 = cache.add_header(&blocks[5].header).unwrap();
		let id2 = cache.add_header(&blocks[5].header).unwrap();
		assert_eq!(id1, id2);
	}
	clean_output_dir(dir);
}

#[test]
fn chainwork_accumulates() {
	let dir = ".halley_test_chainwork";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		for block in build_chain_on(genesis_hash, 1, 5) {
			cache.add_block(&block).unwrap();
		}
		for height in 1..=5 {
			let id = cache.chain().get(height).unwrap();
			let entry = cache.tree().get(id);
			let prev = cache.tree().get(entry.prev.unwrap());
			assert_eq!(
				entry.chainwork,
				prev.chainwork.clone() + block_proof(entry.header.bits)
			);
		}
	}
	clean_output_dir(dir);
}

#[test]
fn spend_across_blocks() {
	let dir = ".halley_test_spend";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let block1 = build_block(genesis_hash, 1, vec![]);
		cache.add_block(&block1).unwrap();
		let spend = spend_coinbase(&block1, 40 * halley_core::consensus::COIN);
		let spend_txid = spend.txid();
		let block2 = build_block(block1.hash(), 2, vec![spend]);
		cache.add_block(&block2).unwrap();
		assert_eq!(cache.chain().height(), 2);

		// the spent coinbase is gone, the new output is live
		let spent = halley_core::core::transaction::OutPoint::new(block1.transactions[0].txid(), 0);
		assert!(!cache.coins().has_coin(&spent).unwrap());
		let created = halley_core::core::transaction::OutPoint::new(spend_txid, 0);
		assert!(cache.coins().has_coin(&created).unwrap());
	}
	clean_output_dir(dir);
}

#[test]
fn missing_coin_fails_block() {
	let dir = ".halley_test_missing_coin";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let block1 = build_block(genesis_hash, 1, vec![]);
		cache.add_block(&block1).unwrap();

		// spends an output that does not exist
		let phantom = build_block(block1.hash(), 2, vec![spend_coinbase(&block1, 1)]);
		let mut bad_spend = spend_coinbase(&block1, 2);
		bad_spend.inputs[0].prev_out.index = 7;
		let bad = build_block(block1.hash(), 2, vec![bad_spend]);
		drop(phantom);

		match cache.add_block(&bad) {
			Err(Error::MissingCoin(_, 7)) => {}
			other => panic!("expected missing coin, got {:?}", other.map(|_| ())),
		}
		// the index entry is marked failed and the tip did not move
		let id = cache.get_block_index(&bad.hash()).unwrap();
		assert_ne!(cache.tree().get(id).status & BLOCK_FAILED_VALID, 0);
		assert_eq!(cache.chain().height(), 1);
	}
	clean_output_dir(dir);
}

#[test]
fn duplicate_coinbase_rejected_without_exemption() {
	let dir = ".halley_test_duplicate";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let block1 = build_block(genesis_hash, 1, vec![]);
		cache.add_block(&block1).unwrap();
		let block2 = build_block(block1.hash(), 2, vec![]);
		cache.add_block(&block2).unwrap();

		// block 3 reuses the exact coinbase of block 1, whose output is
		// still unspent
		let mut block3 = build_block(block2.hash(), 3, vec![]);
		block3.transactions[0] = block1.transactions[0].clone();
		let mut mutated = false;
		block3.header.merkle_root = block3.merkle_root(&mut mutated);

		match cache.add_block(&block3) {
			Err(Error::DuplicateTransaction(txid)) => {
				assert_eq!(txid, block1.transactions[0].txid());
			}
			other => panic!("expected duplicate transaction, got {:?}", other.map(|_| ())),
		}
		assert_eq!(cache.chain().height(), 2);
	}
	clean_output_dir(dir);
}

#[test]
fn crash_and_resume() {
	let dir = ".halley_test_resume";
	clean_output_dir(dir);
	let tip_hash;
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let blocks = build_chain_on(genesis_hash, 1, 30);
		for block in &blocks {
			cache.add_block(block).unwrap();
		}
		tip_hash = blocks.last().unwrap().hash();
		cache.flush_all().unwrap();
		// dropped here: the disk worker drains before the thread joins
	}
	{
		let mut cache = open_cache(dir);
		assert_eq!(cache.chain().height(), 30);
		let tip = cache.tip().unwrap();
		assert_eq!(cache.tree().get(tip).hash, tip_hash);
		assert_eq!(*cache.coins().best_block_hash(), tip_hash);
		// block data survives and reads back whole
		let block = cache.read_block(tip).unwrap();
		assert_eq!(block.hash(), tip_hash);
		assert_eq!(block.transactions.len(), 1);
		// and the chain keeps extending from where it stopped
		let next = build_block(tip_hash, 31, vec![]);
		cache.add_block(&next).unwrap();
		assert_eq!(cache.chain().height(), 31);
	}
	clean_output_dir(dir);
}

#[test]
fn coin_overlay_flush_roundtrip() {
	let dir = ".halley_test_coin_flush";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let block1 = build_block(genesis_hash, 1, vec![]);
		cache.add_block(&block1).unwrap();
		let out = halley_core::core::transaction::OutPoint::new(block1.transactions[0].txid(), 0);
		assert!(cache.coins().has_coin(&out).unwrap());
		// force a flush; the overlay empties but the coin remains
		// reachable through the store
		cache.flush_all().unwrap();
		assert_eq!(cache.coins().overlay_len(), (0, 0));
		assert!(cache.coins().has_coin(&out).unwrap());
	}
	clean_output_dir(dir);
}
