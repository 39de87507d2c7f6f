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

//! Block synchronizer integration tests driven over hand-built sessions
//! and a real block cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use num_bigint::BigUint;

use chain::BlockCache;
use halley_core::consensus::{COIN, MAX_HEADERS_PER_MSG, PROTOCOL_VERSION};
use halley_core::core::block::{Block, BlockHeader};
use halley_core::core::hash::{Hash, Hashed, ZERO_HASH};
use halley_core::core::transaction::{OutPoint, Transaction, TxIn, TxOut};
use halley_core::params::ChainParams;
use halley_core::script::builder::Builder;
use halley_core::script::opcodes::OP_1;
use halley_p2p::msg::Message;
use halley_p2p::session::{Session, SessionState};
use halley_p2p::sync::{BlockSynchronizer, BLOCK_REQUEST_BATCH};
use halley_p2p::PeerAddr;

fn clean_output_dir(dir_name: &str) {
	let _ = fs::remove_dir_all(dir_name);
}

fn open_cache(dir: &str) -> BlockCache {
	BlockCache::open(Path::new(dir), 8 * 1024 * 1024, ChainParams::automated_testing()).unwrap()
}

fn coinbase_at(height: i64) -> Transaction {
	Transaction {
		version: 1,
		inputs: vec![TxIn::new(
			OutPoint::null(),
			Builder::new().push_num(height).into_script(),
		)],
		outputs: vec![TxOut {
			value: 50 * COIN,
			script_pubkey: Builder::new().push_opcode(OP_1).into_script(),
		}],
		lock_time: 0,
	}
}

fn build_chain_on(from: Hash, first_height: i64, count: usize) -> Vec<Block> {
	let mut blocks = Vec::with_capacity(count);
	let mut prev = from;
	for i in 0..count {
		let height = first_height + i as i64;
		let mut block = Block {
			header: BlockHeader {
				version: 1,
				prev_hash: prev,
				merkle_root: ZERO_HASH,
				timestamp: 1231006505 + height as u32,
				bits: 0x1d00ffff,
				nonce: 0,
			},
			transactions: vec![coinbase_at(height)],
		};
		let mut mutated = false;
		block.header.merkle_root = block.merkle_root(&mut mutated);
		prev = block.hash();
		blocks.push(block);
	}
	blocks
}

fn ready_session(id: u64, last_octet: u8, rtt: i32, inbound: bool) -> Session {
	let addr = PeerAddr::parse(&format!("10.9.9.{}:8333", last_octet)).unwrap();
	let mut session = Session::new(id, addr, inbound, 0xD9B4BEF9, 0);
	session.state = SessionState::Ready;
	session.rtt_ms = rtt;
	session
}

fn sole_getheaders(session: &mut Session) -> Option<Message> {
	session
		.take_outbound()
		.into_iter()
		.find(|m| m.command() == "getheaders")
}

#[test]
fn requester_prefers_lowest_rtt_outbound() {
	let dir = ".halley_test_sync_requester";
	clean_output_dir(dir);
	{
		let cache = open_cache(dir);
		let mut sessions = HashMap::new();
		sessions.insert(1, ready_session(1, 1, 200, false));
		sessions.insert(2, ready_session(2, 2, 40, false));
		sessions.insert(3, ready_session(3, 3, 5, true));
		let mut sync =
			BlockSynchronizer::new(PROTOCOL_VERSION, BigUint::from(0u32), 0);
		// past the startup grace period even with few sessions
		sync.on_tick(&mut sessions, &cache, 5_000);
		// the fast outbound peer got the getheaders, not the inbound one
		assert!(sole_getheaders(sessions.get_mut(&2).unwrap()).is_some());
		assert!(sole_getheaders(sessions.get_mut(&1).unwrap()).is_none());
		assert!(sole_getheaders(sessions.get_mut(&3).unwrap()).is_none());
	}
	clean_output_dir(dir);
}

#[test]
fn requester_selection_waits_for_pool_growth() {
	let dir = ".halley_test_sync_grace";
	clean_output_dir(dir);
	{
		let cache = open_cache(dir);
		let mut sessions = HashMap::new();
		sessions.insert(1, ready_session(1, 1, 50, false));
		let mut sync =
			BlockSynchronizer::new(PROTOCOL_VERSION, BigUint::from(0u32), 0);
		// inside the grace period with a small pool: no selection
		sync.on_tick(&mut sessions, &cache, 1_000);
		assert!(sole_getheaders(sessions.get_mut(&1).unwrap()).is_none());
		// after the grace period the lone session is used
		sync.on_tick(&mut sessions, &cache, 12_000);
		assert!(sole_getheaders(sessions.get_mut(&1).unwrap()).is_some());
	}
	clean_output_dir(dir);
}

#[test]
fn locator_request_contains_genesis() {
	let dir = ".halley_test_sync_locator";
	clean_output_dir(dir);
	{
		let cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let mut sessions = HashMap::new();
		sessions.insert(1, ready_session(1, 1, 50, false));
		let mut sync =
			BlockSynchronizer::new(PROTOCOL_VERSION, BigUint::from(0u32), 0);
		sync.on_tick(&mut sessions, &cache, 30_000);
		match sole_getheaders(sessions.get_mut(&1).unwrap()) {
			Some(Message::GetHeaders(locator)) => {
				assert_eq!(locator.version, PROTOCOL_VERSION);
				assert_eq!(*locator.hashes.last().unwrap(), genesis_hash);
				assert!(locator.stop_hash.is_zero());
			}
			other => panic!("expected getheaders, got {:?}", other),
		}
	}
	clean_output_dir(dir);
}

#[test]
fn headers_then_block_download() {
	let dir = ".halley_test_sync_download";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let blocks = build_chain_on(genesis_hash, 1, 200);
		let headers: Vec<BlockHeader> = blocks.iter().map(|b| b.header.clone()).collect();

		let mut sessions = HashMap::new();
		sessions.insert(1, ready_session(1, 1, 50, false));
		let mut sync =
			BlockSynchronizer::new(PROTOCOL_VERSION, BigUint::from(0u32), 0);
		sync.on_tick(&mut sessions, &cache, 10_000);
		sessions.get_mut(&1).unwrap().take_outbound();

		// a short batch of headers ends header sync and starts the
		// block download
		sync.handle_headers(1, headers, &mut sessions, &mut cache, 11_000);
		let out = sessions.get_mut(&1).unwrap().take_outbound();
		let getdata = out
			.iter()
			.find_map(|m| match m {
				Message::GetData(items) => Some(items.clone()),
				_ => None,
			})
			.expect("getdata queued");
		assert_eq!(getdata.len(), BLOCK_REQUEST_BATCH);
		assert_eq!(getdata[0].hash, blocks[0].hash());
		assert!(sessions[&1].sync.is_requesting());

		// deliver the requested blocks; when the batch drains the next
		// request follows immediately
		for block in blocks.iter().take(BLOCK_REQUEST_BATCH) {
			sync.handle_block(1, block.clone(), &mut sessions, &mut cache);
		}
		assert_eq!(cache.chain().height() as usize, BLOCK_REQUEST_BATCH);
		let out = sessions.get_mut(&1).unwrap().take_outbound();
		let next = out
			.iter()
			.find_map(|m| match m {
				Message::GetData(items) => Some(items.clone()),
				_ => None,
			})
			.expect("next getdata");
		assert_eq!(next[0].hash, blocks[BLOCK_REQUEST_BATCH].hash());

		for block in blocks.iter().skip(BLOCK_REQUEST_BATCH) {
			sync.handle_block(1, block.clone(), &mut sessions, &mut cache);
		}
		assert_eq!(cache.chain().height(), 200);
	}
	clean_output_dir(dir);
}

#[test]
fn full_header_batch_requests_next_range() {
	let dir = ".halley_test_sync_full_batch";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let blocks = build_chain_on(genesis_hash, 1, MAX_HEADERS_PER_MSG);
		let headers: Vec<BlockHeader> = blocks.iter().map(|b| b.header.clone()).collect();

		let mut sessions = HashMap::new();
		sessions.insert(1, ready_session(1, 1, 50, false));
		let mut sync =
			BlockSynchronizer::new(PROTOCOL_VERSION, BigUint::from(0u32), 0);
		sync.on_tick(&mut sessions, &cache, 10_000);
		sessions.get_mut(&1).unwrap().take_outbound();

		sync.handle_headers(1, headers, &mut sessions, &mut cache, 11_000);
		// a full batch triggers an immediate follow-up request
		let msg = sole_getheaders(sessions.get_mut(&1).unwrap()).expect("follow-up getheaders");
		match msg {
			Message::GetHeaders(locator) => {
				// the locator now starts at the new best header
				assert_eq!(locator.hashes[0], blocks.last().unwrap().hash());
			}
			_ => unreachable!(),
		}
	}
	clean_output_dir(dir);
}

#[test]
fn idle_requester_is_dropped() {
	let dir = ".halley_test_sync_idle";
	clean_output_dir(dir);
	{
		let cache = open_cache(dir);
		let mut sessions = HashMap::new();
		sessions.insert(1, ready_session(1, 1, 50, false));
		sessions.insert(2, ready_session(2, 2, 90, false));
		let mut sync =
			BlockSynchronizer::new(PROTOCOL_VERSION, BigUint::from(0u32), 0);
		sync.on_tick(&mut sessions, &cache, 10_000);
		// nothing received for a long while after the request went out
		let drops = sync.on_tick(&mut sessions, &cache, 20_000);
		assert_eq!(drops, vec![1]);
	}
	clean_output_dir(dir);
}

#[test]
fn peers_without_enough_work_are_not_used() {
	let dir = ".halley_test_sync_minwork";
	clean_output_dir(dir);
	{
		let mut cache = open_cache(dir);
		let genesis_hash = cache.params().genesis.hash();
		let blocks = build_chain_on(genesis_hash, 1, 10);
		let headers: Vec<BlockHeader> = blocks.iter().map(|b| b.header.clone()).collect();

		let mut sessions = HashMap::new();
		sessions.insert(1, ready_session(1, 1, 50, false));
		// a minimum far above anything ten test headers can accumulate
		let min_work = BigUint::from(1u32) << 200;
		let mut sync = BlockSynchronizer::new(PROTOCOL_VERSION, min_work, 0);
		sync.on_tick(&mut sessions, &cache, 10_000);
		sessions.get_mut(&1).unwrap().take_outbound();

		sync.handle_headers(1, headers, &mut sessions, &mut cache, 11_000);
		let out = sessions.get_mut(&1).unwrap().take_outbound();
		assert!(out.iter().all(|m| m.command() != "getdata"));
	}
	clean_output_dir(dir);
}
