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

//! Common test helpers: hand-built blocks on top of the real genesis,
//! valid in every way except proof of work, which the testing chain
//! parameters do not check.

use std::fs;

use halley_core::consensus::COIN;
use halley_core::core::block::{Block, BlockHeader};
use halley_core::core::hash::{Hash, Hashed};
use halley_core::core::transaction::{OutPoint, Transaction, TxIn, TxOut};
use halley_core::script::builder::Builder;
use halley_core::script::opcodes::OP_1;

pub fn clean_output_dir(dir_name: &str) {
	let _ = fs::remove_dir_all(dir_name);
}

/// A coinbase whose script commits to the height, so every block gets a
/// distinct txid.
pub fn coinbase_at(height: i64) -> Transaction {
	Transaction {
		version: 1,
		inputs: vec![TxIn::new(
			OutPoint::null(),
			Builder::new().push_num(height).into_script(),
		)],
		outputs: vec![TxOut {
			value: 50 * COIN,
			// anyone-can-spend, so tests can build spends without keys
			script_pubkey: Builder::new().push_opcode(OP_1).into_script(),
		}],
		lock_time: 0,
	}
}

/// Build a block on `prev_hash` carrying the given transactions (coinbase
/// excluded; one is added).
pub fn build_block(prev_hash: Hash, height: i64, mut extra_txs: Vec<Transaction>) -> Block {
	let mut transactions = vec![coinbase_at(height)];
	transactions.append(&mut extra_txs);
	let mut block = Block {
		header: BlockHeader {
			version: 1,
			prev_hash,
			merkle_root: halley_core::core::hash::ZERO_HASH,
			timestamp: 1231006505 + height as u32,
			bits: 0x1d00ffff,
			nonce: 0,
		},
		transactions,
	};
	let mut mutated = false;
	block.header.merkle_root = block.merkle_root(&mut mutated);
	assert!(!mutated);
	block
}

/// A straight chain of empty blocks on top of `from`, lowest height first.
pub fn build_chain_on(from: Hash, first_height: i64, count: usize) -> Vec<Block> {
	let mut blocks = Vec::with_capacity(count);
	let mut prev = from;
	for i in 0..count {
		let block = build_block(prev, first_height + i as i64, vec![]);
		prev = block.hash();
		blocks.push(block);
	}
	blocks
}

/// A transaction spending the coinbase of the given block into a single
/// anyone-can-spend output.
pub fn spend_coinbase(of: &Block, value: i64) -> Transaction {
	Transaction {
		version: 1,
		inputs: vec![TxIn::new(OutPoint::new(of.transactions[0].txid(), 0), vec![])],
		outputs: vec![TxOut {
			value,
			script_pubkey: Builder::new().push_opcode(OP_1).into_script(),
		}],
		lock_time: 0,
	}
}
