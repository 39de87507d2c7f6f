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

//! Definition of the genesis blocks, rebuilt from first principles rather
//! than embedded as opaque bytes.

use crate::consensus::COIN;
use crate::core::block::{Block, BlockHeader};
use crate::core::transaction::{OutPoint, Transaction, TxIn, TxOut};
use crate::script::builder::Builder;
use crate::script::opcodes;
use util::from_hex;

const GENESIS_TIMESTAMP_TEXT: &[u8] =
	b"The Times 03/Jan/2009 Chancellor on brink of second bailout for banks";

const GENESIS_OUTPUT_PUBKEY: &str =
	"04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c\
	 4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

fn build_genesis(timestamp: u32, nonce: u32, bits: u32, version: i32, reward: i64) -> Block {
	let pubkey = from_hex(GENESIS_OUTPUT_PUBKEY).expect("genesis pubkey");
	let signature_script = Builder::new()
		.push_int(486_604_799)
		.push_num(4)
		.push_data(GENESIS_TIMESTAMP_TEXT)
		.into_script();
	let script_pubkey = Builder::new()
		.push_data(&pubkey)
		.push_opcode(opcodes::OP_CHECKSIG)
		.into_script();

	let coinbase = Transaction {
		version: 1,
		inputs: vec![TxIn::new(OutPoint::null(), signature_script)],
		outputs: vec![TxOut {
			value: reward,
			script_pubkey,
		}],
		lock_time: 0,
	};

	let mut block = Block {
		header: BlockHeader {
			version,
			prev_hash: crate::core::hash::ZERO_HASH,
			merkle_root: crate::core::hash::ZERO_HASH,
			timestamp,
			bits,
			nonce,
		},
		transactions: vec![coinbase],
	};
	let mut mutated = false;
	block.header.merkle_root = block.merkle_root(&mut mutated);
	block
}

/// The genesis block of the main network.
pub fn genesis_main() -> Block {
	build_genesis(1231006505, 2083236893, 0x1d00ffff, 1, 50 * COIN)
}

/// The genesis block of the test network.
pub fn genesis_test() -> Block {
	build_genesis(1296688602, 414098458, 0x1d00ffff, 1, 50 * COIN)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::hash::Hashed;

	#[test]
	fn mainnet_genesis_hash() {
		let block = genesis_main();
		assert_eq!(
			block.header.merkle_root.to_hex(),
			"4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
		);
		assert_eq!(
			block.hash().to_hex(),
			"000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
		);
	}

	#[test]
	fn testnet_genesis_hash() {
		let block = genesis_test();
		assert_eq!(
			block.hash().to_hex(),
			"000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943"
		);
	}

	#[test]
	fn genesis_coinbase_shape() {
		let block = genesis_main();
		assert_eq!(block.transactions.len(), 1);
		assert!(block.transactions[0].is_coinbase());
		assert_eq!(block.transactions[0].outputs[0].value, 50 * COIN);
	}
}
