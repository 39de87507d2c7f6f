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

//! Per-chain parameters: network magic, default port, seeds, proof-of-work
//! policy and the genesis block.

use crate::core::block::Block;
use crate::genesis;
use crate::global::ChainTypes;

/// Parameters of one chain flavour.
#[derive(Clone)]
pub struct ChainParams {
	/// Which chain these parameters describe
	pub chain_type: ChainTypes,
	/// Magic prefix of every wire message
	pub magic: u32,
	/// Port peers listen on by default
	pub default_port: u16,
	/// DNS seeds used for initial peer discovery
	pub dns_seeds: Vec<&'static str>,
	/// Compact encoding of the easiest allowed target
	pub pow_limit_bits: u32,
	/// Whether header proof of work is verified at all. Disabled only for
	/// automated testing, where headers are hand-built.
	pub verify_pow: bool,
	/// The chain's genesis block
	pub genesis: Block,
}

impl ChainParams {
	/// Main network parameters.
	pub fn mainnet() -> ChainParams {
		ChainParams {
			chain_type: ChainTypes::Mainnet,
			magic: 0xD9B4_BEF9,
			default_port: 8333,
			dns_seeds: vec![
				"seed.bitcoin.sipa.be",
				"dnsseed.bluematt.me",
				"dnsseed.bitcoin.dashjr.org",
				"seed.bitcoinstats.com",
				"seed.bitcoin.jonasschnelli.ch",
				"seed.btc.petertodd.org",
			],
			pow_limit_bits: 0x1d00ffff,
			verify_pow: true,
			genesis: genesis::genesis_main(),
		}
	}

	/// Test network parameters.
	pub fn testnet() -> ChainParams {
		ChainParams {
			chain_type: ChainTypes::Testnet,
			magic: 0x0709_110B,
			default_port: 18333,
			dns_seeds: vec![
				"testnet-seed.bitcoin.jonasschnelli.ch",
				"seed.tbtc.petertodd.org",
				"seed.testnet.bitcoin.sprovoost.nl",
				"testnet-seed.bluematt.me",
			],
			pow_limit_bits: 0x1d00ffff,
			verify_pow: true,
			genesis: genesis::genesis_test(),
		}
	}

	/// Parameters for automated tests: mainnet genesis and magic, no
	/// proof-of-work verification so tests can hand-build headers.
	pub fn automated_testing() -> ChainParams {
		ChainParams {
			chain_type: ChainTypes::AutomatedTesting,
			magic: 0xD9B4_BEF9,
			default_port: 18444,
			dns_seeds: vec![],
			pow_limit_bits: 0x1d00ffff,
			verify_pow: false,
			genesis: genesis::genesis_main(),
		}
	}

	/// Parameters for a chain type.
	pub fn for_chain(chain_type: ChainTypes) -> ChainParams {
		match chain_type {
			ChainTypes::Mainnet => ChainParams::mainnet(),
			ChainTypes::Testnet => ChainParams::testnet(),
			ChainTypes::AutomatedTesting => ChainParams::automated_testing(),
		}
	}
}
