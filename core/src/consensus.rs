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

//! All the consensus and protocol constants shared by the node crates.

use crate::core::hash::Hash;

/// A coin is 100 000 000 satoshis.
pub const COIN: i64 = 100_000_000;

/// The p2p protocol version this node speaks.
pub const PROTOCOL_VERSION: u32 = 70_015;

/// Client version recorded in database records and the user agent,
/// major * 1 000 000 + minor * 10 000 + patch * 100.
pub const CLIENT_VERSION: u64 = 10_000;

/// Name advertised in the user agent string.
pub const CLIENT_NAME: &str = "halley";

/// Hard cap on a single wire message, payload included.
pub const MAX_MSG_SIZE: u64 = 32 * 1024 * 1024;

/// Largest serialized block this node will store or read back.
pub const MAX_BLOCK_SIZE: usize = 2 * 1024 * 1024;

/// Block files are rotated once they would exceed this size.
pub const MAX_BLOCKFILE_SIZE: u64 = 128 * 1024 * 1024;

/// Upper bound on transactions per block on the wire.
pub const MAX_TX_PER_BLOCK: usize = 10_000;

/// Upper bound on inputs, outputs and witness stacks per transaction.
pub const MAX_TX_INPUTS_OUTPUTS: usize = 10_000;

/// Upper bound on witness stack items per input.
pub const MAX_WITNESS_ITEMS: usize = 10_000;

/// Upper bound on a serialized script or witness element on the wire.
pub const MAX_SCRIPT_SIZE: usize = 50_000;

/// Headers per `headers` message; a full batch triggers the next request.
pub const MAX_HEADERS_PER_MSG: usize = 2_000;

/// Upper bound on `inv`/`getdata`/`notfound` items.
pub const MAX_INV_ITEMS: usize = 50_000;

/// Upper bound on `addr` entries.
pub const MAX_ADDR_ITEMS: usize = 5_000;

/// Upper bound on locator hashes in `getheaders`/`getblocks`.
pub const MAX_LOCATOR_HASHES: usize = 1_000;

/// Upper bound on the advertised user agent.
pub const MAX_USER_AGENT_SIZE: usize = 128;

/// Upper bounds on reject message fields.
pub const MAX_REJECT_MESSAGE_SIZE: usize = 64;
pub const MAX_REJECT_REASON_SIZE: usize = 1_024;

/// The two historical blocks allowed to duplicate a still-unspent earlier
/// coinbase. Every other block is subject to the duplicate-coin rule.
pub const DUPLICATE_COINBASE_HEIGHTS: [i32; 2] = [91_842, 91_880];

lazy_static! {
	/// Hashes of the duplicate-coinbase exemption blocks, index-matched to
	/// `DUPLICATE_COINBASE_HEIGHTS`.
	pub static ref DUPLICATE_COINBASE_HASHES: [Hash; 2] = [
		Hash::from_hex("00000000000a4d0a398161ffc163c503763b1f4360639393e0e4c8e300e0caec")
			.expect("exemption hash"),
		Hash::from_hex("00000000000743f190a18c5577a3c2d2a1f610ae9601ac046a38084ccb7cd721")
			.expect("exemption hash"),
	];
}

/// True when the block at `height` with hash `hash` is exempt from the
/// duplicate-coin rule.
pub fn is_duplicate_coinbase_exempt(height: i32, hash: &Hash) -> bool {
	DUPLICATE_COINBASE_HEIGHTS
		.iter()
		.zip(DUPLICATE_COINBASE_HASHES.iter())
		.any(|(h, expected)| *h == height && expected == hash)
}

/// Formats the user agent the way every bitcoin client does:
/// `/name:major.minor.patch/`.
pub fn format_user_agent() -> String {
	let major = CLIENT_VERSION / 1_000_000;
	let minor = (CLIENT_VERSION / 10_000) % 100;
	let patch = (CLIENT_VERSION / 100) % 100;
	if CLIENT_VERSION % 100 == 0 {
		format!("/{}:{}.{}.{}/", CLIENT_NAME, major, minor, patch)
	} else {
		format!(
			"/{}:{}.{}.{}.{}/",
			CLIENT_NAME,
			major,
			minor,
			patch,
			CLIENT_VERSION % 100
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_agent_format() {
		assert_eq!(format_user_agent(), "/halley:0.1.0/");
	}

	#[test]
	fn exemptions_match_height_and_hash() {
		let h = DUPLICATE_COINBASE_HASHES[0];
		assert!(is_duplicate_coinbase_exempt(91_842, &h));
		assert!(!is_duplicate_coinbase_exempt(91_843, &h));
		assert!(!is_duplicate_coinbase_exempt(91_880, &h));
	}
}
