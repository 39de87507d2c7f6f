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

//! Proof-of-work arithmetic: the compact target encoding and the work
//! represented by a header. All 256-bit math runs on `BigUint`.

use num_bigint::BigUint;

use crate::core::block::BlockHeader;
use crate::core::hash::{Hash, Hashed};
use crate::params::ChainParams;

/// Decodes the compact exponent/mantissa target encoding, reporting the
/// negative and overflow conditions the encoding can express.
pub fn decode_compact(bits: u32, negative: &mut bool, overflow: &mut bool) -> BigUint {
	let size = (bits >> 24) as i32;
	let mut word = bits & 0x007f_ffff;
	let result = if size <= 3 {
		word >>= 8 * (3 - size) as u32;
		BigUint::from(word)
	} else {
		BigUint::from(word) << (8 * (size - 3) as usize)
	};
	*negative = word != 0 && (bits & 0x0080_0000) != 0;
	*overflow = word != 0
		&& (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32));
	result
}

/// Decodes a compact target, rejecting negative, overflowing and zero
/// values.
pub fn decode_compact_target(bits: u32) -> Option<BigUint> {
	let mut negative = false;
	let mut overflow = false;
	let target = decode_compact(bits, &mut negative, &mut overflow);
	if negative || overflow || target == BigUint::from(0u32) {
		return None;
	}
	Some(target)
}

/// Encodes a target back into the compact representation.
pub fn encode_compact(target: &BigUint) -> u32 {
	let bytes = target.to_bytes_be();
	let mut size = bytes.len();
	if size == 0 {
		return 0;
	}
	// the three most significant bytes form the mantissa
	let mut word: u32 = 0;
	for (i, b) in bytes.iter().take(3).enumerate() {
		word |= (*b as u32) << (8 * (2 - i));
	}
	// the mantissa sign bit would make the value negative; shift one byte
	if word & 0x0080_0000 != 0 {
		word >>= 8;
		size += 1;
	}
	(size as u32) << 24 | word
}

/// Interpret a hash as the unsigned 256-bit integer it represents.
pub fn hash_to_biguint(hash: &Hash) -> BigUint {
	BigUint::from_bytes_le(hash.as_bytes())
}

/// Work represented by a header with the given compact bits,
/// `2^256 / (target + 1)`. Zero when the bits are unusable.
pub fn block_proof(bits: u32) -> BigUint {
	let target = match decode_compact_target(bits) {
		Some(t) => t,
		None => return BigUint::from(0u32),
	};
	(BigUint::from(1u32) << 256) / (target + 1u32)
}

/// Validates a header's proof of work: usable bits, target within the
/// chain's limit, and a header hash at or below the target.
pub fn check_proof_of_work(header: &BlockHeader, params: &ChainParams) -> bool {
	if !params.verify_pow {
		return true;
	}
	let target = match decode_compact_target(header.bits) {
		Some(t) => t,
		None => {
			warn!("check_proof_of_work invalid bits {:08x}", header.bits);
			return false;
		}
	};
	let limit = decode_compact_target(params.pow_limit_bits).expect("chain pow limit");
	if target > limit {
		warn!("check_proof_of_work target above limit {:08x}", header.bits);
		return false;
	}
	if hash_to_biguint(&header.hash()) > target {
		warn!("check_proof_of_work hash above target {}", header.hash());
		return false;
	}
	true
}
