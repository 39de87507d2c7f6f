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

//! Bitcoin Script: opcodes, the stack interpreter, script numbers and
//! transaction signature hashing.

pub mod builder;
pub mod error;
pub mod ops;
pub mod opcodes;
pub mod sighash;
pub mod vm;

pub use self::builder::Builder;
pub use self::error::ScriptError;
pub use self::sighash::TransactionSignatureChecker;
pub use self::vm::{SignatureChecker, Vm};

use self::error::ScriptError as Error;

/// Longest script this interpreter will evaluate.
pub const MAX_SCRIPT_SIZE: usize = 10_000;
/// Longest single stack element a push may create.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;
/// Most non-push operations per script.
pub const MAX_OPS_PER_SCRIPT: usize = 201;
/// Most elements across the main and alt stacks.
pub const MAX_STACK_SIZE: usize = 1_000;
/// Most public keys in a CHECKMULTISIG.
pub const MAX_PUBKEYS_PER_MULTISIG: i64 = 20;
/// Script numbers feeding arithmetic are at most this many bytes.
pub const MAX_NUM_SIZE: usize = 4;

/// Encodes an integer in the script number format: little-endian
/// sign-and-magnitude, zero as the empty string, an extra sign byte when
/// the top magnitude byte would collide with the sign bit.
pub fn encode_script_num(val: i64) -> Vec<u8> {
	if val == 0 {
		return vec![];
	}
	let neg = val < 0;
	let mut abs = (val as i128).abs() as u64;
	let mut out = Vec::with_capacity(9);
	while abs > 0 {
		out.push((abs & 0xff) as u8);
		abs >>= 8;
	}
	let last = *out.last().expect("non-zero magnitude");
	if last & 0x80 != 0 {
		out.push(if neg { 0x80 } else { 0x00 });
	} else if neg {
		*out.last_mut().expect("non-zero magnitude") = last | 0x80;
	}
	out
}

/// Decodes a script number of at most `max_len` bytes. Non-minimal
/// encodings are accepted; the historical chain contains them.
pub fn decode_script_num(data: &[u8], max_len: usize) -> Result<i64, Error> {
	if data.len() > max_len {
		return Err(Error::UnknownError);
	}
	if data.is_empty() {
		return Ok(0);
	}
	let mut val: u64 = 0;
	for (i, byte) in data.iter().enumerate() {
		val |= (*byte as u64) << (8 * i);
	}
	let last = data[data.len() - 1];
	if last & 0x80 != 0 {
		let magnitude = val & !(0x80u64 << (8 * (data.len() - 1)));
		Ok(-(magnitude as i64))
	} else {
		Ok(val as i64)
	}
}

/// A stack value is true iff any byte is non-zero, ignoring a lone trailing
/// 0x80 (negative zero).
pub fn cast_to_bool(data: &[u8]) -> bool {
	for (i, byte) in data.iter().enumerate() {
		if *byte != 0 {
			return i != data.len() - 1 || *byte != 0x80;
		}
	}
	false
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn script_num_zero_is_empty() {
		assert_eq!(encode_script_num(0), Vec::<u8>::new());
		assert_eq!(decode_script_num(&[], 4).unwrap(), 0);
	}

	#[test]
	fn script_num_vectors() {
		assert_eq!(encode_script_num(1), vec![0x01]);
		assert_eq!(encode_script_num(-1), vec![0x81]);
		assert_eq!(encode_script_num(100), vec![0x64]);
		assert_eq!(encode_script_num(-100), vec![0xe4]);
		// sign byte carried when the high bit would collide
		assert_eq!(encode_script_num(128), vec![0x80, 0x00]);
		assert_eq!(encode_script_num(-128), vec![0x80, 0x80]);
		assert_eq!(encode_script_num(0x7fffffff), vec![0xff, 0xff, 0xff, 0x7f]);
	}

	#[test]
	fn script_num_decode_vectors() {
		assert_eq!(decode_script_num(&[0x81], 4).unwrap(), -1);
		assert_eq!(decode_script_num(&[0xe4], 4).unwrap(), -100);
		assert_eq!(decode_script_num(&[0x64], 4).unwrap(), 100);
		assert_eq!(decode_script_num(&[0xff, 0xff, 0xff, 0xff], 4).unwrap(), -0x7fffffff);
		assert_eq!(decode_script_num(&[0xff, 0xff, 0xff, 0x7f], 4).unwrap(), 0x7fffffff);
		// non-minimal but accepted
		assert_eq!(decode_script_num(&[0x01, 0x00], 4).unwrap(), 1);
		assert!(decode_script_num(&[1, 2, 3, 4, 5], 4).is_err());
	}

	#[test]
	fn roundtrip() {
		for v in &[0i64, 1, -1, 127, -127, 128, -128, 255, 256, 0x7fffffff, -0x7fffffff] {
			let enc = encode_script_num(*v);
			assert_eq!(decode_script_num(&enc, 8).unwrap(), *v, "value {}", v);
		}
	}

	#[test]
	fn truthiness() {
		assert!(!cast_to_bool(&[]));
		assert!(!cast_to_bool(&[0x00]));
		assert!(!cast_to_bool(&[0x00, 0x00]));
		// negative zero
		assert!(!cast_to_bool(&[0x80]));
		assert!(!cast_to_bool(&[0x00, 0x80]));
		assert!(cast_to_bool(&[0x01]));
		assert!(cast_to_bool(&[0x80, 0x00]));
	}
}
