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

//! Hash Function
//!
//! Double SHA-256 content identifiers. Hashes are stored little-endian and
//! compared as unsigned 256-bit integers; display follows the customary
//! reversed (big-endian) hex convention.

use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::{fmt, ops};

use crate::ser::{self, Readable, Reader, Writeable, Writer};
use util::{from_hex, to_hex};

/// A hash consisting of all zeroes, often used as a sentinel. Not the hash
/// of anything.
pub const ZERO_HASH: Hash = Hash([0; 32]);

/// A 32-byte hash, stored in the byte order it travels on the wire.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Hash(pub [u8; 32]);

impl Default for Hash {
	fn default() -> Hash {
		ZERO_HASH
	}
}

impl Hash {
	/// Size of a hash in bytes.
	pub const LEN: usize = 32;

	/// Builds a Hash from a byte slice. Returns an error if the slice is
	/// not exactly 32 bytes.
	pub fn from_vec(v: &[u8]) -> Result<Hash, ser::Error> {
		if v.len() != Hash::LEN {
			return Err(ser::Error::CorruptedData);
		}
		let mut h = [0; Hash::LEN];
		h.copy_from_slice(v);
		Ok(Hash(h))
	}

	/// Converts the hash to a byte vector
	pub fn to_vec(&self) -> Vec<u8> {
		self.0.to_vec()
	}

	/// The hash as a byte slice
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// True if every byte is zero, the customary "no hash" sentinel.
	pub fn is_zero(&self) -> bool {
		self.0.iter().all(|b| *b == 0)
	}

	/// Convert hex string representation (reversed byte order) back to a
	/// hash.
	pub fn from_hex(hex: &str) -> Result<Hash, ser::Error> {
		let mut bytes = from_hex(hex).map_err(|_| ser::Error::CorruptedData)?;
		bytes.reverse();
		Hash::from_vec(&bytes)
	}

	/// Hex representation, most significant byte first.
	pub fn to_hex(&self) -> String {
		let mut reversed = self.0;
		reversed.reverse();
		to_hex(&reversed)
	}
}

impl fmt::Debug for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl fmt::Display for Hash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl Ord for Hash {
	fn cmp(&self, other: &Hash) -> Ordering {
		// Numeric comparison, most significant byte last in storage.
		for i in (0..Hash::LEN).rev() {
			match self.0[i].cmp(&other.0[i]) {
				Ordering::Equal => continue,
				ord => return ord,
			}
		}
		Ordering::Equal
	}
}

impl PartialOrd for Hash {
	fn partial_cmp(&self, other: &Hash) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl ops::Index<usize> for Hash {
	type Output = u8;
	fn index(&self, idx: usize) -> &u8 {
		&self.0[idx]
	}
}

impl Readable for Hash {
	fn read(reader: &mut dyn Reader) -> Result<Hash, ser::Error> {
		let bytes = reader.read_fixed_bytes(Hash::LEN)?;
		Hash::from_vec(&bytes)
	}
}

impl Writeable for Hash {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_fixed_bytes(&self.0)
	}
}

/// Serializer that outputs a double SHA-256 digest of everything written to
/// it instead of retaining the bytes.
pub struct HashWriter {
	state: Sha256,
}

impl HashWriter {
	/// Consume the `HashWriter`, outputting its current hash into a 32-byte
	/// array.
	pub fn finalize(self) -> Hash {
		let first = self.state.result();
		let second = Sha256::digest(&first);
		let mut ret = [0; 32];
		ret.copy_from_slice(&second);
		Hash(ret)
	}
}

impl Default for HashWriter {
	fn default() -> HashWriter {
		HashWriter { state: Sha256::new() }
	}
}

impl Writer for HashWriter {
	fn write_u8(&mut self, n: u8) -> Result<(), ser::Error> {
		self.state.input(&[n]);
		Ok(())
	}
	fn write_u16(&mut self, n: u16) -> Result<(), ser::Error> {
		self.state.input(&n.to_le_bytes());
		Ok(())
	}
	fn write_u32(&mut self, n: u32) -> Result<(), ser::Error> {
		self.state.input(&n.to_le_bytes());
		Ok(())
	}
	fn write_u64(&mut self, n: u64) -> Result<(), ser::Error> {
		self.state.input(&n.to_le_bytes());
		Ok(())
	}
	fn write_i32(&mut self, n: i32) -> Result<(), ser::Error> {
		self.state.input(&n.to_le_bytes());
		Ok(())
	}
	fn write_i64(&mut self, n: i64) -> Result<(), ser::Error> {
		self.state.input(&n.to_le_bytes());
		Ok(())
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), ser::Error> {
		self.state.input(bytes);
		Ok(())
	}
}

/// Double SHA-256 of a raw byte slice.
pub fn hash_bytes(data: &[u8]) -> Hash {
	let first = Sha256::digest(data);
	let second = Sha256::digest(&first);
	let mut ret = [0; 32];
	ret.copy_from_slice(&second);
	Hash(ret)
}

/// Types with this trait hash as the double SHA-256 of their serialized
/// form.
pub trait DefaultHashable: Writeable {}

/// A trait for types that have a canonical hash
pub trait Hashed {
	/// Obtain the hash of the object
	fn hash(&self) -> Hash;
}

impl<D: DefaultHashable> Hashed for D {
	fn hash(&self) -> Hash {
		let mut hasher = HashWriter::default();
		// HashWriter is infallible, but write takes any Writer.
		self.write(&mut hasher).expect("hash writer");
		hasher.finalize()
	}
}
