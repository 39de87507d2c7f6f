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

//! Blocks and blockheaders

use crate::consensus::MAX_TX_PER_BLOCK;
use crate::core::hash::{DefaultHashable, Hash, Hashed, ZERO_HASH};
use crate::core::merkle::compute_merkle_root;
use crate::core::transaction::Transaction;
use crate::ser::{self, read_vec, write_vec, Readable, Reader, Writeable, Writer};

/// Block header, the 80-byte record whose double SHA-256 is the block id.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
	/// Version of the block
	pub version: i32,
	/// Hash of the block previous to this in the chain
	pub prev_hash: Hash,
	/// Merkle root of the block's transactions
	pub merkle_root: Hash,
	/// Timestamp at which the block was built
	pub timestamp: u32,
	/// Compact encoding of the proof-of-work target
	pub bits: u32,
	/// Nonce ground out to satisfy the target
	pub nonce: u32,
}

impl Default for BlockHeader {
	fn default() -> BlockHeader {
		BlockHeader {
			version: 1,
			prev_hash: ZERO_HASH,
			merkle_root: ZERO_HASH,
			timestamp: 0,
			bits: 0,
			nonce: 0,
		}
	}
}

impl DefaultHashable for BlockHeader {}

impl Readable for BlockHeader {
	fn read(reader: &mut dyn Reader) -> Result<BlockHeader, ser::Error> {
		let version = reader.read_i32()?;
		let prev_hash = Hash::read(reader)?;
		let merkle_root = Hash::read(reader)?;
		let timestamp = reader.read_u32()?;
		let bits = reader.read_u32()?;
		let nonce = reader.read_u32()?;
		Ok(BlockHeader {
			version,
			prev_hash,
			merkle_root,
			timestamp,
			bits,
			nonce,
		})
	}
}

impl Writeable for BlockHeader {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_i32(self.version)?;
		self.prev_hash.write(writer)?;
		self.merkle_root.write(writer)?;
		writer.write_u32(self.timestamp)?;
		writer.write_u32(self.bits)?;
		writer.write_u32(self.nonce)
	}
}

/// A full block: header plus the ordered transaction list behind its merkle
/// root.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
	/// The header with the commitments to the rest of the data
	pub header: BlockHeader,
	/// The transactions, coinbase first
	pub transactions: Vec<Transaction>,
}

impl Block {
	/// Merkle root over this block's transaction ids. The `mutated` flag is
	/// raised when two consecutive subtrees hash identically, the classic
	/// duplicate-transaction malleation.
	pub fn merkle_root(&self, mutated: &mut bool) -> Hash {
		let leaves: Vec<Hash> = self.transactions.iter().map(|tx| tx.txid()).collect();
		compute_merkle_root(&leaves, mutated)
	}

	/// Total serialized size of the block in bytes.
	pub fn serialized_size(&self) -> usize {
		ser::ser_vec(self).map(|v| v.len()).unwrap_or(0)
	}
}

impl Hashed for Block {
	fn hash(&self) -> Hash {
		self.header.hash()
	}
}

impl Readable for Block {
	fn read(reader: &mut dyn Reader) -> Result<Block, ser::Error> {
		let header = BlockHeader::read(reader)?;
		let transactions = read_vec(reader, MAX_TX_PER_BLOCK)?;
		Ok(Block { header, transactions })
	}
}

impl Writeable for Block {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.header.write(writer)?;
		write_vec(writer, &self.transactions)
	}
}
