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

//! Block index entries, their status bits and the on-disk bookkeeping
//! records that accompany them.

use num_bigint::BigUint;

use crate::core::consensus::CLIENT_VERSION;
use crate::core::core::block::BlockHeader;
use crate::core::core::hash::{Hash, Hashed};
use crate::core::ser::{self, Readable, Reader, Writeable, Writer};
use crate::index::NodeId;

/// Unused.
pub const BLOCK_VALID_UNKNOWN: u32 = 0;
/// Parsed, version ok, hash satisfies claimed PoW.
pub const BLOCK_VALID_HEADER: u32 = 1;
/// All parent headers found. Implies all parents are also at least TREE.
pub const BLOCK_VALID_TREE: u32 = 2;
/// Only first tx is coinbase, no duplicate txids, merkle root checked.
pub const BLOCK_VALID_TRANSACTIONS: u32 = 3;
/// Outputs do not overspend inputs, no double spends. Implies all parents
/// are also at least CHAIN.
pub const BLOCK_VALID_CHAIN: u32 = 4;
/// Scripts and signatures ok. Implies all parents are also at least
/// SCRIPTS.
pub const BLOCK_VALID_SCRIPTS: u32 = 5;
/// All validity bits.
pub const BLOCK_VALID_MASK: u32 = 7;

/// Full block available in blk*.dat.
pub const BLOCK_HAVE_DATA: u32 = 8;
/// Undo data available in rev*.dat.
pub const BLOCK_HAVE_UNDO: u32 = 16;
pub const BLOCK_HAVE_MASK: u32 = BLOCK_HAVE_DATA | BLOCK_HAVE_UNDO;

/// Stage after last reached validness failed.
pub const BLOCK_FAILED_VALID: u32 = 32;
/// Descends from a failed block.
pub const BLOCK_FAILED_CHILD: u32 = 64;
pub const BLOCK_FAILED_MASK: u32 = BLOCK_FAILED_VALID | BLOCK_FAILED_CHILD;

/// Block data was received with a witness-enforcing client.
pub const BLOCK_OPT_WITNESS: u32 = 128;

/// Location of a block within the append-only block files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskBlockPos {
	/// Which blkNNNNN.dat file
	pub file_index: i32,
	/// Byte offset of the record's magic prefix
	pub position: u32,
}

impl DiskBlockPos {
	/// Position within file `file_index` at byte `position`.
	pub fn new(file_index: i32, position: u32) -> DiskBlockPos {
		DiskBlockPos { file_index, position }
	}
}

/// A node in the header tree. Everything the node knows about one block
/// header, including where the block's data lives on disk and the
/// accumulated work on the chain ending here.
#[derive(Clone, Debug)]
pub struct BlockIndexEntry {
	/// The header itself
	pub header: BlockHeader,
	/// Cached hash of the header
	pub hash: Hash,
	/// Height in the tree, genesis at zero
	pub height: i32,
	/// Validity and storage status bit set
	pub status: u32,
	/// Number of transactions in the block, zero until the block is seen
	pub tx_count: u32,
	/// Block file holding the data, meaningful with BLOCK_HAVE_DATA
	pub file_index: i32,
	/// Offset of the block bytes, past the magic and size prefix
	pub data_position: u32,
	/// Offset of the undo bytes, meaningful with BLOCK_HAVE_UNDO
	pub undo_position: u32,
	/// Total work on the chain ending at this block
	pub chainwork: BigUint,
	/// Transactions on the chain up to and including this block
	pub chain_tx_count: u64,
	/// Maximum timestamp on the chain up to this block
	pub max_time: u32,
	/// Parent node
	pub prev: Option<NodeId>,
	/// Skip-list ancestor, set once when prev is linked
	pub skip: Option<NodeId>,
}

impl BlockIndexEntry {
	/// A fresh entry for a header, unlinked and unvalidated.
	pub fn from_header(header: BlockHeader) -> BlockIndexEntry {
		let hash = header.hash();
		BlockIndexEntry {
			header,
			hash,
			height: 0,
			status: 0,
			tx_count: 0,
			file_index: 0,
			data_position: 0,
			undo_position: 0,
			chainwork: BigUint::from(0u32),
			chain_tx_count: 0,
			max_time: 0,
			prev: None,
			skip: None,
		}
	}

	/// Record where the block's bytes were placed. The stored position
	/// skips the 8-byte magic and size prefix.
	pub fn set_disk_position(&mut self, pos: DiskBlockPos) {
		self.file_index = pos.file_index;
		self.data_position = pos.position + 8;
		self.undo_position = 0;
	}

	/// Raise the validity level, which can never go back down. Returns
	/// whether anything changed; failed blocks never change.
	pub fn raise_validity(&mut self, up_to: u32) -> bool {
		debug_assert_eq!(up_to & !BLOCK_VALID_MASK, 0);
		if self.status & BLOCK_FAILED_MASK != 0 {
			return false;
		}
		if self.status & BLOCK_VALID_MASK < up_to {
			self.status = (self.status & !BLOCK_VALID_MASK) | up_to;
			return true;
		}
		false
	}

	/// Whether this entry reached the given validity level and is not
	/// failed.
	pub fn is_valid(&self, up_to: u32) -> bool {
		debug_assert_eq!(up_to & !BLOCK_VALID_MASK, 0);
		if self.status & BLOCK_FAILED_MASK != 0 {
			return false;
		}
		self.status & BLOCK_VALID_MASK >= up_to
	}
}

// Database form: varint client version, height, status and tx count,
// conditional file positions, then the raw header. Work and linkage are
// recomputed at load.
impl Writeable for BlockIndexEntry {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_varint(CLIENT_VERSION)?;
		writer.write_varint(self.height as u64)?;
		writer.write_varint(self.status as u64)?;
		writer.write_varint(self.tx_count as u64)?;
		if self.status & BLOCK_HAVE_MASK != 0 {
			writer.write_varint(self.file_index as u64)?;
		}
		if self.status & BLOCK_HAVE_DATA != 0 {
			writer.write_varint(self.data_position as u64)?;
		}
		if self.status & BLOCK_HAVE_UNDO != 0 {
			writer.write_varint(self.undo_position as u64)?;
		}
		self.header.write(writer)
	}
}

impl Readable for BlockIndexEntry {
	fn read(reader: &mut dyn Reader) -> Result<BlockIndexEntry, ser::Error> {
		let _client_version = reader.read_varint()?;
		let height = reader.read_varint()? as i32;
		let status = reader.read_varint()? as u32;
		let tx_count = reader.read_varint()? as u32;
		let mut file_index = 0i32;
		let mut data_position = 0u32;
		let mut undo_position = 0u32;
		if status & BLOCK_HAVE_MASK != 0 {
			file_index = reader.read_varint()? as i32;
		}
		if status & BLOCK_HAVE_DATA != 0 {
			data_position = reader.read_varint()? as u32;
		}
		if status & BLOCK_HAVE_UNDO != 0 {
			undo_position = reader.read_varint()? as u32;
		}
		let header = BlockHeader::read(reader)?;
		let mut entry = BlockIndexEntry::from_header(header);
		entry.height = height;
		entry.status = status;
		entry.tx_count = tx_count;
		entry.file_index = file_index;
		entry.data_position = data_position;
		entry.undo_position = undo_position;
		Ok(entry)
	}
}

/// Accounting for one block file, persisted on every flush that touched
/// the file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockFileInfo {
	/// Which blkNNNNN.dat file, derived from the record key
	pub file_index: i32,
	/// Blocks stored in the file
	pub blocks: u32,
	/// Bytes used by block records
	pub size: u64,
	/// Bytes used by undo records
	pub undo_size: u64,
	/// Lowest block height in the file
	pub min_height: u32,
	/// Highest block height in the file
	pub max_height: u32,
	/// Earliest block timestamp in the file
	pub min_time: u64,
	/// Latest block timestamp in the file
	pub max_time: u64,
}

impl BlockFileInfo {
	/// Account for one block landing in this file.
	pub fn add_block(&mut self, height: u32, timestamp: u64) {
		if self.blocks == 0 {
			self.min_height = height;
			self.max_height = height;
			self.min_time = timestamp;
			self.max_time = timestamp;
		} else {
			self.min_height = self.min_height.min(height);
			self.max_height = self.max_height.max(height);
			self.min_time = self.min_time.min(timestamp);
			self.max_time = self.max_time.max(timestamp);
		}
		self.blocks += 1;
	}
}

impl Writeable for BlockFileInfo {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_varint(self.blocks as u64)?;
		writer.write_varint(self.size)?;
		writer.write_varint(self.undo_size)?;
		writer.write_varint(self.min_height as u64)?;
		writer.write_varint(self.max_height as u64)?;
		writer.write_varint(self.min_time)?;
		writer.write_varint(self.max_time)
	}
}

impl Readable for BlockFileInfo {
	fn read(reader: &mut dyn Reader) -> Result<BlockFileInfo, ser::Error> {
		let blocks = reader.read_varint()? as u32;
		let size = reader.read_varint()?;
		let undo_size = reader.read_varint()?;
		let min_height = reader.read_varint()? as u32;
		let max_height = reader.read_varint()? as u32;
		let min_time = reader.read_varint()?;
		let max_time = reader.read_varint()?;
		Ok(BlockFileInfo {
			file_index: 0,
			blocks,
			size,
			undo_size,
			min_height,
			max_height,
			min_time,
			max_time,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::ser::{deserialize, ser_vec};

	#[test]
	fn validity_is_monotonic() {
		let mut entry = BlockIndexEntry::from_header(BlockHeader::default());
		assert!(entry.raise_validity(BLOCK_VALID_TREE));
		assert!(!entry.raise_validity(BLOCK_VALID_HEADER));
		assert_eq!(entry.status & BLOCK_VALID_MASK, BLOCK_VALID_TREE);
		assert!(entry.raise_validity(BLOCK_VALID_SCRIPTS));
		assert!(entry.is_valid(BLOCK_VALID_TRANSACTIONS));
	}

	#[test]
	fn failed_blocks_stay_failed() {
		let mut entry = BlockIndexEntry::from_header(BlockHeader::default());
		entry.raise_validity(BLOCK_VALID_TREE);
		entry.status |= BLOCK_FAILED_VALID;
		assert!(!entry.raise_validity(BLOCK_VALID_SCRIPTS));
		assert!(!entry.is_valid(BLOCK_VALID_TREE));
	}

	#[test]
	fn entry_db_roundtrip() {
		let mut entry = BlockIndexEntry::from_header(BlockHeader::default());
		entry.height = 1234;
		entry.tx_count = 7;
		entry.raise_validity(BLOCK_VALID_TRANSACTIONS);
		entry.status |= BLOCK_HAVE_DATA;
		entry.set_disk_position(DiskBlockPos::new(3, 1000));
		let bytes = ser_vec(&entry).unwrap();
		let entry2: BlockIndexEntry = deserialize(&bytes).unwrap();
		assert_eq!(entry2.height, 1234);
		assert_eq!(entry2.tx_count, 7);
		assert_eq!(entry2.status, entry.status);
		assert_eq!(entry2.file_index, 3);
		assert_eq!(entry2.data_position, 1008);
		assert_eq!(entry2.hash, entry.hash);
	}

	#[test]
	fn file_info_accounting() {
		let mut info = BlockFileInfo::default();
		info.add_block(10, 5000);
		info.add_block(5, 9000);
		info.add_block(20, 1000);
		assert_eq!(info.blocks, 3);
		assert_eq!(info.min_height, 5);
		assert_eq!(info.max_height, 20);
		assert_eq!(info.min_time, 1000);
		assert_eq!(info.max_time, 9000);
	}

	#[test]
	fn file_info_roundtrip() {
		let mut info = BlockFileInfo::default();
		info.add_block(100, 1_500_000_000);
		info.size = 4096;
		let bytes = ser_vec(&info).unwrap();
		let info2: BlockFileInfo = deserialize(&bytes).unwrap();
		assert_eq!(info2.blocks, 1);
		assert_eq!(info2.size, 4096);
		assert_eq!(info2.min_height, 100);
	}
}
