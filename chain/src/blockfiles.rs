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

//! Append-only block files. Each record is the network magic, the block
//! size and the raw block bytes; a file is rotated when the next record
//! would push it past the size cap.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::core::consensus::MAX_BLOCK_SIZE;
use crate::core::core::block::Block;
use crate::core::core::hash::Hashed;
use crate::core::ser;
use crate::error::Error;
use crate::types::{BlockFileInfo, BlockIndexEntry, DiskBlockPos};

/// Block file bookkeeping: which file is current, how full each file is,
/// and which infos need persisting.
pub struct BlockFiles {
	dir: PathBuf,
	magic: u32,
	max_file_size: u64,
	files: Vec<BlockFileInfo>,
	last_block_file: i32,
	dirty_files: BTreeSet<i32>,
}

/// Path of a block file under the blocks directory.
pub fn block_file_path(dir: &Path, file_index: i32) -> PathBuf {
	dir.join(format!("blk{:05}.dat", file_index))
}

impl BlockFiles {
	/// Bookkeeping rooted at `dir` (the `blocks/` directory), rotating at
	/// `max_file_size` bytes.
	pub fn new(dir: PathBuf, magic: u32, max_file_size: u64) -> BlockFiles {
		BlockFiles {
			dir,
			magic,
			max_file_size,
			files: vec![],
			last_block_file: 0,
			dirty_files: BTreeSet::new(),
		}
	}

	/// Adopt the state loaded from the index database.
	pub fn set_loaded(&mut self, mut files: Vec<BlockFileInfo>, last_block_file: i32) {
		files.sort_by_key(|info| info.file_index);
		let max_index = files.iter().map(|info| info.file_index).max().unwrap_or(0);
		let mut dense = vec![BlockFileInfo::default(); (max_index + 1) as usize];
		for info in files {
			let index = info.file_index;
			dense[index as usize] = info;
			dense[index as usize].file_index = index;
		}
		for (i, info) in dense.iter_mut().enumerate() {
			info.file_index = i as i32;
		}
		self.files = dense;
		self.last_block_file = last_block_file;
	}

	/// The directory block files live in.
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// File the next block record lands in, rotating past the size cap.
	/// Updates the accounting and marks the touched file dirty.
	pub fn find_block_pos(&mut self, record_size: u64) -> DiskBlockPos {
		let mut file = self.last_block_file.max(0);
		if self.files.len() as i32 <= file {
			self.files.resize((file + 1) as usize, BlockFileInfo::default());
			for (i, info) in self.files.iter_mut().enumerate() {
				info.file_index = i as i32;
			}
		}
		while self.files[file as usize].size + record_size >= self.max_file_size {
			file += 1;
			if self.files.len() as i32 <= file {
				self.files.resize((file + 1) as usize, BlockFileInfo::default());
				for (i, info) in self.files.iter_mut().enumerate() {
					info.file_index = i as i32;
				}
			}
		}
		let pos = DiskBlockPos::new(file, self.files[file as usize].size as u32);
		self.files[file as usize].size += record_size;
		self.last_block_file = file;
		self.dirty_files.insert(file);
		pos
	}

	/// Account a block written at `pos`.
	pub fn add_block(&mut self, pos: DiskBlockPos, height: u32, timestamp: u64) {
		self.files[pos.file_index as usize].add_block(height, timestamp);
		self.dirty_files.insert(pos.file_index);
	}

	/// File infos touched since the last call, plus the current last-file
	/// pointer, for the index flush.
	pub fn take_dirty(&mut self) -> (Vec<BlockFileInfo>, i32) {
		let dirty = std::mem::replace(&mut self.dirty_files, BTreeSet::new());
		let infos = dirty
			.into_iter()
			.filter_map(|index| self.files.get(index as usize).cloned())
			.collect();
		(infos, self.last_block_file)
	}

	/// Read a stored block back, re-validating the record prefix the way
	/// it was written.
	pub fn read_block(&self, entry: &BlockIndexEntry) -> Result<Block, Error> {
		let path = block_file_path(&self.dir, entry.file_index);
		let mut file = File::open(&path)?;
		if entry.data_position < 8 {
			return Err(Error::BadBlockFile(format!(
				"data position {} too small",
				entry.data_position
			)));
		}
		file.seek(SeekFrom::Start(entry.data_position as u64 - 8))?;
		let mut prefix = [0u8; 8];
		file.read_exact(&mut prefix)?;
		let magic = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
		let size = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]) as usize;
		if magic != self.magic {
			return Err(Error::BadBlockFile(format!(
				"bad record magic {:08x} in {:?}",
				magic, path
			)));
		}
		if size == 0 || size > MAX_BLOCK_SIZE {
			return Err(Error::BadBlockFile(format!("bad record size {}", size)));
		}
		let mut bytes = vec![0u8; size];
		file.read_exact(&mut bytes)?;
		let block: Block = ser::deserialize(&bytes)?;
		if block.hash() != entry.hash {
			return Err(Error::BadBlockFile(format!(
				"block hash mismatch at {:?}:{}",
				path, entry.data_position
			)));
		}
		Ok(block)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rotation_at_size_cap() {
		let mut files = BlockFiles::new(PathBuf::from("."), 0xD9B4BEF9, 1000);
		let first = files.find_block_pos(400);
		assert_eq!(first, DiskBlockPos::new(0, 0));
		let second = files.find_block_pos(400);
		assert_eq!(second, DiskBlockPos::new(0, 400));
		// 800 + 400 >= 1000, rotate
		let third = files.find_block_pos(400);
		assert_eq!(third, DiskBlockPos::new(1, 0));
		let (dirty, last) = files.take_dirty();
		assert_eq!(last, 1);
		assert_eq!(dirty.len(), 2);
		assert_eq!(files.take_dirty().0.len(), 0);
	}

	#[test]
	fn rotation_exactly_at_boundary() {
		let mut files = BlockFiles::new(PathBuf::from("."), 0xD9B4BEF9, 1000);
		files.find_block_pos(500);
		// 500 + 500 >= 1000 rotates even though it would fit exactly
		let pos = files.find_block_pos(500);
		assert_eq!(pos, DiskBlockPos::new(1, 0));
	}
}
