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

//! The block-index database: serialized index entries, block-file infos
//! and the last-block-file pointer sharing one keyspace under distinct
//! tags.

use std::sync::Arc;

use halley_store::{Batch, Store};

use crate::core::core::hash::{Hash, Hashed};
use crate::core::ser;
use crate::error::Error;
use crate::types::{BlockFileInfo, BlockIndexEntry};

/// Key tag of a serialized index entry: 'b' followed by the block hash.
pub const DB_BLOCK_INDEX: u8 = b'b';
/// Key tag of a block-file info: 'f' followed by the file index.
pub const DB_BLOCK_FILES: u8 = b'f';
/// Key of the last-block-file pointer.
pub const DB_LAST_BLOCK: &[u8] = b"l";

/// Everything the index database yields at load time.
#[derive(Default)]
pub struct LoadedIndex {
	/// Index entries, unlinked (prev and work recomputed by the cache)
	pub blocks: Vec<BlockIndexEntry>,
	/// Per-file accounting records
	pub files: Vec<BlockFileInfo>,
	/// The file new blocks were being appended to
	pub last_block_file: i32,
}

/// The records of one index flush, prepared on the main loop and executed
/// on the disk worker.
pub struct IndexFlushData {
	/// Serialized dirty index entries
	pub blocks: Vec<(Hash, Vec<u8>)>,
	/// Touched block-file infos
	pub files: Vec<BlockFileInfo>,
	/// Current last-block-file pointer
	pub last_block_file: i32,
}

fn block_index_key(hash: &Hash) -> Vec<u8> {
	let mut key = Vec::with_capacity(33);
	key.push(DB_BLOCK_INDEX);
	key.extend_from_slice(hash.as_bytes());
	key
}

fn block_file_key(file_index: i32) -> Vec<u8> {
	let mut key = Vec::with_capacity(5);
	key.push(DB_BLOCK_FILES);
	key.extend_from_slice(&(file_index as u32).to_le_bytes());
	key
}

/// Wrapper around the `blocks/index` store.
pub struct ChainStore {
	db: Arc<Store>,
}

impl ChainStore {
	/// Chain store over an opened database.
	pub fn new(db: Arc<Store>) -> ChainStore {
		ChainStore { db }
	}

	/// Shared handle to the underlying store, for the disk worker.
	pub fn db(&self) -> Arc<Store> {
		self.db.clone()
	}

	/// Read every record in the database. Index entries whose stored
	/// header does not hash back to the record key are dropped with a
	/// warning rather than poisoning the tree.
	pub fn load_all(&self) -> Result<LoadedIndex, Error> {
		let mut data = LoadedIndex::default();
		if let Some(last) = self.db.get(DB_LAST_BLOCK)? {
			if last.len() == 4 {
				data.last_block_file = i32::from_le_bytes([last[0], last[1], last[2], last[3]]);
			}
		}
		let mut count = 0usize;
		for (key, value) in self.db.iter() {
			match key.first() {
				Some(&DB_BLOCK_INDEX) if key.len() == 33 => {
					let key_hash = Hash::from_vec(&key[1..]).map_err(Error::Ser)?;
					let entry: BlockIndexEntry = match ser::deserialize(&value) {
						Ok(entry) => entry,
						Err(e) => {
							warn!("chain store: undecodable index record {}: {}", key_hash, e);
							continue;
						}
					};
					if entry.header.hash() != key_hash {
						warn!("chain store: index record hash mismatch {}", key_hash);
						continue;
					}
					data.blocks.push(entry);
					count += 1;
				}
				Some(&DB_BLOCK_FILES) if key.len() == 5 => {
					let index =
						u32::from_le_bytes([key[1], key[2], key[3], key[4]]) as i32;
					match ser::deserialize::<BlockFileInfo>(&value) {
						Ok(mut info) => {
							info.file_index = index;
							data.files.push(info);
						}
						Err(e) => {
							warn!("chain store: undecodable file info {}: {}", index, e);
						}
					}
				}
				_ if key.as_slice() == DB_LAST_BLOCK => {}
				_ => {
					debug!("chain store: ignoring key {}", util::to_hex(&key));
				}
			}
		}
		debug!(
			"chain store: loaded {} index records, {} file infos, last file {}",
			count,
			data.files.len(),
			data.last_block_file
		);
		Ok(data)
	}

	/// Write one flush worth of records in a single atomic batch.
	pub fn write_flush(&self, data: &IndexFlushData) -> Result<(), Error> {
		let mut batch: Batch<'_> = self.db.batch();
		if data.last_block_file > 0 {
			batch.put(DB_LAST_BLOCK, &(data.last_block_file as u32).to_le_bytes())?;
		}
		for (hash, bytes) in &data.blocks {
			batch.put(&block_index_key(hash), bytes)?;
		}
		for info in &data.files {
			batch.put_ser(&block_file_key(info.file_index), info)?;
		}
		batch.commit()?;
		Ok(())
	}
}
