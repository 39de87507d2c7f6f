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

//! Storage of core types using RocksDB: plain get/put/delete, ordered
//! iteration and atomic write batches, with the optional XOR value
//! obfuscation layer the chainstate database carries.

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;

use rand::RngCore;
use rocksdb::{BlockBasedOptions, DBCompressionType, IteratorMode, Options, WriteBatch, DB};

use halley_core::ser::{self, BinReader, BinWriter, Readable, Reader, Writeable, Writer};

/// Key under which an obfuscating database stores its XOR key. The value
/// itself is never obfuscated.
pub const OBFUSCATE_KEY_KEY: &[u8] = b"\x0E\x00obfuscate_key";

const OBFUSCATE_KEY_LEN: usize = 8;

/// Main error type for the storage crate.
#[derive(Debug, Fail)]
pub enum Error {
	/// Couldn't open or operate on the underlying database
	#[fail(display = "rocksdb error: {}", _0)]
	RocksDb(String),
	/// Couldn't decode or encode a stored value
	#[fail(display = "serialization error: {}", _0)]
	Ser(ser::Error),
}

impl From<rocksdb::Error> for Error {
	fn from(e: rocksdb::Error) -> Error {
		Error::RocksDb(e.to_string())
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Ser(e)
	}
}

/// An ordered key-value store backed by RocksDB. Values are XOR-obfuscated
/// when the database carries an obfuscation key.
pub struct Store {
	db: DB,
	obfuscate_key: Vec<u8>,
}

fn db_options(cache_bytes: usize) -> Options {
	let mut opts = Options::default();
	opts.create_if_missing(true);
	opts.set_max_open_files(64);
	opts.set_compression_type(DBCompressionType::None);
	opts.set_write_buffer_size(cache_bytes / 4);
	let mut block_opts = BlockBasedOptions::default();
	block_opts.set_lru_cache(cache_bytes / 2);
	block_opts.set_bloom_filter(10, true);
	opts.set_block_based_table_factory(&block_opts);
	opts
}

fn xor_in_place(data: &mut [u8], key: &[u8]) {
	if key.is_empty() {
		return;
	}
	for (i, byte) in data.iter_mut().enumerate() {
		*byte ^= key[i % key.len()];
	}
}

impl Store {
	/// Opens (creating if necessary) the database at `path` with the given
	/// cache budget. When `obfuscate` is set, an existing obfuscation key
	/// is honored and a fresh database writes a random one first.
	pub fn open(path: &str, cache_bytes: usize, obfuscate: bool) -> Result<Store, Error> {
		let db = DB::open(&db_options(cache_bytes), path)?;
		let mut store = Store {
			db,
			obfuscate_key: vec![],
		};
		if obfuscate {
			store.load_or_create_obfuscate_key()?;
		}
		info!(
			"store: opened {} (obfuscated: {})",
			path,
			!store.obfuscate_key.is_empty()
		);
		Ok(store)
	}

	fn load_or_create_obfuscate_key(&mut self) -> Result<(), Error> {
		// read before any key is set, so the record itself stays plain
		if let Some(raw) = self.get_raw(OBFUSCATE_KEY_KEY)? {
			let mut reader = BinReader::new(&raw);
			let key = reader.read_bytes(1024).map_err(Error::Ser)?;
			debug!("store: loaded obfuscate key {}", util::to_hex(&key));
			self.obfuscate_key = key;
			return Ok(());
		}
		let is_fresh = self.db.iterator(IteratorMode::Start).next().is_none();
		if !is_fresh {
			// existing database without a key keeps plaintext values
			return Ok(());
		}
		let mut key = vec![0u8; OBFUSCATE_KEY_LEN];
		rand::thread_rng().fill_bytes(&mut key);
		let mut value = Vec::with_capacity(OBFUSCATE_KEY_LEN + 1);
		{
			let mut writer = BinWriter::new(&mut value);
			writer.write_bytes(&key).map_err(Error::Ser)?;
		}
		self.db.put(OBFUSCATE_KEY_KEY, &value)?;
		debug!("store: created obfuscate key {}", util::to_hex(&key));
		self.obfuscate_key = key;
		Ok(())
	}

	fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		Ok(self.db.get(key)?.map(|v| v.to_vec()))
	}

	/// Fetch the deobfuscated value stored under `key`.
	pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
		let mut value = match self.get_raw(key)? {
			Some(v) => v,
			None => return Ok(None),
		};
		xor_in_place(&mut value, &self.obfuscate_key);
		Ok(Some(value))
	}

	/// Fetch and deserialize the value stored under `key`.
	pub fn get_ser<T: Readable>(&self, key: &[u8]) -> Result<Option<T>, Error> {
		match self.get(key)? {
			Some(value) => Ok(Some(ser::deserialize(&value)?)),
			None => Ok(None),
		}
	}

	/// Whether `key` exists in the store.
	pub fn exists(&self, key: &[u8]) -> Result<bool, Error> {
		Ok(self.db.get(key)?.is_some())
	}

	/// Ordered iteration over every record, values deobfuscated. The
	/// obfuscation key record itself is skipped.
	pub fn iter(&self) -> impl Iterator<Item = (Vec<u8>, Vec<u8>)> + '_ {
		self.db
			.iterator(IteratorMode::Start)
			.filter(|(key, _)| key.as_ref() != OBFUSCATE_KEY_KEY)
			.map(move |(key, value)| {
				let mut value = value.to_vec();
				xor_in_place(&mut value, &self.obfuscate_key);
				(key.to_vec(), value)
			})
	}

	/// Builds a new atomic batch to be committed against this store.
	pub fn batch(&self) -> Batch<'_> {
		Batch {
			store: self,
			batch: WriteBatch::default(),
		}
	}
}

/// An atomic set of modifications: either every put and delete lands, or
/// none of them do.
pub struct Batch<'a> {
	store: &'a Store,
	batch: WriteBatch,
}

impl<'a> Batch<'a> {
	/// Queue a put of the (obfuscated) value under `key`.
	pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
		let mut value = value.to_vec();
		xor_in_place(&mut value, &self.store.obfuscate_key);
		self.batch.put(key, &value)?;
		Ok(())
	}

	/// Queue a put of a serializable value under `key`.
	pub fn put_ser<T: Writeable>(&mut self, key: &[u8], value: &T) -> Result<(), Error> {
		let bytes = ser::ser_vec(value)?;
		self.put(key, &bytes)
	}

	/// Queue a delete of `key`.
	pub fn delete(&mut self, key: &[u8]) -> Result<(), Error> {
		self.batch.delete(key)?;
		Ok(())
	}

	/// Atomically commit the batch.
	pub fn commit(self) -> Result<(), Error> {
		self.store.db.write(self.batch)?;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	fn clean_output_dir(dir_name: &str) {
		let _ = fs::remove_dir_all(dir_name);
	}

	#[test]
	fn put_get_delete() {
		let dir = ".halley_store_test_basic";
		clean_output_dir(dir);
		{
			let store = Store::open(dir, 1 << 20, false).unwrap();
			let mut batch = store.batch();
			batch.put(b"k1", b"v1").unwrap();
			batch.put(b"k2", b"v2").unwrap();
			batch.commit().unwrap();
			assert_eq!(store.get(b"k1").unwrap(), Some(b"v1".to_vec()));
			let mut batch = store.batch();
			batch.delete(b"k1").unwrap();
			batch.commit().unwrap();
			assert_eq!(store.get(b"k1").unwrap(), None);
			assert!(store.exists(b"k2").unwrap());
		}
		clean_output_dir(dir);
	}

	#[test]
	fn obfuscation_roundtrip() {
		let dir = ".halley_store_test_obfuscate";
		clean_output_dir(dir);
		{
			let store = Store::open(dir, 1 << 20, true).unwrap();
			let mut batch = store.batch();
			batch.put(b"coin", b"plaintext value").unwrap();
			batch.commit().unwrap();
			// raw on-disk bytes differ from the logical value
			let raw = store.get_raw(b"coin").unwrap().unwrap();
			assert_ne!(raw, b"plaintext value".to_vec());
			assert_eq!(store.get(b"coin").unwrap(), Some(b"plaintext value".to_vec()));
		}
		{
			// reopen honors the persisted key
			let store = Store::open(dir, 1 << 20, true).unwrap();
			assert_eq!(store.get(b"coin").unwrap(), Some(b"plaintext value".to_vec()));
		}
		clean_output_dir(dir);
	}

	#[test]
	fn ordered_iteration_skips_key_record() {
		let dir = ".halley_store_test_iter";
		clean_output_dir(dir);
		{
			let store = Store::open(dir, 1 << 20, true).unwrap();
			let mut batch = store.batch();
			batch.put(b"b1", b"1").unwrap();
			batch.put(b"a1", b"2").unwrap();
			batch.put(b"c1", b"3").unwrap();
			batch.commit().unwrap();
			let keys: Vec<Vec<u8>> = store.iter().map(|(k, _)| k).collect();
			assert_eq!(keys, vec![b"a1".to_vec(), b"b1".to_vec(), b"c1".to_vec()]);
		}
		clean_output_dir(dir);
	}
}
