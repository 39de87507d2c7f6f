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

//! The UTXO view: an in-memory overlay of added and removed coins layered
//! over the persistent chainstate database, flushed in batches together
//! with the best-block pointer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use halley_store::Store;

use crate::core::core::hash::{Hash, ZERO_HASH};
use crate::core::core::transaction::{OutPoint, Transaction, TxOut};
use crate::core::ser::{self, Readable, Reader, Writeable, Writer};
use crate::error::Error;

/// Key tag of a coin record: 'C' followed by txid and output index.
pub const DB_COIN: u8 = b'C';
/// Key of the best-block hash record.
pub const DB_BEST_BLOCK: &[u8] = b"B";

/// Milliseconds between coin flushes.
const FLUSH_COOLDOWN_MS: i64 = 5_000;

/// A single unspent transaction output, keyed in the view by its outpoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Coin {
	/// The output itself
	pub output: TxOut,
	/// Height of the block that created the coin
	pub height: i32,
	/// Whether it was created by a coinbase
	pub is_coinbase: bool,
}

impl Coin {
	/// A coin from the given output. A value of zero marks the "no coin"
	/// sentinel.
	pub fn new(output: TxOut, height: i32, is_coinbase: bool) -> Coin {
		Coin {
			output,
			height,
			is_coinbase,
		}
	}

	/// Whether this is an actual coin rather than the absent sentinel.
	pub fn is_spendable(&self) -> bool {
		self.output.value > 0
	}
}

impl Writeable for Coin {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.output.write(writer)?;
		let code = (self.height as u32) << 1 | self.is_coinbase as u32;
		writer.write_u32(code)
	}
}

impl Readable for Coin {
	fn read(reader: &mut dyn Reader) -> Result<Coin, ser::Error> {
		let output = TxOut::read(reader)?;
		let code = reader.read_u32()?;
		Ok(Coin {
			output,
			height: (code >> 1) as i32,
			is_coinbase: code & 1 != 0,
		})
	}
}

/// An overlay coin plus the flag telling the flush whether the entry was
/// created in this window (dirty) or merely cached from the database.
#[derive(Clone, Debug)]
pub struct CoinEntry {
	/// The coin, possibly the null sentinel
	pub coin: Coin,
	/// Whether the entry has to be written on flush
	pub dirty: bool,
}

/// Key of a coin record.
pub fn coin_key(out: &OutPoint) -> Vec<u8> {
	let mut key = Vec::with_capacity(37);
	key.push(DB_COIN);
	key.extend_from_slice(out.hash.as_bytes());
	key.extend_from_slice(&out.index.to_le_bytes());
	key
}

/// The UTXO set as seen through the in-memory overlay. Reads fall through
/// `added` and `removed` to the store; writes accumulate until `flush`.
pub struct CoinView {
	db: Arc<Store>,
	best_block_hash: Hash,
	best_block_height: i32,
	added: HashMap<OutPoint, CoinEntry>,
	removed: HashSet<OutPoint>,
	last_flush: i64,
}

impl CoinView {
	/// View over the given chainstate store.
	pub fn new(db: Arc<Store>) -> CoinView {
		CoinView {
			db,
			best_block_hash: ZERO_HASH,
			best_block_height: 0,
			added: HashMap::new(),
			removed: HashSet::new(),
			last_flush: 0,
		}
	}

	/// Load the persisted best-block pointer.
	pub fn load(&mut self) -> Result<(), Error> {
		if let Some(hash) = self.db.get_ser::<Hash>(DB_BEST_BLOCK)? {
			self.best_block_hash = hash;
			info!("coins: loaded best block {}", self.best_block_hash);
		}
		Ok(())
	}

	/// Hash of the block the persisted coin set corresponds to, combined
	/// with the pending overlay.
	pub fn best_block_hash(&self) -> &Hash {
		&self.best_block_hash
	}

	/// Height recorded with the best block pointer.
	pub fn best_block_height(&self) -> i32 {
		self.best_block_height
	}

	/// Point the view at a new best block. Persisted with the next flush.
	pub fn set_best_block(&mut self, hash: Hash, height: i32) {
		self.best_block_hash = hash;
		self.best_block_height = height;
	}

	/// The coin at `out`, consulting the overlay first and the store
	/// second. A miss produces (and caches) the null-coin sentinel; a
	/// removed outpoint yields None.
	pub fn fetch_coin(&mut self, out: &OutPoint) -> Result<Option<&Coin>, Error> {
		if self.removed.contains(out) {
			return Ok(None);
		}
		if !self.added.contains_key(out) {
			let coin = match self.db.get_ser::<Coin>(&coin_key(out))? {
				Some(coin) => {
					debug_assert!(coin.is_spendable());
					CoinEntry { coin, dirty: false }
				}
				None => {
					trace!("coins: no coin for {}:{}", out.hash, out.index);
					CoinEntry {
						coin: Coin::default(),
						dirty: false,
					}
				}
			};
			self.added.insert(*out, coin);
		}
		Ok(self.added.get(out).map(|entry| &entry.coin))
	}

	/// Whether a live coin exists at `out`.
	pub fn has_coin(&mut self, out: &OutPoint) -> Result<bool, Error> {
		Ok(match self.fetch_coin(out)? {
			Some(coin) => coin.is_spendable(),
			None => false,
		})
	}

	fn add_coin(&mut self, out: OutPoint, coin: Coin) {
		// keep added and removed disjoint
		self.removed.remove(&out);
		self.added.insert(out, CoinEntry { coin, dirty: true });
	}

	fn remove_coin(&mut self, out: &OutPoint) {
		self.added.remove(out);
		self.removed.insert(*out);
	}

	/// Apply one transaction at the given height: spent coins leave the
	/// view, created outputs enter it dirty. Inputs were validated before
	/// this point.
	pub fn apply_transaction(&mut self, tx: &Transaction, height: i32) -> Result<(), Error> {
		let txid = tx.txid();
		trace!(
			"coins: apply {} ins={} outs={} coinbase={}",
			txid,
			tx.inputs.len(),
			tx.outputs.len(),
			tx.is_coinbase()
		);
		if !tx.is_coinbase() {
			for input in &tx.inputs {
				match self.fetch_coin(&input.prev_out)? {
					Some(coin) if coin.is_spendable() => {}
					_ => {
						return Err(crate::error::missing_coin(&input.prev_out));
					}
				}
				self.remove_coin(&input.prev_out);
			}
		}
		let is_coinbase = tx.is_coinbase();
		for (i, output) in tx.outputs.iter().enumerate() {
			self.add_coin(
				OutPoint::new(txid, i as u32),
				Coin::new(output.clone(), height, is_coinbase),
			);
		}
		Ok(())
	}

	/// Flush when the cooldown has passed.
	pub fn maybe_flush(&mut self, now: i64) -> Result<(), Error> {
		if now - self.last_flush < FLUSH_COOLDOWN_MS {
			return Ok(());
		}
		self.flush(now)
	}

	/// Write dirty added coins, removals and the best-block pointer to the
	/// store in one atomic batch, then clear the overlay.
	pub fn flush(&mut self, now: i64) -> Result<(), Error> {
		self.last_flush = now;
		let mut batch = self.db.batch();
		let mut written = 0usize;
		for (out, entry) in &self.added {
			if entry.dirty && entry.coin.is_spendable() {
				batch.put_ser(&coin_key(out), &entry.coin)?;
				written += 1;
			}
		}
		for out in &self.removed {
			batch.delete(&coin_key(out))?;
		}
		batch.put_ser(DB_BEST_BLOCK, &self.best_block_hash)?;
		batch.commit()?;
		debug!(
			"coins: flushed {} added, {} removed, best {} at {}",
			written,
			self.removed.len(),
			self.best_block_hash,
			self.best_block_height
		);
		self.added.clear();
		self.removed.clear();
		Ok(())
	}

	/// Number of overlay entries, used by tests and the status log line.
	pub fn overlay_len(&self) -> (usize, usize) {
		(self.added.len(), self.removed.len())
	}
}
