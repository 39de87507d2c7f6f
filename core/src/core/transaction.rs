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

//! Transactions: inputs, outputs, witnesses and the legacy/witness wire
//! encodings. The transaction id is always computed over the
//! witness-stripped serialization.

use crate::consensus::{MAX_SCRIPT_SIZE, MAX_TX_INPUTS_OUTPUTS, MAX_WITNESS_ITEMS};
use crate::core::hash::{Hash, HashWriter, Hashed, ZERO_HASH};
use crate::ser::{self, read_vec, write_vec, Readable, Reader, Writeable, Writer};

/// A reference to an output of a previous transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutPoint {
	/// Id of the transaction holding the output
	pub hash: Hash,
	/// Index of the output within that transaction
	pub index: u32,
}

impl OutPoint {
	/// Reference to the output `index` of transaction `hash`.
	pub fn new(hash: Hash, index: u32) -> OutPoint {
		OutPoint { hash, index }
	}

	/// The null reference carried by coinbase inputs.
	pub fn null() -> OutPoint {
		OutPoint {
			hash: ZERO_HASH,
			index: u32::max_value(),
		}
	}

	/// True for the coinbase sentinel.
	pub fn is_null(&self) -> bool {
		self.hash.is_zero()
	}
}

impl Readable for OutPoint {
	fn read(reader: &mut dyn Reader) -> Result<OutPoint, ser::Error> {
		let hash = Hash::read(reader)?;
		let index = reader.read_u32()?;
		Ok(OutPoint { hash, index })
	}
}

impl Writeable for OutPoint {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.hash.write(writer)?;
		writer.write_u32(self.index)
	}
}

/// Per-input auxiliary data carried by segwit-style transactions. Parsed
/// and re-serialized but otherwise unused by validation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Witness {
	/// The stack of witness byte strings
	pub stack: Vec<Vec<u8>>,
}

impl Witness {
	/// An absent witness.
	pub fn is_null(&self) -> bool {
		self.stack.is_empty()
	}
}

impl Readable for Witness {
	fn read(reader: &mut dyn Reader) -> Result<Witness, ser::Error> {
		let count = reader.read_compact_size()?;
		if count > MAX_WITNESS_ITEMS as u64 {
			return Err(ser::Error::CountError(count));
		}
		let mut stack = Vec::with_capacity(count as usize);
		for _ in 0..count {
			stack.push(reader.read_bytes(MAX_SCRIPT_SIZE)?);
		}
		Ok(Witness { stack })
	}
}

impl Writeable for Witness {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_compact_size(self.stack.len() as u64)?;
		for item in &self.stack {
			writer.write_bytes(item)?;
		}
		Ok(())
	}
}

/// A transaction input spending a previous output.
#[derive(Clone, Debug, PartialEq)]
pub struct TxIn {
	/// The output being spent
	pub prev_out: OutPoint,
	/// Script satisfying the spending conditions of the previous output
	pub signature_script: Vec<u8>,
	/// Witness stack, empty for pre-segwit inputs. Serialized at the
	/// transaction level, not as part of the input record.
	pub witness: Witness,
	/// Input sequence number
	pub sequence: u32,
}

impl TxIn {
	/// Input spending the given outpoint with the given script.
	pub fn new(prev_out: OutPoint, signature_script: Vec<u8>) -> TxIn {
		TxIn {
			prev_out,
			signature_script,
			witness: Witness::default(),
			sequence: u32::max_value(),
		}
	}
}

impl Readable for TxIn {
	fn read(reader: &mut dyn Reader) -> Result<TxIn, ser::Error> {
		let prev_out = OutPoint::read(reader)?;
		let signature_script = reader.read_bytes(MAX_SCRIPT_SIZE)?;
		let sequence = reader.read_u32()?;
		Ok(TxIn {
			prev_out,
			signature_script,
			witness: Witness::default(),
			sequence,
		})
	}
}

impl Writeable for TxIn {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.prev_out.write(writer)?;
		writer.write_bytes(&self.signature_script)?;
		writer.write_u32(self.sequence)
	}
}

/// A transaction output carrying a value and the script that locks it.
#[derive(Clone, Debug, PartialEq)]
pub struct TxOut {
	/// Amount in satoshis
	pub value: i64,
	/// Locking script
	pub script_pubkey: Vec<u8>,
}

impl Readable for TxOut {
	fn read(reader: &mut dyn Reader) -> Result<TxOut, ser::Error> {
		let value = reader.read_i64()?;
		let script_pubkey = reader.read_bytes(MAX_SCRIPT_SIZE)?;
		Ok(TxOut { value, script_pubkey })
	}
}

impl Writeable for TxOut {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_i64(self.value)?;
		writer.write_bytes(&self.script_pubkey)
	}
}

/// A Bitcoin transaction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
	/// Transaction version
	pub version: i32,
	/// Inputs, at least one; the single input of a coinbase carries a null
	/// previous output
	pub inputs: Vec<TxIn>,
	/// Outputs
	pub outputs: Vec<TxOut>,
	/// Earliest block height or time this transaction may be mined
	pub lock_time: u32,
}

impl Default for TxOut {
	fn default() -> TxOut {
		TxOut {
			value: 0,
			script_pubkey: vec![],
		}
	}
}

impl Transaction {
	/// A coinbase has exactly one input referencing the null outpoint.
	pub fn is_coinbase(&self) -> bool {
		self.inputs.len() == 1 && self.inputs[0].prev_out.is_null()
	}

	/// True if any input carries witness data.
	pub fn has_witness(&self) -> bool {
		self.inputs.iter().any(|input| !input.witness.is_null())
	}

	/// Transaction id, the double SHA-256 of the witness-stripped
	/// serialization.
	pub fn txid(&self) -> Hash {
		let mut hasher = HashWriter::default();
		self.write_inner(&mut hasher, false).expect("hash writer");
		hasher.finalize()
	}

	pub(crate) fn write_inner<W: Writer>(
		&self,
		writer: &mut W,
		with_witness: bool,
	) -> Result<(), ser::Error> {
		writer.write_i32(self.version)?;
		if with_witness && self.has_witness() {
			// marker and flag announcing witness data
			writer.write_u8(0x00)?;
			writer.write_u8(0x01)?;
			write_vec(writer, &self.inputs)?;
			write_vec(writer, &self.outputs)?;
			for input in &self.inputs {
				input.witness.write(writer)?;
			}
		} else {
			write_vec(writer, &self.inputs)?;
			write_vec(writer, &self.outputs)?;
		}
		writer.write_u32(self.lock_time)
	}
}

impl Hashed for Transaction {
	fn hash(&self) -> Hash {
		self.txid()
	}
}

impl Readable for Transaction {
	fn read(reader: &mut dyn Reader) -> Result<Transaction, ser::Error> {
		let version = reader.read_i32()?;
		let mut inputs: Vec<TxIn> = read_vec(reader, MAX_TX_INPUTS_OUTPUTS)?;
		let mut witness = false;
		if inputs.is_empty() {
			// an empty input vector is the witness marker; the flag byte
			// and the real inputs follow
			let flag = reader.read_u8()?;
			if flag != 0x01 {
				return Err(ser::Error::CorruptedData);
			}
			witness = true;
			inputs = read_vec(reader, MAX_TX_INPUTS_OUTPUTS)?;
		}
		let outputs = read_vec(reader, MAX_TX_INPUTS_OUTPUTS)?;
		if witness {
			for input in inputs.iter_mut() {
				input.witness = Witness::read(reader)?;
			}
		}
		let lock_time = reader.read_u32()?;
		Ok(Transaction {
			version,
			inputs,
			outputs,
			lock_time,
		})
	}
}

impl Writeable for Transaction {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		self.write_inner(writer, true)
	}
}
