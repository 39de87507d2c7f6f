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

//! Error types for the chain crate.

use crate::core::core::hash::Hash;
use crate::core::core::transaction::OutPoint;
use crate::core::script::ScriptError;
use crate::core::ser;

/// Everything that can fail validating, storing or loading blocks.
#[derive(Debug, Fail)]
pub enum Error {
	/// The header's hash does not satisfy its claimed target, or the
	/// target itself is unusable
	#[fail(display = "invalid proof of work")]
	InvalidPow,
	/// A block without transactions
	#[fail(display = "block has no transactions")]
	EmptyBlock,
	/// The first transaction must be the only coinbase
	#[fail(display = "bad coinbase placement")]
	BadCoinbase,
	/// Two transactions in one block share a txid
	#[fail(display = "duplicate txid within block")]
	DuplicateTxId,
	/// The transaction merkle root does not match the header
	#[fail(display = "merkle root mismatch")]
	BadMerkleRoot,
	/// An output would overwrite a live coin without a historical exemption
	#[fail(display = "duplicate transaction {}", _0)]
	DuplicateTransaction(Hash),
	/// An input spends a coin that does not exist
	#[fail(display = "missing coin {}:{}", _0, _1)]
	MissingCoin(Hash, u32),
	/// An input script failed evaluation
	#[fail(display = "script error: {}", _0)]
	Script(ScriptError),
	/// The block referenced by an index record could not be read back
	#[fail(display = "bad block file record: {}", _0)]
	BadBlockFile(String),
	/// A header was rejected so the block cannot be represented
	#[fail(display = "header rejected")]
	HeaderRejected,
	/// Wrapped storage error
	#[fail(display = "store error: {}", _0)]
	Store(halley_store::Error),
	/// Wrapped serialization error
	#[fail(display = "serialization error: {}", _0)]
	Ser(ser::Error),
	/// Wrapped io error
	#[fail(display = "io error: {}", _0)]
	Io(String),
}

impl Error {
	/// Validation failures mark the block failed; storage and io failures
	/// do not.
	pub fn is_validation_error(&self) -> bool {
		match self {
			Error::InvalidPow
			| Error::EmptyBlock
			| Error::BadCoinbase
			| Error::DuplicateTxId
			| Error::BadMerkleRoot
			| Error::DuplicateTransaction(_)
			| Error::MissingCoin(_, _)
			| Error::Script(_) => true,
			_ => false,
		}
	}
}

impl From<halley_store::Error> for Error {
	fn from(e: halley_store::Error) -> Error {
		Error::Store(e)
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Ser(e)
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Io(format!("{}", e))
	}
}

impl From<ScriptError> for Error {
	fn from(e: ScriptError) -> Error {
		Error::Script(e)
	}
}

/// The outpoint-flavoured constructor used all over input validation.
pub fn missing_coin(out: &OutPoint) -> Error {
	Error::MissingCoin(out.hash, out.index)
}
