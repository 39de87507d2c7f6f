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

//! Transaction signature hashing (SIGHASH_ALL) and the ECDSA-backed
//! signature checker used during input validation.

use secp256k1::{Message, PublicKey, Secp256k1, Signature, VerifyOnly};

use crate::core::hash::{Hash, HashWriter};
use crate::core::transaction::Transaction;
use crate::script::vm::SignatureChecker;
use crate::ser::Writer;

lazy_static! {
	static ref SECP: Secp256k1<VerifyOnly> = Secp256k1::verification_only();
}

/// Computes the SIGHASH_ALL style digest: the transaction with every input
/// script cleared except the checked input, which carries the subscript,
/// serialized witness-stripped with the 4-byte hash type appended, double
/// SHA-256d.
pub fn signature_hash(
	tx: &Transaction,
	input_index: usize,
	script_code: &[u8],
	hash_type: u32,
) -> Hash {
	let mut tmp = tx.clone();
	for input in tmp.inputs.iter_mut() {
		input.signature_script.clear();
	}
	tmp.inputs[input_index].signature_script = script_code.to_vec();

	let mut hasher = HashWriter::default();
	tmp.write_inner(&mut hasher, false).expect("hash writer");
	hasher.write_u32(hash_type).expect("hash writer");
	hasher.finalize()
}

/// Verifies a DER signature over a 32-byte digest against a serialized
/// public key. Historical signatures are parsed laxly and high-S values
/// normalized before verification.
pub fn verify_ecdsa(pubkey: &[u8], digest: &Hash, sig: &[u8]) -> bool {
	let pubkey = match PublicKey::from_slice(pubkey) {
		Ok(key) => key,
		Err(e) => {
			debug!("verify_ecdsa unparseable pubkey: {}", e);
			return false;
		}
	};
	let message = match Message::from_slice(digest.as_bytes()) {
		Ok(msg) => msg,
		Err(e) => {
			debug!("verify_ecdsa bad digest: {}", e);
			return false;
		}
	};
	let mut signature = match Signature::from_der_lax(sig) {
		Ok(sig) => sig,
		Err(e) => {
			debug!("verify_ecdsa unparseable signature: {}", e);
			return false;
		}
	};
	signature.normalize_s();
	SECP.verify(&message, &signature, &pubkey).is_ok()
}

/// Signature checker bound to one input of one transaction.
pub struct TransactionSignatureChecker<'a> {
	tx: &'a Transaction,
	input_index: usize,
}

impl<'a> TransactionSignatureChecker<'a> {
	/// Checker for input `input_index` of `tx`.
	pub fn new(tx: &'a Transaction, input_index: usize) -> TransactionSignatureChecker<'a> {
		TransactionSignatureChecker { tx, input_index }
	}
}

impl<'a> SignatureChecker for TransactionSignatureChecker<'a> {
	fn check_sig(&mut self, sig: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool {
		if sig.is_empty() || pubkey.is_empty() {
			return false;
		}
		let hash_type = *sig.last().expect("non-empty sig") as u32;
		if hash_type != 1 {
			// historical blocks carry a handful of zero type bytes; they
			// hash like SIGHASH_ALL with the raw byte value appended
			debug!(
				"check_sig unusual hash type {} for {}:{}",
				hash_type,
				self.tx.txid(),
				self.input_index
			);
		}
		let stripped = &sig[..sig.len() - 1];
		let digest = signature_hash(self.tx, self.input_index, script_code, hash_type);
		verify_ecdsa(pubkey, &digest, stripped)
	}
}
