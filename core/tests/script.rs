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

//! Script interpreter integration tests against real ECDSA signatures:
//! pay-to-pubkey, pay-to-pubkey-hash and bare multisig spends.

use rand::thread_rng;
use secp256k1::{Message, Secp256k1, SecretKey};

use halley_core::core::hash::{hash_bytes, Hash};
use halley_core::core::transaction::{OutPoint, Transaction, TxIn, TxOut};
use halley_core::script::builder::Builder;
use halley_core::script::opcodes::*;
use halley_core::script::sighash::signature_hash;
use halley_core::script::{ScriptError, TransactionSignatureChecker, Vm};

use ripemd160::{Digest, Ripemd160};
use sha2::Sha256;

fn hash160(data: &[u8]) -> Vec<u8> {
	Ripemd160::digest(&Sha256::digest(data)).to_vec()
}

struct Keypair {
	secret: SecretKey,
	public: Vec<u8>,
}

fn keypair(secp: &Secp256k1<secp256k1::All>) -> Keypair {
	let (secret, public) = secp.generate_keypair(&mut thread_rng());
	Keypair {
		secret,
		public: public.serialize().to_vec(),
	}
}

/// A transaction spending output 0 of `funding_txid`.
fn spending_tx(funding_txid: Hash) -> Transaction {
	Transaction {
		version: 1,
		inputs: vec![TxIn::new(OutPoint::new(funding_txid, 0), vec![])],
		outputs: vec![TxOut {
			value: 1,
			script_pubkey: Builder::new().push_opcode(OP_1).into_script(),
		}],
		lock_time: 0,
	}
}

/// Sign input 0 of `tx` against `script_code` with SIGHASH_ALL.
fn sign_input(
	secp: &Secp256k1<secp256k1::All>,
	tx: &Transaction,
	script_code: &[u8],
	secret: &SecretKey,
) -> Vec<u8> {
	let digest = signature_hash(tx, 0, script_code, 1);
	let message = Message::from_slice(digest.as_bytes()).unwrap();
	let mut sig = secp.sign(&message, secret).serialize_der().to_vec();
	sig.push(1); // hash type byte
	sig
}

fn run_input(tx: &Transaction, script_pubkey: &[u8]) -> Result<bool, ScriptError> {
	let mut checker = TransactionSignatureChecker::new(tx, 0);
	let mut vm = Vm::new(&mut checker);
	vm.eval(&tx.inputs[0].signature_script)?;
	vm.eval(script_pubkey)?;
	Ok(vm.bool_at(0).unwrap_or(false))
}

#[test]
fn p2pk_spend() {
	let secp = Secp256k1::new();
	let key = keypair(&secp);
	let script_pubkey = Builder::new()
		.push_data(&key.public)
		.push_opcode(OP_CHECKSIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	let sig = sign_input(&secp, &tx, &script_pubkey, &key.secret);
	tx.inputs[0].signature_script = Builder::new().push_data(&sig).into_script();

	assert_eq!(run_input(&tx, &script_pubkey), Ok(true));
}

#[test]
fn p2pk_corrupted_signature_fails() {
	let secp = Secp256k1::new();
	let key = keypair(&secp);
	let script_pubkey = Builder::new()
		.push_data(&key.public)
		.push_opcode(OP_CHECKSIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	let mut sig = sign_input(&secp, &tx, &script_pubkey, &key.secret);
	// flip one bit in the middle of the DER body
	sig[10] ^= 0x01;
	tx.inputs[0].signature_script = Builder::new().push_data(&sig).into_script();

	// the evaluation itself succeeds; the result on the stack is false
	assert_eq!(run_input(&tx, &script_pubkey), Ok(false));
}

#[test]
fn p2pk_wrong_key_fails() {
	let secp = Secp256k1::new();
	let key = keypair(&secp);
	let other = keypair(&secp);
	let script_pubkey = Builder::new()
		.push_data(&other.public)
		.push_opcode(OP_CHECKSIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	let sig = sign_input(&secp, &tx, &script_pubkey, &key.secret);
	tx.inputs[0].signature_script = Builder::new().push_data(&sig).into_script();

	assert_eq!(run_input(&tx, &script_pubkey), Ok(false));
}

#[test]
fn p2pkh_spend() {
	let secp = Secp256k1::new();
	let key = keypair(&secp);
	let script_pubkey = Builder::new()
		.push_opcode(OP_DUP)
		.push_opcode(OP_HASH160)
		.push_data(&hash160(&key.public))
		.push_opcode(OP_EQUALVERIFY)
		.push_opcode(OP_CHECKSIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	let sig = sign_input(&secp, &tx, &script_pubkey, &key.secret);
	tx.inputs[0].signature_script = Builder::new()
		.push_data(&sig)
		.push_data(&key.public)
		.into_script();

	assert_eq!(run_input(&tx, &script_pubkey), Ok(true));
}

#[test]
fn p2pkh_wrong_pubkey_hash_fails() {
	let secp = Secp256k1::new();
	let key = keypair(&secp);
	let other = keypair(&secp);
	let script_pubkey = Builder::new()
		.push_opcode(OP_DUP)
		.push_opcode(OP_HASH160)
		.push_data(&hash160(&other.public))
		.push_opcode(OP_EQUALVERIFY)
		.push_opcode(OP_CHECKSIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	let sig = sign_input(&secp, &tx, &script_pubkey, &key.secret);
	tx.inputs[0].signature_script = Builder::new()
		.push_data(&sig)
		.push_data(&key.public)
		.into_script();

	assert_eq!(run_input(&tx, &script_pubkey), Err(ScriptError::EqualVerify));
}

#[test]
fn two_of_three_multisig() {
	let secp = Secp256k1::new();
	let keys: Vec<Keypair> = (0..3).map(|_| keypair(&secp)).collect();
	let script_pubkey = Builder::new()
		.push_int(2)
		.push_data(&keys[0].public)
		.push_data(&keys[1].public)
		.push_data(&keys[2].public)
		.push_int(3)
		.push_opcode(OP_CHECKMULTISIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	let sig0 = sign_input(&secp, &tx, &script_pubkey, &keys[0].secret);
	let sig2 = sign_input(&secp, &tx, &script_pubkey, &keys[2].secret);
	// the dummy element first, signatures in key order
	tx.inputs[0].signature_script = Builder::new()
		.push_int(0)
		.push_data(&sig0)
		.push_data(&sig2)
		.into_script();

	assert_eq!(run_input(&tx, &script_pubkey), Ok(true));
}

#[test]
fn multisig_out_of_order_signatures_fail() {
	let secp = Secp256k1::new();
	let keys: Vec<Keypair> = (0..3).map(|_| keypair(&secp)).collect();
	let script_pubkey = Builder::new()
		.push_int(2)
		.push_data(&keys[0].public)
		.push_data(&keys[1].public)
		.push_data(&keys[2].public)
		.push_int(3)
		.push_opcode(OP_CHECKMULTISIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	let sig0 = sign_input(&secp, &tx, &script_pubkey, &keys[0].secret);
	let sig2 = sign_input(&secp, &tx, &script_pubkey, &keys[2].secret);
	// reversed relative to the key list
	tx.inputs[0].signature_script = Builder::new()
		.push_int(0)
		.push_data(&sig2)
		.push_data(&sig0)
		.into_script();

	assert_eq!(run_input(&tx, &script_pubkey), Ok(false));
}

#[test]
fn sighash_binds_spent_script() {
	let secp = Secp256k1::new();
	let key = keypair(&secp);
	let script_pubkey = Builder::new()
		.push_data(&key.public)
		.push_opcode(OP_CHECKSIG)
		.into_script();
	let other_script = Builder::new()
		.push_data(&key.public)
		.push_opcode(OP_NOP)
		.push_opcode(OP_CHECKSIG)
		.into_script();

	let mut tx = spending_tx(hash_bytes(b"funding"));
	// signed against a different subscript than the one evaluated
	let sig = sign_input(&secp, &tx, &other_script, &key.secret);
	tx.inputs[0].signature_script = Builder::new().push_data(&sig).into_script();

	assert_eq!(run_input(&tx, &script_pubkey), Ok(false));
}
