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

//! Block validation: header proof of work, block structure, the
//! duplicate-coin rule and per-input script verification against the UTXO
//! view.

use std::collections::HashSet;

use crate::coins::CoinView;
use crate::core::consensus::is_duplicate_coinbase_exempt;
use crate::core::core::block::{Block, BlockHeader};
use crate::core::core::hash::Hash;
use crate::core::core::transaction::TxOut;
use crate::core::core::OutPoint;
use crate::core::params::ChainParams;
use crate::core::pow;
use crate::core::script::{ScriptError, TransactionSignatureChecker, Vm};
use crate::error::{missing_coin, Error};

/// Header-level validation: usable target at or below the chain limit,
/// and a hash that satisfies it.
pub fn validate_header(header: &BlockHeader, params: &ChainParams) -> Result<(), Error> {
	if !pow::check_proof_of_work(header, params) {
		return Err(Error::InvalidPow);
	}
	Ok(())
}

/// Block-level structure checks: a coinbase first and nowhere else, no
/// duplicate txids, and a transaction merkle root matching the header.
pub fn validate_block(block: &Block, txids: &[Hash]) -> Result<(), Error> {
	if block.transactions.is_empty() {
		return Err(Error::EmptyBlock);
	}
	if !block.transactions[0].is_coinbase() {
		return Err(Error::BadCoinbase);
	}
	if block.transactions.iter().skip(1).any(|tx| tx.is_coinbase()) {
		return Err(Error::BadCoinbase);
	}
	let mut seen = HashSet::with_capacity(txids.len());
	for txid in txids {
		if !seen.insert(*txid) {
			return Err(Error::DuplicateTxId);
		}
	}
	let mut mutated = false;
	let root = crate::core::core::merkle::compute_merkle_root(txids, &mut mutated);
	if mutated || root != block.header.merkle_root {
		return Err(Error::BadMerkleRoot);
	}
	Ok(())
}

/// The duplicate-transaction rule: no output of this block may overwrite a
/// live coin, except in the two historical blocks that did exactly that.
fn check_duplicate_coins(
	block: &Block,
	txids: &[Hash],
	height: i32,
	block_hash: &Hash,
	view: &mut CoinView,
) -> Result<(), Error> {
	if is_duplicate_coinbase_exempt(height, block_hash) {
		debug!("validate: duplicate-coin exemption for {} at {}", block_hash, height);
		return Ok(());
	}
	for (tx, txid) in block.transactions.iter().zip(txids) {
		for i in 0..tx.outputs.len() as u32 {
			if view.has_coin(&OutPoint::new(*txid, i))? {
				error!(
					"validate: duplicate transaction {} output {} at height {}",
					txid, i, height
				);
				return Err(Error::DuplicateTransaction(*txid));
			}
		}
	}
	Ok(())
}

/// Find the output an input spends: the UTXO view first, then earlier
/// transactions of the same block.
fn find_spent_output(
	block: &Block,
	txids: &[Hash],
	tx_index: usize,
	prev_out: &OutPoint,
	view: &mut CoinView,
) -> Result<TxOut, Error> {
	if let Some(coin) = view.fetch_coin(prev_out)? {
		if coin.is_spendable() {
			return Ok(coin.output.clone());
		}
	}
	for i in 0..tx_index {
		if txids[i] == prev_out.hash {
			return block.transactions[i]
				.outputs
				.get(prev_out.index as usize)
				.cloned()
				.ok_or_else(|| missing_coin(prev_out));
		}
	}
	warn!(
		"validate: no spendable output for {}:{} in tx {}",
		prev_out.hash, prev_out.index, txids[tx_index]
	);
	Err(missing_coin(prev_out))
}

/// Run the two scripts of one input on a shared stack and require a true
/// final value.
fn verify_input(
	block: &Block,
	txids: &[Hash],
	tx_index: usize,
	input_index: usize,
	view: &mut CoinView,
) -> Result<(), Error> {
	let tx = &block.transactions[tx_index];
	let input = &tx.inputs[input_index];
	let spent = find_spent_output(block, txids, tx_index, &input.prev_out, view)?;

	let mut checker = TransactionSignatureChecker::new(tx, input_index);
	let mut vm = Vm::new(&mut checker);
	vm.eval(&input.signature_script).map_err(|e| {
		warn!(
			"validate: signature script failed for {} input {}: {}",
			txids[tx_index], input_index, e
		);
		Error::Script(e)
	})?;
	vm.eval(&spent.script_pubkey).map_err(|e| {
		warn!(
			"validate: pubkey script failed for {} input {}: {}",
			txids[tx_index], input_index, e
		);
		Error::Script(e)
	})?;
	match vm.bool_at(0) {
		Some(true) => Ok(()),
		_ => {
			warn!(
				"validate: script evaluated false for {} input {} at prevout {}:{}",
				txids[tx_index], input_index, input.prev_out.hash, input.prev_out.index
			);
			Err(Error::Script(ScriptError::EvalFalse))
		}
	}
}

/// Full transaction verification for a block: the duplicate-coin rule,
/// then every input of every non-coinbase transaction in block order.
pub fn verify_block_transactions(
	block: &Block,
	height: i32,
	block_hash: &Hash,
	view: &mut CoinView,
) -> Result<(), Error> {
	let txids: Vec<Hash> = block.transactions.iter().map(|tx| tx.txid()).collect();
	validate_block(block, &txids)?;
	check_duplicate_coins(block, &txids, height, block_hash, view)?;
	for (tx_index, tx) in block.transactions.iter().enumerate() {
		if tx.is_coinbase() {
			continue;
		}
		for input_index in 0..tx.inputs.len() {
			verify_input(block, &txids, tx_index, input_index, view)?;
		}
	}
	Ok(())
}
