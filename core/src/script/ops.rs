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

//! Opcode handlers and the fixed 256-entry dispatch table. Each handler
//! operates on the VM stacks and records failures into the environment.

use ripemd160::Ripemd160;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::script::error::ScriptError;
use crate::script::opcodes::*;
use crate::script::vm::Vm;
use crate::script::{MAX_PUBKEYS_PER_MULTISIG, MAX_SCRIPT_ELEMENT_SIZE};
use crate::ser::Reader;
use crate::ser::BinReader;

/// An opcode handler. The reader is positioned right after the opcode byte
/// so push handlers can consume their immediate data.
pub type OpHandler = fn(&mut Vm<'_>, u8, &mut BinReader<'_>);

lazy_static! {
	/// Immutable dispatch table, one handler per opcode byte. Built once at
	/// startup and only ever read.
	static ref OP_TABLE: [OpHandler; 256] = build_table();
}

/// Run the handler for `opcode`.
pub fn dispatch(vm: &mut Vm<'_>, opcode: u8, reader: &mut BinReader<'_>) {
	OP_TABLE[opcode as usize](vm, opcode, reader);
}

fn build_table() -> [OpHandler; 256] {
	let mut table: [OpHandler; 256] = [op_bad; 256];

	for op in OP_0..OP_PUSHDATA1 {
		table[op as usize] = op_push_direct;
	}
	table[OP_PUSHDATA1 as usize] = op_pushdata;
	table[OP_PUSHDATA2 as usize] = op_pushdata;
	table[OP_PUSHDATA4 as usize] = op_pushdata;
	table[OP_1NEGATE as usize] = op_constant;
	for op in OP_1..=OP_16 {
		table[op as usize] = op_constant;
	}

	table[OP_NOP as usize] = op_nop;
	table[OP_VERIFY as usize] = op_verify;
	table[OP_RETURN as usize] = op_return;

	table[OP_TOALTSTACK as usize] = op_toaltstack;
	table[OP_FROMALTSTACK as usize] = op_fromaltstack;
	table[OP_DROP as usize] = op_drop;
	table[OP_2DROP as usize] = op_drop2;
	table[OP_DUP as usize] = op_dup;
	table[OP_2DUP as usize] = op_dup2;
	table[OP_3DUP as usize] = op_dup3;
	table[OP_DEPTH as usize] = op_depth;
	table[OP_SIZE as usize] = op_size;

	table[OP_EQUAL as usize] = op_equal;
	table[OP_EQUALVERIFY as usize] = op_equal;

	table[OP_1ADD as usize] = op_unary_num;
	table[OP_1SUB as usize] = op_unary_num;
	table[OP_2MUL as usize] = op_unary_num;
	table[OP_2DIV as usize] = op_unary_num;
	table[OP_NEGATE as usize] = op_unary_num;
	table[OP_ABS as usize] = op_unary_num;
	table[OP_NOT as usize] = op_unary_num;
	table[OP_0NOTEQUAL as usize] = op_unary_num;

	for op in OP_ADD..=OP_MAX {
		table[op as usize] = op_binary_num;
	}
	table[OP_WITHIN as usize] = op_within;

	for op in OP_RIPEMD160..=OP_HASH256 {
		table[op as usize] = op_hash;
	}
	table[OP_CHECKSIG as usize] = op_checksig;
	table[OP_CHECKSIGVERIFY as usize] = op_checksig;
	table[OP_CHECKMULTISIG as usize] = op_checkmultisig;
	table[OP_CHECKMULTISIGVERIFY as usize] = op_checkmultisig;

	// splice and bitwise families were switched off protocol-wide
	for op in &[OP_CAT, OP_SUBSTR, OP_LEFT, OP_RIGHT, OP_INVERT, OP_AND, OP_OR, OP_XOR] {
		table[*op as usize] = op_disabled;
	}

	// upgradable no-ops, locktime semantics predate their soft forks
	for op in OP_NOP1..=OP_NOP10 {
		table[op as usize] = op_nop;
	}

	table
}

fn op_bad(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	trace!("script: unimplemented opcode 0x{:02x}", opcode);
	vm.set_err(ScriptError::BadOpcode);
}

fn op_disabled(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	trace!("script: disabled opcode 0x{:02x}", opcode);
	vm.set_err(ScriptError::DisabledOpcode);
}

fn op_nop(_vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {}

fn op_push_direct(vm: &mut Vm<'_>, opcode: u8, reader: &mut BinReader<'_>) {
	match reader.read_fixed_bytes(opcode as usize) {
		Ok(data) => vm.stack.push(data),
		Err(_) => vm.set_err(ScriptError::BadOpcode),
	}
}

fn op_pushdata(vm: &mut Vm<'_>, opcode: u8, reader: &mut BinReader<'_>) {
	let len = match opcode {
		OP_PUSHDATA1 => reader.read_u8().map(|n| n as usize),
		OP_PUSHDATA2 => reader.read_u16().map(|n| n as usize),
		_ => reader.read_u32().map(|n| n as usize),
	};
	let len = match len {
		Ok(len) => len,
		Err(_) => return vm.set_err(ScriptError::BadOpcode),
	};
	if len > MAX_SCRIPT_ELEMENT_SIZE {
		return vm.set_err(ScriptError::PushSize);
	}
	match reader.read_fixed_bytes(len) {
		Ok(data) => vm.stack.push(data),
		Err(_) => vm.set_err(ScriptError::BadOpcode),
	}
}

fn op_constant(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	let val = opcode as i64 - (OP_1 as i64 - 1);
	vm.stack.push_num(val);
}

fn op_verify(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	match vm.bool_at(0) {
		Some(true) => {
			vm.stack.pop();
		}
		Some(false) => vm.set_err(ScriptError::Verify),
		None => vm.set_err(ScriptError::InvalidStackOperation),
	}
}

fn op_return(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	vm.set_err(ScriptError::OpReturn);
}

fn op_toaltstack(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	match vm.stack.pop() {
		Some(item) => vm.alt.push(item),
		None => vm.set_err(ScriptError::InvalidStackOperation),
	}
}

fn op_fromaltstack(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	match vm.alt.pop() {
		Some(item) => vm.stack.push(item),
		None => vm.set_err(ScriptError::InvalidAltstackOperation),
	}
}

fn op_drop(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	if vm.stack.pop().is_none() {
		vm.set_err(ScriptError::InvalidStackOperation);
	}
}

fn op_drop2(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	if vm.stack.len() < 2 {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	vm.stack.pop();
	vm.stack.pop();
}

fn dup_top(vm: &mut Vm<'_>, count: usize) {
	if vm.stack.len() < count {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	for _ in 0..count {
		let item = vm.stack.peek(count - 1).expect("bounds checked").clone();
		vm.stack.push(item);
	}
}

fn op_dup(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	dup_top(vm, 1);
}

fn op_dup2(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	dup_top(vm, 2);
}

fn op_dup3(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	dup_top(vm, 3);
}

fn op_depth(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	let depth = vm.stack.len() as i64;
	vm.stack.push_num(depth);
}

fn op_size(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	match vm.stack.peek(0) {
		Some(top) => {
			let len = top.len() as i64;
			vm.stack.push_num(len);
		}
		None => vm.set_err(ScriptError::InvalidStackOperation),
	}
}

fn op_equal(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	if vm.stack.len() < 2 {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	let a = vm.stack.pop().expect("bounds checked");
	let b = vm.stack.pop().expect("bounds checked");
	let equal = a == b;
	vm.stack.push_bool(equal);
	if opcode == OP_EQUALVERIFY {
		if equal {
			vm.stack.pop();
		} else {
			vm.set_err(ScriptError::EqualVerify);
		}
	}
}

fn op_unary_num(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	let val = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	let result = match opcode {
		OP_1ADD => val + 1,
		OP_1SUB => val - 1,
		OP_2MUL => val * 2,
		OP_2DIV => val / 2,
		OP_NEGATE => -val,
		OP_ABS => val.abs(),
		OP_NOT => (val == 0) as i64,
		OP_0NOTEQUAL => (val != 0) as i64,
		_ => return vm.set_err(ScriptError::BadOpcode),
	};
	vm.stack.push_num(result);
}

fn shift_left(val: i64, shift: i64) -> Result<i64, ScriptError> {
	if shift < 0 || shift > 2048 {
		return Err(ScriptError::UnknownError);
	}
	if val == 0 {
		return Ok(0);
	}
	if shift > 62 {
		return Err(ScriptError::UnknownError);
	}
	let shifted = (val.abs() as i128) << shift;
	if shifted > i64::max_value() as i128 {
		return Err(ScriptError::UnknownError);
	}
	Ok(if val < 0 { -(shifted as i64) } else { shifted as i64 })
}

fn shift_right(val: i64, shift: i64) -> Result<i64, ScriptError> {
	if shift < 0 || shift > 2048 {
		return Err(ScriptError::UnknownError);
	}
	if shift >= 64 {
		return Ok(0);
	}
	let magnitude = val.abs() >> shift;
	Ok(if val < 0 { -magnitude } else { magnitude })
}

fn op_binary_num(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	if vm.stack.len() < 2 {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	let b = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	let a = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	let result = match opcode {
		OP_ADD => a + b,
		OP_SUB => a - b,
		OP_MUL => a * b,
		OP_DIV => {
			if b == 0 {
				return vm.set_err(ScriptError::UnknownError);
			}
			a / b
		}
		OP_MOD => {
			if b == 0 {
				return vm.set_err(ScriptError::UnknownError);
			}
			a % b
		}
		OP_LSHIFT => match shift_left(a, b) {
			Ok(val) => val,
			Err(err) => return vm.set_err(err),
		},
		OP_RSHIFT => match shift_right(a, b) {
			Ok(val) => val,
			Err(err) => return vm.set_err(err),
		},
		OP_BOOLAND => (a != 0 && b != 0) as i64,
		OP_BOOLOR => (a != 0 || b != 0) as i64,
		OP_NUMEQUAL | OP_NUMEQUALVERIFY => (a == b) as i64,
		OP_NUMNOTEQUAL => (a != b) as i64,
		OP_LESSTHAN => (a < b) as i64,
		OP_GREATERTHAN => (a > b) as i64,
		OP_LESSTHANOREQUAL => (a <= b) as i64,
		OP_GREATERTHANOREQUAL => (a >= b) as i64,
		OP_MIN => a.min(b),
		OP_MAX => a.max(b),
		_ => return vm.set_err(ScriptError::BadOpcode),
	};
	vm.stack.push_num(result);
	if opcode == OP_NUMEQUALVERIFY {
		if result != 0 {
			vm.stack.pop();
		} else {
			vm.set_err(ScriptError::NumEqualVerify);
		}
	}
}

fn op_within(vm: &mut Vm<'_>, _opcode: u8, _reader: &mut BinReader<'_>) {
	if vm.stack.len() < 3 {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	let max = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	let min = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	let x = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	vm.stack.push_bool(min <= x && x < max);
}

fn ripemd160(data: &[u8]) -> Vec<u8> {
	let mut hasher = Ripemd160::new();
	hasher.input(data);
	hasher.result().to_vec()
}

fn sha256(data: &[u8]) -> Vec<u8> {
	Sha256::digest(data).to_vec()
}

fn op_hash(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	let data = match vm.stack.pop() {
		Some(data) => data,
		None => return vm.set_err(ScriptError::InvalidStackOperation),
	};
	let digest = match opcode {
		OP_RIPEMD160 => ripemd160(&data),
		OP_SHA1 => {
			let mut hasher = Sha1::new();
			hasher.input(&data);
			hasher.result().to_vec()
		}
		OP_SHA256 => sha256(&data),
		OP_HASH160 => ripemd160(&sha256(&data)),
		OP_HASH256 => sha256(&sha256(&data)),
		_ => return vm.set_err(ScriptError::BadOpcode),
	};
	vm.stack.push(digest);
}

fn op_checksig(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	if vm.stack.len() < 2 {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	let pubkey = vm.stack.pop().expect("bounds checked");
	let sig = vm.stack.pop().expect("bounds checked");
	let code = vm.env.code.clone();
	let success = vm.checker.check_sig(&sig, &pubkey, &code);
	vm.stack.push_bool(success);
	if opcode == OP_CHECKSIGVERIFY {
		if success {
			vm.stack.pop();
		} else {
			vm.set_err(ScriptError::CheckSigVerify);
		}
	}
}

fn op_checkmultisig(vm: &mut Vm<'_>, opcode: u8, _reader: &mut BinReader<'_>) {
	let key_count = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	if key_count < 0 || key_count > MAX_PUBKEYS_PER_MULTISIG {
		return vm.set_err(ScriptError::PubkeyCount);
	}
	vm.env.op_count += key_count as usize;
	if vm.env.op_count > crate::script::MAX_OPS_PER_SCRIPT {
		return vm.set_err(ScriptError::OpCount);
	}
	if vm.stack.len() < key_count as usize {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	let mut keys = Vec::with_capacity(key_count as usize);
	for _ in 0..key_count {
		keys.push(vm.stack.pop().expect("bounds checked"));
	}
	keys.reverse();

	let sig_count = match vm.pop_num() {
		Ok(val) => val,
		Err(err) => return vm.set_err(err),
	};
	if sig_count < 0 || sig_count > key_count {
		return vm.set_err(ScriptError::SigCount);
	}
	if vm.stack.len() < sig_count as usize {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}
	let mut sigs = Vec::with_capacity(sig_count as usize);
	for _ in 0..sig_count {
		sigs.push(vm.stack.pop().expect("bounds checked"));
	}
	sigs.reverse();

	// the historical off-by-one: one extra value is consumed
	if vm.stack.pop().is_none() {
		return vm.set_err(ScriptError::InvalidStackOperation);
	}

	let code = vm.env.code.clone();
	let mut success = true;
	let mut ikey = 0usize;
	let mut isig = 0usize;
	while isig < sigs.len() {
		if keys.len() - ikey < sigs.len() - isig {
			success = false;
			break;
		}
		if vm.checker.check_sig(&sigs[isig], &keys[ikey], &code) {
			isig += 1;
		}
		ikey += 1;
	}
	vm.stack.push_bool(success);
	if opcode == OP_CHECKMULTISIGVERIFY {
		if success {
			vm.stack.pop();
		} else {
			vm.set_err(ScriptError::CheckMultiSigVerify);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::script::vm::NoSignatureChecker;
	use crate::script::Builder;

	fn eval(script: &[u8]) -> (Result<(), ScriptError>, Option<bool>) {
		let mut checker = NoSignatureChecker;
		let mut vm = Vm::new(&mut checker);
		let result = vm.eval(script);
		let top = vm.bool_at(0);
		(result, top)
	}

	#[test]
	fn arithmetic() {
		// 2 3 ADD 5 NUMEQUAL
		let script = Builder::new()
			.push_int(2)
			.push_int(3)
			.push_opcode(OP_ADD)
			.push_int(5)
			.push_opcode(OP_NUMEQUAL)
			.into_script();
		let (result, top) = eval(&script);
		assert!(result.is_ok());
		assert_eq!(top, Some(true));
	}

	#[test]
	fn division_and_mod() {
		let script = Builder::new()
			.push_int(7)
			.push_int(2)
			.push_opcode(OP_DIV)
			.push_int(3)
			.push_opcode(OP_NUMEQUAL)
			.into_script();
		assert_eq!(eval(&script).1, Some(true));

		let script = Builder::new()
			.push_int(7)
			.push_int(0)
			.push_opcode(OP_MOD)
			.into_script();
		assert_eq!(eval(&script).0, Err(ScriptError::UnknownError));
	}

	#[test]
	fn equal_and_verify() {
		let script = Builder::new()
			.push_data(b"same")
			.push_data(b"same")
			.push_opcode(OP_EQUALVERIFY)
			.push_int(1)
			.into_script();
		let (result, top) = eval(&script);
		assert!(result.is_ok());
		assert_eq!(top, Some(true));

		let script = Builder::new()
			.push_data(b"one")
			.push_data(b"two")
			.push_opcode(OP_EQUALVERIFY)
			.into_script();
		assert_eq!(eval(&script).0, Err(ScriptError::EqualVerify));
	}

	#[test]
	fn op_return_halts() {
		let script = Builder::new().push_int(1).push_opcode(OP_RETURN).into_script();
		assert_eq!(eval(&script).0, Err(ScriptError::OpReturn));
	}

	#[test]
	fn disabled_and_bad_opcodes() {
		let script = Builder::new()
			.push_data(b"a")
			.push_data(b"b")
			.push_opcode(OP_CAT)
			.into_script();
		assert_eq!(eval(&script).0, Err(ScriptError::DisabledOpcode));

		let script = Builder::new().push_opcode(OP_RESERVED).into_script();
		assert_eq!(eval(&script).0, Err(ScriptError::BadOpcode));
	}

	#[test]
	fn stack_underflow() {
		let script = Builder::new().push_opcode(OP_ADD).into_script();
		assert_eq!(eval(&script).0, Err(ScriptError::InvalidStackOperation));
	}

	#[test]
	fn hash_opcodes() {
		// HASH256 of empty string, compared against the known digest
		let digest =
			util::from_hex("5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456")
				.unwrap();
		let script = Builder::new()
			.push_data(b"")
			.push_opcode(OP_HASH256)
			.push_data(&digest)
			.push_opcode(OP_EQUAL)
			.into_script();
		assert_eq!(eval(&script).1, Some(true));
	}

	#[test]
	fn within_bounds() {
		let script = Builder::new()
			.push_int(5)
			.push_int(1)
			.push_int(10)
			.push_opcode(OP_WITHIN)
			.into_script();
		assert_eq!(eval(&script).1, Some(true));

		let script = Builder::new()
			.push_int(10)
			.push_int(1)
			.push_int(10)
			.push_opcode(OP_WITHIN)
			.into_script();
		assert_eq!(eval(&script).1, Some(false));
	}

	#[test]
	fn alt_stack_roundtrip() {
		let script = Builder::new()
			.push_int(7)
			.push_opcode(OP_TOALTSTACK)
			.push_int(1)
			.push_opcode(OP_DROP)
			.push_opcode(OP_FROMALTSTACK)
			.push_int(7)
			.push_opcode(OP_NUMEQUAL)
			.into_script();
		assert_eq!(eval(&script).1, Some(true));
	}

	#[test]
	fn depth_and_size() {
		let script = Builder::new()
			.push_data(b"abc")
			.push_opcode(OP_SIZE)
			.push_int(3)
			.push_opcode(OP_NUMEQUALVERIFY)
			.push_opcode(OP_DEPTH)
			.push_int(1)
			.push_opcode(OP_NUMEQUAL)
			.into_script();
		let (result, top) = eval(&script);
		assert!(result.is_ok());
		assert_eq!(top, Some(true));
	}

	#[test]
	fn truncated_push_is_bad_opcode() {
		// direct push of 5 bytes with only 2 available
		let script = vec![0x05, 0x01, 0x02];
		assert_eq!(eval(&script).0, Err(ScriptError::BadOpcode));
	}
}
