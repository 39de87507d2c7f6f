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

//! The script interpreter: a byte-stream program over two stacks of byte
//! strings. Handlers record errors into the environment and the loop halts
//! on the first one.

use crate::script::error::ScriptError;
use crate::script::opcodes::OP_16;
use crate::script::ops;
use crate::script::{cast_to_bool, decode_script_num, encode_script_num};
use crate::script::{MAX_NUM_SIZE, MAX_OPS_PER_SCRIPT, MAX_SCRIPT_SIZE, MAX_STACK_SIZE};
use crate::ser::Reader;
use crate::ser::BinReader;

/// Pluggable signature verification, so the VM stays independent of the
/// transaction it validates.
pub trait SignatureChecker {
	/// Check `sig` (with its trailing hash-type byte) against `pubkey` for
	/// the script code currently being evaluated.
	fn check_sig(&mut self, sig: &[u8], pubkey: &[u8], script_code: &[u8]) -> bool;
}

/// A checker that refuses every signature; used where scripts cannot
/// legitimately contain signature operations.
pub struct NoSignatureChecker;

impl SignatureChecker for NoSignatureChecker {
	fn check_sig(&mut self, _sig: &[u8], _pubkey: &[u8], _script_code: &[u8]) -> bool {
		false
	}
}

/// A stack of byte strings.
#[derive(Default)]
pub struct Stack {
	items: Vec<Vec<u8>>,
}

impl Stack {
	/// Number of elements on the stack.
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// True when empty.
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Push a value on top.
	pub fn push(&mut self, item: Vec<u8>) {
		self.items.push(item);
	}

	/// Push the canonical true/false values.
	pub fn push_bool(&mut self, val: bool) {
		self.push(if val { vec![1] } else { vec![] });
	}

	/// Push an integer in script-number encoding.
	pub fn push_num(&mut self, val: i64) {
		self.push(encode_script_num(val));
	}

	/// Pop the top value.
	pub fn pop(&mut self) -> Option<Vec<u8>> {
		self.items.pop()
	}

	/// Value `depth` entries below the top, zero being the top itself.
	pub fn peek(&self, depth: usize) -> Option<&Vec<u8>> {
		if depth >= self.items.len() {
			return None;
		}
		self.items.get(self.items.len() - 1 - depth)
	}
}

/// Evaluation environment: the recorded error, the script code being run
/// (needed for signature hashing) and the running operation count.
pub struct Env {
	/// First error any handler recorded, halting evaluation
	pub error: Option<ScriptError>,
	/// The script currently being evaluated
	pub code: Vec<u8>,
	/// Non-push operations executed so far, across both scripts
	pub op_count: usize,
}

/// The script virtual machine. One instance evaluates the signature script
/// and the pubkey script of a single input, sharing its stack between the
/// two.
pub struct Vm<'a> {
	/// Main evaluation stack
	pub stack: Stack,
	/// Alternate stack
	pub alt: Stack,
	/// Evaluation environment
	pub env: Env,
	/// Signature checker for CHECKSIG-family opcodes
	pub checker: &'a mut dyn SignatureChecker,
}

impl<'a> Vm<'a> {
	/// A fresh VM around the given signature checker.
	pub fn new(checker: &'a mut dyn SignatureChecker) -> Vm<'a> {
		Vm {
			stack: Stack::default(),
			alt: Stack::default(),
			env: Env {
				error: None,
				code: vec![],
				op_count: 0,
			},
			checker,
		}
	}

	/// Record an error into the environment; evaluation halts before the
	/// next opcode.
	pub fn set_err(&mut self, err: ScriptError) {
		if self.env.error.is_none() {
			self.env.error = Some(err);
		}
	}

	/// Evaluate one script on the current stacks. Returns the recorded
	/// error, if any handler set one.
	pub fn eval(&mut self, code: &[u8]) -> Result<(), ScriptError> {
		if code.len() > MAX_SCRIPT_SIZE {
			self.set_err(ScriptError::ScriptSize);
			return Err(ScriptError::ScriptSize);
		}
		self.env.code = code.to_vec();
		let mut reader = BinReader::new(code);
		while self.env.error.is_none() && reader.remaining() > 0 {
			let opcode = match reader.read_u8() {
				Ok(op) => op,
				Err(_) => break,
			};
			if opcode > OP_16 {
				self.env.op_count += 1;
				if self.env.op_count > MAX_OPS_PER_SCRIPT {
					self.set_err(ScriptError::OpCount);
					break;
				}
			}
			ops::dispatch(self, opcode, &mut reader);
			if self.stack.len() + self.alt.len() > MAX_STACK_SIZE {
				self.set_err(ScriptError::StackSize);
			}
		}
		match self.env.error {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}

	/// Truthiness of the value `depth` entries below the top.
	pub fn bool_at(&self, depth: usize) -> Option<bool> {
		self.stack.peek(depth).map(|item| cast_to_bool(item))
	}

	/// Pop the top value as an arithmetic script number.
	pub fn pop_num(&mut self) -> Result<i64, ScriptError> {
		let item = self.stack.pop().ok_or(ScriptError::InvalidStackOperation)?;
		decode_script_num(&item, MAX_NUM_SIZE).map_err(|_| ScriptError::UnknownError)
	}
}
