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

//! Assembles scripts byte by byte. Used to construct the genesis coinbase
//! and by the test suites.

use crate::script::opcodes::*;
use crate::script::encode_script_num;

/// An incrementally built script.
#[derive(Default)]
pub struct Builder(Vec<u8>);

impl Builder {
	/// Start an empty script.
	pub fn new() -> Builder {
		Builder(vec![])
	}

	/// Push an integer, using the dedicated small-integer opcodes where one
	/// exists.
	pub fn push_int(self, val: i64) -> Builder {
		if val == -1 || (1..=16).contains(&val) {
			self.push_opcode((val + (OP_1 as i64 - 1)) as u8)
		} else if val == 0 {
			self.push_opcode(OP_0)
		} else {
			self.push_num(val)
		}
	}

	/// Push an integer as script-number data, never as an opcode.
	pub fn push_num(self, val: i64) -> Builder {
		let encoded = encode_script_num(val);
		self.push_data(&encoded)
	}

	/// Push raw data with the appropriate length prefix.
	pub fn push_data(mut self, data: &[u8]) -> Builder {
		let len = data.len();
		if len < OP_PUSHDATA1 as usize {
			self.0.push(len as u8);
		} else if len <= 0xff {
			self.0.push(OP_PUSHDATA1);
			self.0.push(len as u8);
		} else if len <= 0xffff {
			self.0.push(OP_PUSHDATA2);
			self.0.extend_from_slice(&(len as u16).to_le_bytes());
		} else {
			self.0.push(OP_PUSHDATA4);
			self.0.extend_from_slice(&(len as u32).to_le_bytes());
		}
		self.0.extend_from_slice(data);
		self
	}

	/// Append a raw opcode.
	pub fn push_opcode(mut self, opcode: u8) -> Builder {
		self.0.push(opcode);
		self
	}

	/// The finished script bytes.
	pub fn into_script(self) -> Vec<u8> {
		self.0
	}
}
