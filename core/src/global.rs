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

//! The chain flavours a node can run against. Parameters are always passed
//! explicitly; there is deliberately no process-wide mutable chain state.

use std::fmt;

/// Types of chain a node can run with, dictating the genesis block, magic
/// bytes and proof-of-work policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainTypes {
	/// For integration testing purposes: proof of work is not verified.
	AutomatedTesting,
	/// Public test network.
	Testnet,
	/// Main production network.
	Mainnet,
}

impl Default for ChainTypes {
	fn default() -> ChainTypes {
		ChainTypes::Mainnet
	}
}

impl fmt::Display for ChainTypes {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChainTypes::AutomatedTesting => write!(f, "auto"),
			ChainTypes::Testnet => write!(f, "test"),
			ChainTypes::Mainnet => write!(f, "main"),
		}
	}
}
