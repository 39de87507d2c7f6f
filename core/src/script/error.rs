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

//! Typed script evaluation errors. Handlers record one of these into the
//! VM environment and evaluation halts.

/// Everything that can go wrong evaluating a script.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Fail)]
pub enum ScriptError {
	/// Script finished without error but with a false top stack element
	#[fail(display = "script evaluated to false")]
	EvalFalse,
	/// OP_VERIFY failed
	#[fail(display = "OP_VERIFY failed")]
	Verify,
	/// OP_EQUALVERIFY failed
	#[fail(display = "OP_EQUALVERIFY failed")]
	EqualVerify,
	/// OP_CHECKSIGVERIFY failed
	#[fail(display = "OP_CHECKSIGVERIFY failed")]
	CheckSigVerify,
	/// OP_CHECKMULTISIGVERIFY failed
	#[fail(display = "OP_CHECKMULTISIGVERIFY failed")]
	CheckMultiSigVerify,
	/// OP_NUMEQUALVERIFY failed
	#[fail(display = "OP_NUMEQUALVERIFY failed")]
	NumEqualVerify,
	/// Script longer than the allowed maximum
	#[fail(display = "script too large")]
	ScriptSize,
	/// A push larger than the allowed element size
	#[fail(display = "push size exceeded")]
	PushSize,
	/// Too many non-push operations
	#[fail(display = "operation limit exceeded")]
	OpCount,
	/// Combined stack depth limit exceeded
	#[fail(display = "stack size limit exceeded")]
	StackSize,
	/// Multisig signature count negative or above the key count
	#[fail(display = "bad signature count")]
	SigCount,
	/// Multisig key count negative or above the limit
	#[fail(display = "bad pubkey count")]
	PubkeyCount,
	/// Opcode missing, malformed or not understood
	#[fail(display = "bad opcode")]
	BadOpcode,
	/// Opcode disabled by the protocol
	#[fail(display = "disabled opcode")]
	DisabledOpcode,
	/// Operation not valid with the current stack size
	#[fail(display = "invalid stack operation")]
	InvalidStackOperation,
	/// Operation not valid with the current altstack size
	#[fail(display = "invalid altstack operation")]
	InvalidAltstackOperation,
	/// OP_RETURN was encountered
	#[fail(display = "OP_RETURN encountered")]
	OpReturn,
	/// Locktime is negative
	#[fail(display = "negative locktime")]
	NegativeLockTime,
	/// Locktime requirement not satisfied
	#[fail(display = "unsatisfied locktime")]
	UnsatisfiedLockTime,
	/// Witness program has incorrect length
	#[fail(display = "witness program wrong length")]
	WitnessProgramWrongLength,
	/// Witness program was passed an empty witness
	#[fail(display = "witness program witness empty")]
	WitnessProgramWitnessEmpty,
	/// Witness program hash mismatch
	#[fail(display = "witness program mismatch")]
	WitnessProgramMismatch,
	/// Witness provided for a non-witness script
	#[fail(display = "unexpected witness")]
	WitnessUnexpected,
	/// Catch-all for conditions without a dedicated code
	#[fail(display = "unknown script error")]
	UnknownError,
}
