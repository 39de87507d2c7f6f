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

//! Session and pool behavior around broken handshakes, driven through the
//! same byte-level codec a socket would feed.

use halley_core::consensus::PROTOCOL_VERSION;
use halley_core::core::hash::hash_bytes;
use halley_p2p::msg::MSG_HEADER_SIZE;
use halley_p2p::pool::{PeerPool, PeerState};
use halley_p2p::session::{Session, SessionState};
use halley_p2p::types::{HostInfo, NODE_NETWORK};
use halley_p2p::PeerAddr;

const MAGIC: u32 = 0xD9B4BEF9;

fn host() -> HostInfo {
	HostInfo {
		version: PROTOCOL_VERSION,
		services: NODE_NETWORK,
		user_agent: "/halley:0.1.0/".to_string(),
		start_height: 0,
		local_addr: PeerAddr::unspecified(),
	}
}

/// Frame an arbitrary payload under the given command, with a valid
/// checksum.
fn frame(command: &str, payload: &[u8]) -> Vec<u8> {
	let digest = hash_bytes(payload);
	let mut bytes = vec![];
	bytes.extend_from_slice(&MAGIC.to_le_bytes());
	let mut cmd = [0u8; 12];
	cmd[..command.len()].copy_from_slice(command.as_bytes());
	bytes.extend_from_slice(&cmd);
	bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	bytes.extend_from_slice(&digest.as_bytes()[..4]);
	bytes.extend_from_slice(payload);
	assert_eq!(bytes.len(), MSG_HEADER_SIZE + payload.len());
	bytes
}

#[test]
fn malformed_version_closes_and_requeues_peer() {
	let addr = PeerAddr::parse("10.4.4.4:8333").unwrap();
	let mut pool = PeerPool::new(PeerAddr::unspecified(), 5_000);
	pool.add_peer(addr, 0);
	assert_eq!(pool.connection_candidate(1_000), Some(addr));
	pool.set_connecting(&addr);

	let mut session = Session::new(1, addr, false, MAGIC, 1_000);
	session.start_handshake(&host());

	// a version payload truncated mid-field decodes as an error
	let bytes = frame("version", &[0x7F, 0x11, 0x01]);
	let err = session.handle_data(&bytes, 1_100).unwrap_err();

	// the manager records the outcome in the pool
	pool.set_disconnected(&addr, err.disconnect_code(), false, 1_200);
	let entry = pool.get(&addr).unwrap();
	assert_eq!(entry.state, PeerState::Standby);
	assert_eq!(entry.disconnect_error, -1);
}

#[test]
fn byte_level_handshake_roundtrip() {
	use halley_p2p::msg::{encode_message, Message, VersionMsg};

	let addr = PeerAddr::parse("10.4.4.5:8333").unwrap();
	let mut session = Session::new(2, addr, false, MAGIC, 0);
	let host = host();
	session.start_handshake(&host);
	session.take_outbound();

	// remote version and verack arrive in one read, as they often do
	let version = Message::Version(VersionMsg {
		version: 70015,
		services: NODE_NETWORK,
		user_agent: "/peer:2.1/".to_string(),
		start_height: 42,
		..Default::default()
	});
	let mut bytes = encode_message(MAGIC, &version).unwrap();
	bytes.extend(encode_message(MAGIC, &Message::Verack).unwrap());

	let messages = session.handle_data(&bytes, 100).unwrap();
	assert_eq!(messages.len(), 2);
	for msg in messages {
		session.handle_message(msg, &host).unwrap();
	}
	assert_eq!(session.state, SessionState::Ready);
	assert_eq!(session.user_agent, "/peer:2.1/");
	assert_eq!(session.start_height, 42);
}

#[test]
fn reject_during_handshake_records_code() {
	use halley_p2p::msg::{encode_message, Message, RejectMsg};

	let addr = PeerAddr::parse("10.4.4.6:8333").unwrap();
	let mut pool = PeerPool::new(PeerAddr::unspecified(), 5_000);
	pool.add_peer(addr, 0);
	pool.set_connecting(&addr);

	let mut session = Session::new(3, addr, false, MAGIC, 0);
	let host = host();
	session.start_handshake(&host);

	let reject = Message::Reject(RejectMsg {
		message: "version".to_string(),
		code: 0x11,
		reason: "obsolete client".to_string(),
		data: vec![],
	});
	let bytes = encode_message(MAGIC, &reject).unwrap();
	let messages = session.handle_data(&bytes, 100).unwrap();
	let err = session.handle_message(messages.into_iter().next().unwrap(), &host).unwrap_err();

	pool.set_disconnected(&addr, err.disconnect_code(), false, 200);
	assert_eq!(pool.get(&addr).unwrap().disconnect_error, -2);
	assert_eq!(pool.get(&addr).unwrap().state, PeerState::Standby);
}
