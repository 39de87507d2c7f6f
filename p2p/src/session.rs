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

//! One peer session: the framing decoder, the handshake state machine and
//! the message dispatch. Sessions are plain state machines; sockets and
//! timers live with the node manager, which feeds bytes in and flushes the
//! queued outbound messages.

use rand::Rng;

use crate::core::core::block::{Block, BlockHeader};
use crate::msg::{
	decode_message, Message, MessageDecoder, NetAddress, SendCmpctMsg, VersionMsg,
};
use crate::sync::SyncInfo;
use crate::types::{Error, HostInfo, PeerAddr, NODE_WITNESS};

/// Milliseconds a session may spend in the handshake.
const HANDSHAKE_TIMEOUT_MS: i64 = 10_000;

/// Handshake progress of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
	/// Created, nothing sent or received
	New,
	/// Our version is out
	VerSent,
	/// The remote version arrived
	VerRecvd,
	/// Our verack is out
	VerAcked,
	/// Handshake complete, full dispatch active
	Ready,
	/// Torn down, terminal
	Closed,
}

/// What a handled message means to the rest of the node.
#[derive(Debug, PartialEq)]
pub enum SessionEvent {
	/// Nothing to route
	None,
	/// Handshake just completed
	Ready,
	/// A batch of headers for the synchronizer
	Headers(Vec<BlockHeader>),
	/// A block for the synchronizer
	Block(Box<Block>),
	/// Addresses for the peer pool
	Addrs(Vec<PeerAddr>),
}

/// A connected peer, inbound or outbound.
pub struct Session {
	/// Session identifier, unique for the process lifetime
	pub id: u64,
	/// The remote endpoint
	pub addr: PeerAddr,
	/// Whether the remote dialed us
	pub inbound: bool,
	/// Handshake progress
	pub state: SessionState,
	/// Remote protocol version, once its version message arrived
	pub version: u32,
	/// Remote service bits
	pub services: u64,
	/// Remote user agent
	pub user_agent: String,
	/// Remote chain height at handshake
	pub start_height: i32,
	/// Connect round-trip time, -1 for inbound sessions
	pub rtt_ms: i32,
	/// When the session was created, millis
	pub created: i64,
	/// Last time any bytes arrived
	pub last_data_recv: i64,
	/// Last time a complete message arrived
	pub last_msg_recv: i64,
	/// Per-peer block download state
	pub sync: SyncInfo,
	decoder: MessageDecoder,
	outbound_queue: Vec<Message>,
}

impl Session {
	/// A fresh session around an established socket.
	pub fn new(id: u64, addr: PeerAddr, inbound: bool, magic: u32, now: i64) -> Session {
		Session {
			id,
			addr,
			inbound,
			state: SessionState::New,
			version: 0,
			services: 0,
			user_agent: String::new(),
			start_height: 0,
			rtt_ms: -1,
			created: now,
			last_data_recv: now,
			last_msg_recv: now,
			sync: SyncInfo::default(),
			decoder: MessageDecoder::new(magic),
			outbound_queue: vec![],
		}
	}

	/// Queue a message for the writer.
	pub fn queue(&mut self, msg: Message) {
		trace!("session {}: queue {}", self.addr, msg.command());
		self.outbound_queue.push(msg);
	}

	/// Drain the queued outbound messages.
	pub fn take_outbound(&mut self) -> Vec<Message> {
		std::mem::replace(&mut self.outbound_queue, vec![])
	}

	/// Outbound sessions introduce themselves as soon as the socket is up.
	pub fn start_handshake(&mut self, host: &HostInfo) {
		debug_assert!(!self.inbound);
		self.send_version(host);
	}

	fn send_version(&mut self, host: &HostInfo) {
		let msg = VersionMsg {
			version: host.version,
			services: host.services,
			timestamp: chrono::Utc::now().timestamp() as u64,
			your_addr: NetAddress {
				services: host.services,
				addr: self.addr,
			},
			my_addr: NetAddress {
				services: host.services,
				addr: PeerAddr::unspecified(),
			},
			nonce: rand::thread_rng().gen(),
			user_agent: host.user_agent.clone(),
			start_height: host.start_height,
			relay: false,
		};
		self.queue(Message::Version(msg));
		self.state = SessionState::VerSent;
	}

	/// Feed raw socket bytes through the framing decoder, yielding the
	/// decoded messages in arrival order.
	pub fn handle_data(&mut self, data: &[u8], now: i64) -> Result<Vec<Message>, Error> {
		self.last_data_recv = now;
		let frames = self.decoder.feed(data)?;
		let mut messages = Vec::with_capacity(frames.len());
		for (header, payload) in frames {
			let msg = decode_message(&header, &payload).map_err(|e| {
				warn!("session {}: undecodable {}: {}", self.addr, header.command, e);
				e
			})?;
			self.last_msg_recv = now;
			messages.push(msg);
		}
		Ok(messages)
	}

	/// Advance the state machine with one message. Errors close the
	/// session.
	pub fn handle_message(&mut self, msg: Message, host: &HostInfo) -> Result<SessionEvent, Error> {
		if self.state == SessionState::Ready {
			return self.dispatch_ready(msg);
		}
		self.dispatch_handshake(msg, host)
	}

	fn dispatch_handshake(
		&mut self,
		msg: Message,
		host: &HostInfo,
	) -> Result<SessionEvent, Error> {
		match msg {
			Message::Version(version) => {
				if self.version != 0 {
					return Err(Error::UnexpectedMessage("version"));
				}
				info!(
					"session {}: version {} agent {:?} height {}",
					self.addr, version.version, version.user_agent, version.start_height
				);
				self.version = version.version;
				self.services = version.services;
				self.user_agent = version.user_agent;
				self.start_height = version.start_height;
				if self.inbound && self.state == SessionState::New {
					// inbound peers hear our version only after theirs
					self.send_version(host);
				}
				self.state = SessionState::VerRecvd;
				self.queue(Message::Verack);
				self.state = SessionState::VerAcked;
				Ok(SessionEvent::None)
			}
			Message::Verack => {
				if self.state != SessionState::VerAcked {
					return Err(Error::UnexpectedMessage("verack"));
				}
				self.state = SessionState::Ready;
				self.on_ready();
				Ok(SessionEvent::Ready)
			}
			Message::Reject(reject) => {
				warn!(
					"session {}: rejected during handshake: {} {} {}",
					self.addr, reject.message, reject.code, reject.reason
				);
				Err(Error::Rejected {
					message: reject.message,
					code: reject.code,
					reason: reject.reason,
				})
			}
			other => Err(Error::UnexpectedMessage(match other {
				Message::Unknown(_) => "unknown",
				_ => "non-handshake message",
			})),
		}
	}

	/// The burst of courtesies sent when the handshake completes.
	fn on_ready(&mut self) {
		self.queue(Message::SendHeaders);
		self.queue(Message::SendCmpct(SendCmpctMsg {
			announce: false,
			version: 1,
		}));
		if self.services & NODE_WITNESS != 0 {
			self.queue(Message::SendCmpct(SendCmpctMsg {
				announce: false,
				version: 2,
			}));
		}
		self.queue(Message::GetAddr);
		self.queue(Message::Ping(rand::thread_rng().gen()));
	}

	fn dispatch_ready(&mut self, msg: Message) -> Result<SessionEvent, Error> {
		match msg {
			Message::Ping(nonce) => {
				trace!("session {}: ping {}", self.addr, nonce);
				self.queue(Message::Pong(nonce));
				Ok(SessionEvent::None)
			}
			Message::Pong(nonce) => {
				trace!("session {}: pong {}", self.addr, nonce);
				Ok(SessionEvent::None)
			}
			Message::Addr(addrs) => {
				debug!("session {}: {} addresses", self.addr, addrs.len());
				Ok(SessionEvent::Addrs(
					addrs.into_iter().map(|a| a.address.addr).collect(),
				))
			}
			Message::Headers(headers) => {
				debug!("session {}: {} headers", self.addr, headers.len());
				Ok(SessionEvent::Headers(headers))
			}
			Message::Block(block) => {
				debug!("session {}: block {}", self.addr, block.header.merkle_root);
				Ok(SessionEvent::Block(block))
			}
			Message::Reject(reject) => {
				warn!(
					"session {}: reject {} {} {}",
					self.addr, reject.message, reject.code, reject.reason
				);
				Err(Error::Rejected {
					message: reject.message,
					code: reject.code,
					reason: reject.reason,
				})
			}
			Message::Version(_) | Message::Verack => {
				debug!("session {}: stray handshake message", self.addr);
				Ok(SessionEvent::None)
			}
			Message::Unknown(command) => {
				debug!("session {}: unknown command {:?}", self.addr, command);
				Ok(SessionEvent::None)
			}
			other => {
				trace!("session {}: ignoring {}", self.addr, other.command());
				Ok(SessionEvent::None)
			}
		}
	}

	/// Whether the handshake deadline has passed.
	pub fn handshake_expired(&self, now: i64) -> bool {
		self.state != SessionState::Ready
			&& self.state != SessionState::Closed
			&& now - self.created > HANDSHAKE_TIMEOUT_MS
	}
}
