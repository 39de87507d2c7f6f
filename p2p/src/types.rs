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

//! Shared p2p types: peer addresses, service flags, configuration and the
//! error taxonomy of the networking layer.

use num_bigint::BigUint;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::core::ser;

/// This node relays full blocks.
pub const NODE_NETWORK: u64 = 1;
/// The remote can serve witnesses.
pub const NODE_WITNESS: u64 = 1 << 3;

/// An IPv4 endpoint of a peer. Ordering is lexicographic on (ip, port).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PeerAddr {
	/// The peer's address
	pub ip: Ipv4Addr,
	/// The peer's TCP port
	pub port: u16,
}

impl Default for PeerAddr {
	fn default() -> PeerAddr {
		PeerAddr::unspecified()
	}
}

impl PeerAddr {
	/// Endpoint from parts.
	pub fn new(ip: Ipv4Addr, port: u16) -> PeerAddr {
		PeerAddr { ip, port }
	}

	/// The "no address" sentinel.
	pub fn unspecified() -> PeerAddr {
		PeerAddr {
			ip: Ipv4Addr::UNSPECIFIED,
			port: 0,
		}
	}

	/// Parse an `ip:port` string, as used by the directNode setting.
	pub fn parse(s: &str) -> Option<PeerAddr> {
		let sock: SocketAddrV4 = s.parse().ok()?;
		let addr = PeerAddr {
			ip: *sock.ip(),
			port: sock.port(),
		};
		if addr.is_valid() {
			Some(addr)
		} else {
			None
		}
	}

	/// A dialable endpoint has a non-zero address and port.
	pub fn is_valid(&self) -> bool {
		!self.ip.is_unspecified() && self.port > 0
	}

	/// As a socket address for connect/bind.
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::V4(SocketAddrV4::new(self.ip, self.port))
	}

	/// From an accepted socket's remote address. Non-IPv4 peers are not
	/// tracked.
	pub fn from_socket_addr(addr: &SocketAddr) -> Option<PeerAddr> {
		match addr {
			SocketAddr::V4(v4) => Some(PeerAddr::new(*v4.ip(), v4.port())),
			SocketAddr::V6(_) => None,
		}
	}
}

impl fmt::Display for PeerAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.ip, self.port)
	}
}

/// Configuration of the networking layer, distilled from the node config
/// and chain parameters.
#[derive(Clone)]
pub struct P2PConfig {
	/// Port to listen on for inbound peers
	pub listen_port: u16,
	/// Target number of concurrent peers
	pub max_peer_count: usize,
	/// Most new dials started per tick
	pub dial_batch: usize,
	/// Backoff before redialing a peer that failed, milliseconds
	pub connect_interval_ms: i64,
	/// When set, skip discovery and dial only this peer
	pub direct_node: Option<PeerAddr>,
	/// Blocks are only downloaded from peers whose best known block
	/// carries at least this much work
	pub minimum_chain_work: BigUint,
}

impl Default for P2PConfig {
	fn default() -> P2PConfig {
		P2PConfig {
			listen_port: 8333,
			max_peer_count: 30,
			dial_batch: 5,
			connect_interval_ms: 30_000,
			direct_node: None,
			minimum_chain_work: BigUint::from(0u32),
		}
	}
}

/// Identity advertised in our version messages.
#[derive(Clone)]
pub struct HostInfo {
	/// Protocol version we speak
	pub version: u32,
	/// Service bits we advertise
	pub services: u64,
	/// User agent string
	pub user_agent: String,
	/// Height of our active chain at startup
	pub start_height: i32,
	/// Our own endpoint, never dialed
	pub local_addr: PeerAddr,
}

/// Enumeration of the networking error kinds. Framing and protocol errors
/// close the session; transient errors requeue the peer.
#[derive(Debug, Fail)]
pub enum Error {
	/// Message prefixed by a magic not of this chain
	#[fail(display = "bad magic {:08x}", _0)]
	BadMagic(u32),
	/// Payload digest does not match the header checksum
	#[fail(display = "bad checksum")]
	BadChecksum,
	/// Command field not NUL-terminated ASCII
	#[fail(display = "malformed command")]
	BadCommand,
	/// Message above the hard size cap
	#[fail(display = "oversized message of {} bytes", _0)]
	OversizedMessage(u64),
	/// A payload failed to decode
	#[fail(display = "serialization error: {}", _0)]
	Ser(ser::Error),
	/// A message that must not appear in the current handshake state
	#[fail(display = "unexpected {} during handshake", _0)]
	UnexpectedMessage(&'static str),
	/// The remote rejected one of our messages
	#[fail(display = "peer rejected {} ({}): {}", message, code, reason)]
	Rejected {
		/// Command being rejected
		message: String,
		/// Reject code byte
		code: u8,
		/// Human readable reason
		reason: String,
	},
	/// Handshake did not complete within the deadline
	#[fail(display = "handshake timeout")]
	HandshakeTimeout,
	/// Socket-level failure or EOF
	#[fail(display = "connection error: {}", _0)]
	Connection(String),
	/// Chain-side failure while handling a message
	#[fail(display = "chain error: {}", _0)]
	Chain(chain::Error),
}

impl Error {
	/// The disconnect code recorded into the peer pool.
	pub fn disconnect_code(&self) -> i32 {
		match self {
			Error::Rejected { .. } => -2,
			_ => -1,
		}
	}
}

impl From<ser::Error> for Error {
	fn from(e: ser::Error) -> Error {
		Error::Ser(e)
	}
}

impl From<chain::Error> for Error {
	fn from(e: chain::Error) -> Error {
		Error::Chain(e)
	}
}

impl From<std::io::Error> for Error {
	fn from(e: std::io::Error) -> Error {
		Error::Connection(format!("{}", e))
	}
}
