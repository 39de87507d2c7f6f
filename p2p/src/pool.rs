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

//! The peer pool: every endpoint the node has heard of, with connection
//! state and two time-ordered indexes, one serving dial candidates and one
//! serving garbage collection. Timestamps are passed in explicitly so the
//! pool is deterministic under test.

use std::collections::{BTreeSet, HashMap};

use crate::types::PeerAddr;

/// Connection state of a pooled endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
	/// Known but not being dialed
	Standby,
	/// A dial is in flight
	Connecting,
	/// Handshake completed
	Connected,
}

/// Everything the pool tracks about one endpoint.
#[derive(Clone, Debug)]
pub struct PeerEntry {
	/// The endpoint
	pub addr: PeerAddr,
	/// Connection state
	pub state: PeerState,
	/// Round-trip time measured at connect, -1 when unknown
	pub rtt_ms: i32,
	/// When the endpoint was last dialed, millis
	pub last_connect: i64,
	/// When the endpoint last showed any sign of life, millis
	pub last_active: i64,
	/// Error code of the last disconnect, zero when none
	pub disconnect_error: i32,
}

/// Dial gate: a standby entry must be at least this old since its last
/// dial.
const CANDIDATE_GATE_MS: i64 = 5_000;
/// GC runs every this many ticks.
const GC_TICK_INTERVAL: i64 = 20;
/// Entries idle beyond this are evicted.
const EXPIRY_MS: i64 = 5 * 60 * 1000;

/// The pool itself. Every mutation removes the entry from both indexes,
/// updates it, and re-inserts, keeping the indexes exact.
pub struct PeerPool {
	peers: HashMap<PeerAddr, PeerEntry>,
	// standby entries ordered by last dial time
	connection_pool: BTreeSet<(i64, PeerAddr)>,
	// not-connected entries ordered by last activity
	expiring_pool: BTreeSet<(i64, PeerAddr)>,
	local: PeerAddr,
	redial_backoff_ms: i64,
}

impl PeerPool {
	/// A pool that will never hand out `local` as a candidate. Peers that
	/// failed their last connection wait `redial_backoff_ms` before being
	/// offered again.
	pub fn new(local: PeerAddr, redial_backoff_ms: i64) -> PeerPool {
		PeerPool {
			peers: HashMap::new(),
			connection_pool: BTreeSet::new(),
			expiring_pool: BTreeSet::new(),
			local,
			redial_backoff_ms: redial_backoff_ms.max(CANDIDATE_GATE_MS),
		}
	}

	/// Total endpoints tracked.
	pub fn len(&self) -> usize {
		self.peers.len()
	}

	/// Endpoints currently dialable.
	pub fn standby_len(&self) -> usize {
		self.connection_pool.len()
	}

	/// Read-only view of an entry.
	pub fn get(&self, addr: &PeerAddr) -> Option<&PeerEntry> {
		self.peers.get(addr)
	}

	fn unindex(&mut self, entry: &PeerEntry) {
		self.connection_pool.remove(&(entry.last_connect, entry.addr));
		self.expiring_pool.remove(&(entry.last_active, entry.addr));
	}

	fn index(&mut self, entry: &PeerEntry) {
		if entry.state == PeerState::Standby {
			self.connection_pool.insert((entry.last_connect, entry.addr));
		}
		if entry.state != PeerState::Connected {
			self.expiring_pool.insert((entry.last_active, entry.addr));
		}
	}

	/// Record a (possibly already known) endpoint as alive.
	pub fn add_peer(&mut self, addr: PeerAddr, now: i64) {
		if !addr.is_valid() || addr == self.local {
			return;
		}
		let entry = match self.peers.remove(&addr) {
			Some(entry) => entry,
			None => {
				trace!("pool: new peer {}", addr);
				PeerEntry {
					addr,
					state: PeerState::Standby,
					rtt_ms: -1,
					last_connect: 0,
					last_active: now,
					disconnect_error: 0,
				}
			}
		};
		self.unindex(&entry);
		let mut entry = entry;
		entry.last_active = now;
		self.index(&entry);
		self.peers.insert(addr, entry);
	}

	/// The oldest standby endpoint whose last dial is far enough in the
	/// past. Updates its dial time so repeat calls hand out new peers.
	pub fn connection_candidate(&mut self, now: i64) -> Option<PeerAddr> {
		let (ts, addr) = *self.connection_pool.iter().next()?;
		let entry = self.peers.get(&addr)?.clone();
		debug_assert_eq!(entry.last_connect, ts);
		let gate = if entry.disconnect_error != 0 {
			self.redial_backoff_ms
		} else {
			CANDIDATE_GATE_MS
		};
		if entry.last_connect != 0 && now - entry.last_connect < gate {
			return None;
		}
		self.unindex(&entry);
		let mut entry = entry;
		entry.last_connect = now;
		self.index(&entry);
		self.peers.insert(addr, entry);
		Some(addr)
	}

	/// A dial is in flight for `addr`.
	pub fn set_connecting(&mut self, addr: &PeerAddr) {
		self.mutate(addr, |entry| {
			entry.state = PeerState::Connecting;
		});
	}

	/// The handshake with `addr` completed.
	pub fn set_connected(&mut self, addr: &PeerAddr, rtt_ms: i32) {
		self.mutate(addr, |entry| {
			entry.state = PeerState::Connected;
			entry.rtt_ms = rtt_ms;
			entry.disconnect_error = 0;
		});
	}

	/// The session with `addr` ended. A peer that had fully connected
	/// refreshes its activity time; a failed dial does not.
	pub fn set_disconnected(&mut self, addr: &PeerAddr, error: i32, was_connected: bool, now: i64) {
		self.mutate(addr, |entry| {
			entry.state = PeerState::Standby;
			entry.disconnect_error = error;
			if was_connected {
				entry.last_active = now;
			}
		});
	}

	fn mutate<F: FnOnce(&mut PeerEntry)>(&mut self, addr: &PeerAddr, f: F) {
		let entry = match self.peers.remove(addr) {
			Some(entry) => entry,
			None => return,
		};
		self.unindex(&entry);
		let mut entry = entry;
		f(&mut entry);
		self.index(&entry);
		self.peers.insert(*addr, entry);
	}

	/// Periodic housekeeping; evicts long-idle entries every 20 ticks.
	pub fn on_tick(&mut self, times: i64, now: i64) {
		if times % GC_TICK_INTERVAL == 0 {
			self.remove_expired(now);
		}
	}

	fn remove_expired(&mut self, now: i64) {
		let mut evicted = 0usize;
		while let Some((ts, addr)) = self.expiring_pool.iter().next().copied() {
			if now - ts <= EXPIRY_MS {
				break;
			}
			if let Some(entry) = self.peers.remove(&addr) {
				self.unindex(&entry);
			} else {
				self.expiring_pool.remove(&(ts, addr));
			}
			evicted += 1;
		}
		if evicted > 0 {
			debug!("pool: evicted {} idle peers, {} remain", evicted, self.peers.len());
		}
	}
}
