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

//! Outbound dial planning: how many peers to dial this tick and which,
//! never the node itself and never an endpoint already connected.

use crate::pool::PeerPool;
use crate::types::PeerAddr;

/// Pick the endpoints to dial this tick. At most `dial_batch` new dials,
/// and only while the session count is short of the target. Selected
/// endpoints are marked connecting in the pool.
pub fn plan_dials<F>(
	pool: &mut PeerPool,
	shortage: i32,
	dial_batch: usize,
	now: i64,
	is_connected: F,
	local: &PeerAddr,
) -> Vec<PeerAddr>
where
	F: Fn(&PeerAddr) -> bool,
{
	let mut dials = vec![];
	if shortage <= 0 {
		return dials;
	}
	let mut budget = dial_batch;
	while budget > 0 {
		let addr = match pool.connection_candidate(now) {
			Some(addr) => addr,
			None => break,
		};
		budget -= 1;
		if addr == *local {
			debug!("connector: skipping self address {}", addr);
			continue;
		}
		if is_connected(&addr) {
			debug!("connector: already connected to {}", addr);
			continue;
		}
		pool.set_connecting(&addr);
		dials.push(addr);
	}
	dials
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr(last: u8) -> PeerAddr {
		PeerAddr::parse(&format!("10.0.0.{}:8333", last)).unwrap()
	}

	#[test]
	fn dial_batch_is_capped() {
		let mut pool = PeerPool::new(PeerAddr::unspecified(), 5_000);
		for i in 1..=10 {
			pool.add_peer(addr(i), 0);
		}
		let dials = plan_dials(&mut pool, 30, 5, 10_000, |_| false, &PeerAddr::unspecified());
		assert_eq!(dials.len(), 5);
		for a in &dials {
			assert_eq!(pool.get(a).unwrap().state, crate::pool::PeerState::Connecting);
		}
	}

	#[test]
	fn no_dials_without_shortage() {
		let mut pool = PeerPool::new(PeerAddr::unspecified(), 5_000);
		pool.add_peer(addr(1), 0);
		assert!(plan_dials(&mut pool, 0, 5, 10_000, |_| false, &PeerAddr::unspecified()).is_empty());
	}

	#[test]
	fn connected_endpoints_are_skipped() {
		let mut pool = PeerPool::new(PeerAddr::unspecified(), 5_000);
		pool.add_peer(addr(1), 0);
		pool.add_peer(addr(2), 0);
		let connected = addr(1);
		let dials = plan_dials(
			&mut pool,
			30,
			5,
			10_000,
			|a| *a == connected,
			&PeerAddr::unspecified(),
		);
		assert_eq!(dials, vec![addr(2)]);
	}
}
