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

//! DNS seed discovery. Seeds resolve to batches of peer addresses that
//! land in the peer pool; when a direct node is configured this module is
//! never consulted.

use tokio::net::lookup_host;

use crate::types::PeerAddr;

/// Resolve the configured DNS seeds, one after another, into peer
/// endpoints on the chain's default port. Failures are logged and skipped.
pub async fn resolve_seeds(seeds: Vec<String>, default_port: u16) -> Vec<PeerAddr> {
	let mut found = vec![];
	for seed in seeds {
		match lookup_host((seed.as_str(), default_port)).await {
			Ok(addrs) => {
				let before = found.len();
				for addr in addrs {
					if let Some(peer) = PeerAddr::from_socket_addr(&addr) {
						found.push(peer);
					}
				}
				info!("discover: {} gave {} addresses", seed, found.len() - before);
			}
			Err(e) => {
				warn!("discover: failed to resolve {}: {}", seed, e);
			}
		}
	}
	found
}
