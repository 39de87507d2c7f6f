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

//! The node manager: owns every session and all shared chain state, runs
//! the single-threaded event loop, dials outbound peers, accepts inbound
//! ones and drives the periodic tick. Socket reads and writes run in
//! per-session tasks that only exchange messages with the loop.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use chain::BlockCache;

use crate::connector;
use crate::core::consensus::{format_user_agent, PROTOCOL_VERSION};
use crate::discover;
use crate::msg::encode_message;
use crate::pool::PeerPool;
use crate::session::{Session, SessionEvent, SessionState};
use crate::sync::BlockSynchronizer;
use crate::types::{Error, HostInfo, P2PConfig, PeerAddr, NODE_NETWORK};
use util::now_millis;

/// Socket reads are issued in chunks of this size.
const READ_CHUNK_SIZE: usize = 20 * 1024;
/// Outbound connects are abandoned after this long.
const CONNECT_TIMEOUT_S: u64 = 10;

/// Everything that can happen to the event loop.
enum NodeEvent {
	DialResult {
		addr: PeerAddr,
		result: Result<TcpStream, String>,
		started: i64,
	},
	Accepted {
		stream: TcpStream,
		addr: PeerAddr,
	},
	Data {
		id: u64,
		bytes: Vec<u8>,
	},
	Disconnected {
		id: u64,
		reason: String,
	},
	SeedAddrs(Vec<PeerAddr>),
}

struct SessionIo {
	writer: UnboundedSender<Vec<u8>>,
	reader: JoinHandle<()>,
	writer_task: JoinHandle<()>,
}

/// Owns the sessions, the pool, the synchronizer and the block cache, and
/// multiplexes all of their events on one loop.
pub struct NodeManager {
	config: P2PConfig,
	magic: u32,
	host: HostInfo,
	cache: BlockCache,
	pool: PeerPool,
	sessions: HashMap<u64, Session>,
	io: HashMap<u64, SessionIo>,
	sync: BlockSynchronizer,
	events_tx: UnboundedSender<NodeEvent>,
	events_rx: Option<UnboundedReceiver<NodeEvent>>,
	next_session_id: u64,
	ticks: i64,
}

impl NodeManager {
	/// Build the manager around a loaded block cache.
	pub fn new(cache: BlockCache, config: P2PConfig) -> NodeManager {
		let (events_tx, events_rx) = unbounded_channel();
		let now = now_millis();
		let local_addr = PeerAddr::unspecified();
		let host = HostInfo {
			version: PROTOCOL_VERSION,
			services: NODE_NETWORK,
			user_agent: format_user_agent(),
			start_height: cache.chain().height(),
			local_addr,
		};
		NodeManager {
			magic: cache.params().magic,
			sync: BlockSynchronizer::new(
				PROTOCOL_VERSION,
				config.minimum_chain_work.clone(),
				now,
			),
			pool: PeerPool::new(local_addr, config.connect_interval_ms),
			config,
			host,
			cache,
			sessions: HashMap::new(),
			io: HashMap::new(),
			events_tx,
			events_rx: Some(events_rx),
			next_session_id: 1,
			ticks: 0,
		}
	}

	/// Run the node: listen, discover, tick every second, and react to
	/// session events until the process ends.
	pub async fn run(mut self) -> Result<(), Error> {
		let listener = TcpListener::bind(("0.0.0.0", self.config.listen_port)).await?;
		info!("node: listening on port {}", self.config.listen_port);
		let accept_tx = self.events_tx.clone();
		tokio::spawn(async move {
			loop {
				match listener.accept().await {
					Ok((stream, addr)) => match PeerAddr::from_socket_addr(&addr) {
						Some(peer) => {
							if accept_tx.send(NodeEvent::Accepted { stream, addr: peer }).is_err() {
								break;
							}
						}
						None => debug!("node: dropping non-IPv4 peer {}", addr),
					},
					Err(e) => {
						warn!("node: accept failed: {}", e);
					}
				}
			}
		});

		match self.config.direct_node {
			Some(direct) => {
				info!("node: direct node {}, discovery disabled", direct);
				self.pool.add_peer(direct, now_millis());
			}
			None => {
				let seeds: Vec<String> = self
					.cache
					.params()
					.dns_seeds
					.iter()
					.map(|s| s.to_string())
					.collect();
				let port = self.cache.params().default_port;
				let seed_tx = self.events_tx.clone();
				tokio::spawn(async move {
					let addrs = discover::resolve_seeds(seeds, port).await;
					let _ = seed_tx.send(NodeEvent::SeedAddrs(addrs));
				});
			}
		}

		let mut events_rx = self.events_rx.take().expect("run once");
		let mut ticker = tokio::time::interval(Duration::from_secs(1));
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					self.on_tick();
				}
				event = events_rx.recv() => {
					match event {
						Some(event) => self.handle_event(event),
						None => break,
					}
				}
			}
		}
		Ok(())
	}

	fn on_tick(&mut self) {
		self.ticks += 1;
		let now = now_millis();

		let expired: Vec<u64> = self
			.sessions
			.values()
			.filter(|s| s.handshake_expired(now))
			.map(|s| s.id)
			.collect();
		for id in expired {
			self.close_session(id, &Error::HandshakeTimeout);
		}

		let shortage = self.config.max_peer_count as i32 - self.sessions.len() as i32;
		let connected: HashSet<PeerAddr> = self
			.sessions
			.values()
			.filter(|s| !s.inbound)
			.map(|s| s.addr)
			.collect();
		let dials = connector::plan_dials(
			&mut self.pool,
			shortage,
			self.config.dial_batch,
			now,
			|addr| connected.contains(addr),
			&self.host.local_addr,
		);
		for addr in dials {
			self.start_dial(addr);
		}

		self.pool.on_tick(self.ticks, now);
		let drops = self.sync.on_tick(&mut self.sessions, &self.cache, now);
		for id in drops {
			self.close_session(id, &Error::Connection("idle header requester".to_string()));
		}
		self.flush_outbound();
	}

	fn handle_event(&mut self, event: NodeEvent) {
		let now = now_millis();
		match event {
			NodeEvent::DialResult {
				addr,
				result: Ok(stream),
				started,
			} => {
				let rtt = (now - started).max(0) as i32;
				debug!("node: connected to {} in {} ms", addr, rtt);
				let id = self.install_session(stream, addr, false, rtt);
				let host = self.host.clone();
				if let Some(session) = self.sessions.get_mut(&id) {
					session.start_handshake(&host);
				}
				self.flush_session(id);
			}
			NodeEvent::DialResult {
				addr,
				result: Err(reason),
				..
			} => {
				debug!("node: failed to connect {}: {}", addr, reason);
				self.pool.set_disconnected(&addr, -1, false, now);
			}
			NodeEvent::Accepted { stream, addr } => {
				debug!("node: inbound connection from {}", addr);
				self.install_session(stream, addr, true, -1);
			}
			NodeEvent::Data { id, bytes } => {
				self.on_data(id, bytes, now);
			}
			NodeEvent::Disconnected { id, reason } => {
				if self.sessions.contains_key(&id) {
					self.close_session(id, &Error::Connection(reason));
				}
			}
			NodeEvent::SeedAddrs(addrs) => {
				info!("node: discovered {} seed addresses", addrs.len());
				for addr in addrs {
					self.pool.add_peer(addr, now);
				}
			}
		}
	}

	fn start_dial(&mut self, addr: PeerAddr) {
		trace!("node: dialing {}", addr);
		let tx = self.events_tx.clone();
		tokio::spawn(async move {
			let started = now_millis();
			let result = tokio::time::timeout(
				Duration::from_secs(CONNECT_TIMEOUT_S),
				TcpStream::connect(addr.to_socket_addr()),
			)
			.await;
			let result = match result {
				Ok(Ok(stream)) => Ok(stream),
				Ok(Err(e)) => Err(e.to_string()),
				Err(_) => Err("connect timeout".to_string()),
			};
			let _ = tx.send(NodeEvent::DialResult {
				addr,
				result,
				started,
			});
		});
	}

	fn install_session(&mut self, stream: TcpStream, addr: PeerAddr, inbound: bool, rtt: i32) -> u64 {
		let id = self.next_session_id;
		self.next_session_id += 1;
		let _ = stream.set_nodelay(true);
		let (mut read_half, mut write_half) = stream.into_split();

		let data_tx = self.events_tx.clone();
		let reader = tokio::spawn(async move {
			let mut buf = vec![0u8; READ_CHUNK_SIZE];
			loop {
				match read_half.read(&mut buf).await {
					Ok(0) => {
						let _ = data_tx.send(NodeEvent::Disconnected {
							id,
							reason: "eof".to_string(),
						});
						break;
					}
					Ok(n) => {
						if data_tx
							.send(NodeEvent::Data {
								id,
								bytes: buf[..n].to_vec(),
							})
							.is_err()
						{
							break;
						}
					}
					Err(e) => {
						let _ = data_tx.send(NodeEvent::Disconnected {
							id,
							reason: e.to_string(),
						});
						break;
					}
				}
			}
		});

		let (writer, mut write_rx) = unbounded_channel::<Vec<u8>>();
		let writer_task = tokio::spawn(async move {
			while let Some(bytes) = write_rx.recv().await {
				if write_half.write_all(&bytes).await.is_err() {
					break;
				}
			}
		});

		let mut session = Session::new(id, addr, inbound, self.magic, now_millis());
		session.rtt_ms = rtt;
		self.sessions.insert(id, session);
		self.io.insert(
			id,
			SessionIo {
				writer,
				reader,
				writer_task,
			},
		);
		id
	}

	fn on_data(&mut self, id: u64, bytes: Vec<u8>, now: i64) {
		let messages = {
			let session = match self.sessions.get_mut(&id) {
				Some(session) => session,
				None => return,
			};
			match session.handle_data(&bytes, now) {
				Ok(messages) => messages,
				Err(e) => {
					self.close_session(id, &e);
					return;
				}
			}
		};
		let host = self.host.clone();
		for msg in messages {
			let outcome = match self.sessions.get_mut(&id) {
				Some(session) => session.handle_message(msg, &host),
				None => return,
			};
			match outcome {
				Ok(SessionEvent::None) => {}
				Ok(SessionEvent::Ready) => {
					let (addr, rtt, inbound) = {
						let session = &self.sessions[&id];
						(session.addr, session.rtt_ms, session.inbound)
					};
					info!("node: peer {} ready ({})", addr, if inbound { "in" } else { "out" });
					if !inbound {
						self.pool.set_connected(&addr, rtt);
					}
					self.sync.add_session(&mut self.sessions, &self.cache, now);
				}
				Ok(SessionEvent::Addrs(addrs)) => {
					if self.config.direct_node.is_none() {
						for addr in addrs {
							self.pool.add_peer(addr, now);
						}
					}
				}
				Ok(SessionEvent::Headers(headers)) => {
					self.sync
						.handle_headers(id, headers, &mut self.sessions, &mut self.cache, now);
				}
				Ok(SessionEvent::Block(block)) => {
					self.sync
						.handle_block(id, *block, &mut self.sessions, &mut self.cache);
				}
				Err(e) => {
					self.close_session(id, &e);
					return;
				}
			}
		}
		self.flush_outbound();
	}

	fn close_session(&mut self, id: u64, err: &Error) {
		let now = now_millis();
		if let Some(mut session) = self.sessions.remove(&id) {
			warn!("node: closing session {}: {}", session.addr, err);
			let was_connected = session.state == SessionState::Ready;
			session.state = SessionState::Closed;
			if !session.inbound {
				self.pool
					.set_disconnected(&session.addr, err.disconnect_code(), was_connected, now);
			}
		}
		if let Some(io) = self.io.remove(&id) {
			// dropping the writer ends its task and releases the socket
			io.reader.abort();
			drop(io.writer);
			drop(io.writer_task);
		}
		self.sync.remove_session(id, &mut self.sessions, &self.cache, now);
	}

	fn flush_session(&mut self, id: u64) {
		let messages = match self.sessions.get_mut(&id) {
			Some(session) => session.take_outbound(),
			None => return,
		};
		if messages.is_empty() {
			return;
		}
		let writer = match self.io.get(&id) {
			Some(io) => io.writer.clone(),
			None => return,
		};
		for msg in messages {
			match encode_message(self.magic, &msg) {
				Ok(bytes) => {
					let _ = writer.send(bytes);
				}
				Err(e) => {
					error!("node: failed to encode {}: {}", msg.command(), e);
				}
			}
		}
	}

	fn flush_outbound(&mut self) {
		let ids: Vec<u64> = self.sessions.keys().copied().collect();
		for id in ids {
			self.flush_session(id);
		}
	}
}
