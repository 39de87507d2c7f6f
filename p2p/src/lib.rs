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

//! Networking code to spread and sync the chain: message framing and
//! codec, per-peer sessions with the handshake state machine, the peer
//! pool, outbound dialing, DNS seed discovery and the block synchronizer.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;

use halley_core as core;

pub mod connector;
pub mod discover;
pub mod manager;
pub mod msg;
pub mod pool;
pub mod session;
pub mod sync;
pub mod types;

pub use crate::manager::NodeManager;
pub use crate::msg::{Message, MessageDecoder, MsgHeader};
pub use crate::pool::{PeerPool, PeerState};
pub use crate::session::{Session, SessionState};
pub use crate::sync::BlockSynchronizer;
pub use crate::types::{Error, P2PConfig, PeerAddr};
