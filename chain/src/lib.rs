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

//! The block chain itself: the header index tree, the active chain, the
//! UTXO view, block file storage and full block validation, orchestrated
//! by the block cache.

#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]

#[macro_use]
extern crate failure_derive;
#[macro_use]
extern crate log;

use halley_core as core;

pub mod blockfiles;
pub mod cache;
pub mod chain;
pub mod coins;
pub mod disk;
pub mod error;
pub mod index;
pub mod store;
pub mod types;
pub mod validate;

pub use crate::cache::BlockCache;
pub use crate::chain::ActiveChain;
pub use crate::coins::{Coin, CoinView};
pub use crate::error::Error;
pub use crate::index::{BlockIndexTree, NodeId};
pub use crate::types::{BlockFileInfo, BlockIndexEntry, DiskBlockPos};
