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

//! Logging, hex conversion and synchronization helpers used by all the
//! other halley crates.

#[macro_use]
extern crate log;

pub mod hex;
pub mod logger;

pub use crate::hex::{from_hex, to_hex};
pub use crate::logger::init_logger;

/// Current wall clock in milliseconds since the unix epoch. The peer pool,
/// flush cooldowns and sync pacing all take explicit timestamps so tests
/// can drive the clock.
pub fn now_millis() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	match SystemTime::now().duration_since(UNIX_EPOCH) {
		Ok(d) => d.as_millis() as i64,
		Err(e) => {
			warn!("system clock before unix epoch: {}", e);
			0
		}
	}
}
