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

//! Main entry point for the halley node: parse the config file, open the
//! chain, then run the network loop until the process is terminated.

#[macro_use]
extern crate log;

mod config;

use std::fs;
use std::path::Path;
use std::process;

use clap::{App, Arg};
use num_bigint::BigUint;

use halley_chain::BlockCache;
use halley_core::params::ChainParams;
use halley_p2p::{NodeManager, P2PConfig, PeerAddr};

use crate::config::NodeConfig;

/// Exit code for a missing or unusable data directory.
const EXIT_BAD_DATA_DIR: i32 = 11;

fn main() {
	let matches = App::new("halley")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Lightweight Bitcoin-compatible peer node")
		.arg(
			Arg::with_name("config")
				.long("conf")
				.takes_value(true)
				.default_value("halley.conf")
				.help("Path of the configuration file"),
		)
		.get_matches();

	let config_path = matches.value_of("config").unwrap_or("halley.conf");
	let config = match NodeConfig::parse_file(config_path) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("unable to read config {}: {}", config_path, e);
			NodeConfig::default()
		}
	};

	if config.data_dir.is_empty() || fs::create_dir_all(&config.data_dir).is_err() {
		eprintln!("invalid data dir: {:?}", config.data_dir);
		process::exit(EXIT_BAD_DATA_DIR);
	}

	let log_file = format!("{}/halley.log", config.data_dir);
	util::init_logger(log::LevelFilter::Info, Some(log_file.as_str()));
	info!("halley starting with config {:?}", config);

	let params = if config.test_net {
		ChainParams::testnet()
	} else {
		ChainParams::mainnet()
	};

	let cache = match BlockCache::open(Path::new(&config.data_dir), config.db_cache, params) {
		Ok(cache) => cache,
		Err(e) => {
			error!("failed to open chain data: {}", e);
			process::exit(1);
		}
	};

	let direct_node = if config.direct_node.is_empty() {
		None
	} else {
		let parsed = PeerAddr::parse(&config.direct_node);
		if parsed.is_none() {
			warn!("ignoring unparsable directNode {:?}", config.direct_node);
		}
		parsed
	};
	let minimum_chain_work = BigUint::parse_bytes(config.minimum_chain_work.as_bytes(), 16)
		.unwrap_or_else(|| {
			warn!(
				"ignoring unparsable minimumChainWork {:?}",
				config.minimum_chain_work
			);
			BigUint::from(0u32)
		});

	let p2p_config = P2PConfig {
		listen_port: config.tcp_port,
		max_peer_count: config.max_node_count,
		dial_batch: 5,
		connect_interval_ms: config.connect_interval as i64 * 1000,
		direct_node,
		minimum_chain_work,
	};

	let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
		Ok(runtime) => runtime,
		Err(e) => {
			error!("failed to build runtime: {}", e);
			process::exit(1);
		}
	};
	let manager = NodeManager::new(cache, p2p_config);
	if let Err(e) = runtime.block_on(manager.run()) {
		error!("node terminated: {}", e);
		process::exit(1);
	}
}
