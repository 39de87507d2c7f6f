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

//! Node configuration: a single key=value file.

use std::fs;
use std::io;

/// Work below which no peer is considered a useful block source.
const DEFAULT_MINIMUM_CHAIN_WORK: &str =
	"00000000000000000000000000000000000000000000000000000000000000cc";

/// Everything the node can be configured with.
#[derive(Clone, Debug)]
pub struct NodeConfig {
	/// Listening TCP port
	pub tcp_port: u16,
	/// Operator HTTP port; parsed for completeness, no server behind it
	pub http_port: u16,
	/// Target outbound peer count
	pub max_node_count: usize,
	/// Seconds of backoff before redialing a failed peer
	pub connect_interval: u64,
	/// Directory for block files and databases; required
	pub data_dir: String,
	/// Byte budget for the database caches
	pub db_cache: usize,
	/// When set, dial only this `host:port`
	pub direct_node: String,
	/// Run against the test network
	pub test_net: bool,
	/// Minimum chainwork of a block-download peer, big-endian hex
	pub minimum_chain_work: String,
}

impl Default for NodeConfig {
	fn default() -> NodeConfig {
		NodeConfig {
			tcp_port: 18333,
			http_port: 18080,
			max_node_count: 30,
			connect_interval: 30,
			data_dir: String::new(),
			db_cache: 450 * 1024 * 1024,
			direct_node: String::new(),
			test_net: false,
			minimum_chain_work: DEFAULT_MINIMUM_CHAIN_WORK.to_string(),
		}
	}
}

fn parse_bool(value: &str) -> bool {
	matches!(value, "1" | "true" | "yes" | "on")
}

/// Byte counts accept an optional KB/MB/GB suffix and default to
/// megabytes, the unit the setting is documented in.
fn parse_byte_count(value: &str) -> Option<usize> {
	let value = value.trim();
	let split = value.find(|c: char| c.is_ascii_alphabetic()).unwrap_or(value.len());
	let number: usize = value[..split].trim().parse().ok()?;
	let unit = match value[split..].trim().to_ascii_uppercase().as_str() {
		"" | "MB" | "M" => 1024 * 1024,
		"KB" | "K" => 1024,
		"GB" | "G" => 1024 * 1024 * 1024,
		"B" => 1,
		_ => return None,
	};
	Some(number * unit)
}

impl NodeConfig {
	/// Parse a config file. Unknown keys are logged and skipped; missing
	/// keys keep their defaults.
	pub fn parse_file(path: &str) -> io::Result<NodeConfig> {
		let content = fs::read_to_string(path)?;
		let mut config = NodeConfig::default();
		for (lineno, line) in content.lines().enumerate() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			let (key, value) = match line.find('=') {
				Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
				None => {
					warn!("config: no '=' on line {}: {:?}", lineno + 1, line);
					continue;
				}
			};
			match key {
				"tcpPort" => config.tcp_port = parse_or(value, key, config.tcp_port),
				"httpPort" => config.http_port = parse_or(value, key, config.http_port),
				"maxNodeCount" => {
					config.max_node_count = parse_or(value, key, config.max_node_count)
				}
				"connectInterval" => {
					config.connect_interval = parse_or(value, key, config.connect_interval)
				}
				"dataDir" => config.data_dir = value.to_string(),
				"dbCache" => match parse_byte_count(value) {
					Some(bytes) => config.db_cache = bytes,
					None => warn!("config: bad byte count for dbCache: {:?}", value),
				},
				"directNode" => config.direct_node = value.to_string(),
				"testNet" => config.test_net = parse_bool(value),
				"minimumChainWork" => config.minimum_chain_work = value.to_string(),
				_ => warn!("config: unknown key {:?}", key),
			}
		}
		Ok(config)
	}
}

fn parse_or<T: std::str::FromStr + Copy>(value: &str, key: &str, default: T) -> T {
	match value.parse() {
		Ok(parsed) => parsed,
		Err(_) => {
			warn!("config: unparsable value for {}: {:?}", key, value);
			default
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;

	#[test]
	fn defaults() {
		let config = NodeConfig::default();
		assert_eq!(config.tcp_port, 18333);
		assert_eq!(config.http_port, 18080);
		assert_eq!(config.max_node_count, 30);
		assert_eq!(config.db_cache, 450 * 1024 * 1024);
		assert!(!config.test_net);
		assert!(config.data_dir.is_empty());
	}

	#[test]
	fn parse_a_file() {
		let path = ".halley_test_config.conf";
		fs::write(
			path,
			"# comment\n\
			 tcpPort=8333\n\
			 dataDir=/tmp/halley\n\
			 dbCache=100\n\
			 testNet=true\n\
			 directNode=10.0.0.1:8333\n\
			 bogusKey=1\n",
		)
		.unwrap();
		let config = NodeConfig::parse_file(path).unwrap();
		fs::remove_file(path).unwrap();
		assert_eq!(config.tcp_port, 8333);
		assert_eq!(config.data_dir, "/tmp/halley");
		assert_eq!(config.db_cache, 100 * 1024 * 1024);
		assert!(config.test_net);
		assert_eq!(config.direct_node, "10.0.0.1:8333");
		// untouched key keeps its default
		assert_eq!(config.max_node_count, 30);
	}

	#[test]
	fn byte_counts() {
		assert_eq!(parse_byte_count("450"), Some(450 * 1024 * 1024));
		assert_eq!(parse_byte_count("1GB"), Some(1024 * 1024 * 1024));
		assert_eq!(parse_byte_count("64 KB"), Some(64 * 1024));
		assert_eq!(parse_byte_count("12q"), None);
	}
}
