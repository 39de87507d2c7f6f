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

//! Logging wrapper around log4rs: console output always, plus an optional
//! size-rolled log file under the data directory.

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Rotate log files beyond this size.
const LOG_FILE_SIZE_LIMIT: u64 = 16 * 1024 * 1024;
const LOG_FILE_ROTATE_COUNT: u32 = 4;

/// Initialize the global logger. Called once from the binary; tests rely on
/// env_logger instead.
pub fn init_logger(level: LevelFilter, log_file: Option<&str>) {
	let pattern = "{d(%Y%m%d %H:%M:%S%.3f)} {h({l})} {M} - {m}{n}";
	let stdout = ConsoleAppender::builder()
		.encoder(Box::new(PatternEncoder::new(pattern)))
		.build();

	let mut config = Config::builder().appender(Appender::builder().build("stdout", Box::new(stdout)));
	let mut root = Root::builder().appender("stdout");

	if let Some(path) = log_file {
		let roller = FixedWindowRoller::builder()
			.build(&format!("{}.{{}}.gz", path), LOG_FILE_ROTATE_COUNT)
			.expect("invalid log file roll pattern");
		let policy = CompoundPolicy::new(
			Box::new(SizeTrigger::new(LOG_FILE_SIZE_LIMIT)),
			Box::new(roller),
		);
		let file = RollingFileAppender::builder()
			.encoder(Box::new(PatternEncoder::new(pattern)))
			.build(path, Box::new(policy))
			.expect("unable to open log file");
		config = config.appender(Appender::builder().build("file", Box::new(file)));
		root = root.appender("file");
	}

	let config = config
		.build(root.build(level))
		.expect("unable to build logging config");
	let _ = log4rs::init_config(config);
}
