#![no_main]
extern crate halley_core;
#[macro_use]
extern crate libfuzzer_sys;

use halley_core::core::block::Block;
use halley_core::ser;

fuzz_target!(|data: &[u8]| {
	let _t: Result<Block, ser::Error> = ser::deserialize(data);
});
