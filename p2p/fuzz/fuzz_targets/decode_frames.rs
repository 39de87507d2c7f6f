#![no_main]
#[macro_use]
extern crate libfuzzer_sys;
extern crate halley_p2p;

use halley_p2p::msg::MessageDecoder;

fuzz_target!(|data: &[u8]| {
	let mut decoder = MessageDecoder::new(0xD9B4BEF9);
	let _ = decoder.feed(data);
});
