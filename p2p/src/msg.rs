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

//! Message types that transit on the network and the framing codec:
//! `magic ‖ command ‖ length ‖ checksum ‖ payload`, with the checksum
//! being the first four bytes of the payload's double SHA-256.

use crate::core::consensus::{
	MAX_ADDR_ITEMS, MAX_HEADERS_PER_MSG, MAX_INV_ITEMS, MAX_LOCATOR_HASHES, MAX_MSG_SIZE,
	MAX_REJECT_MESSAGE_SIZE, MAX_REJECT_REASON_SIZE, MAX_USER_AGENT_SIZE,
};
use crate::core::core::block::{Block, BlockHeader};
use crate::core::core::hash::{hash_bytes, Hash};
use crate::core::core::transaction::Transaction;
use crate::core::ser::{self, BinReader, BinWriter, Readable, Reader, Writeable, Writer};
use crate::types::{Error, PeerAddr};
use std::net::Ipv4Addr;

/// Size of the fixed message header.
pub const MSG_HEADER_SIZE: usize = 24;
/// Inventory item type for a transaction.
pub const INV_TX: u32 = 1;
/// Inventory item type for a block.
pub const INV_BLOCK: u32 = 2;

/// Hard cap on the codec's internal reassembly buffer: one maximum
/// message plus a read chunk.
const MAX_DECODER_BUFFER: usize = MAX_MSG_SIZE as usize + 64 * 1024;

/// The fixed frame header prefixed to every message.
#[derive(Clone, Debug, PartialEq)]
pub struct MsgHeader {
	/// Per-chain network magic
	pub magic: u32,
	/// ASCII command name
	pub command: String,
	/// Payload length in bytes
	pub length: u32,
	/// First four bytes of the payload's double SHA-256
	pub checksum: u32,
}

fn parse_command(bytes: &[u8]) -> Result<String, Error> {
	let end = match bytes.iter().position(|b| *b == 0) {
		Some(end) => end,
		None => return Err(Error::BadCommand),
	};
	if bytes[end..].iter().any(|b| *b != 0) {
		return Err(Error::BadCommand);
	}
	let cmd = &bytes[..end];
	if !cmd.iter().all(|b| b.is_ascii_graphic()) {
		return Err(Error::BadCommand);
	}
	Ok(String::from_utf8_lossy(cmd).into_owned())
}

impl MsgHeader {
	fn read(reader: &mut BinReader<'_>) -> Result<MsgHeader, Error> {
		let magic = reader.read_u32()?;
		let command_bytes = reader.read_fixed_bytes(12)?;
		let length = reader.read_u32()?;
		let checksum = reader.read_u32()?;
		let command = parse_command(&command_bytes)?;
		Ok(MsgHeader {
			magic,
			command,
			length,
			checksum,
		})
	}
}

/// A network address as carried inside version and addr messages:
/// services, an IPv4-mapped IPv6 address and a big-endian port.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NetAddress {
	/// Service bits advertised for the address
	pub services: u64,
	/// The endpoint itself
	pub addr: PeerAddr,
}

impl Readable for NetAddress {
	fn read(reader: &mut dyn Reader) -> Result<NetAddress, ser::Error> {
		let services = reader.read_u64()?;
		// ten zero bytes and the 0xFFFF v4-mapping marker
		let _prefix = reader.read_fixed_bytes(12)?;
		let ip_bytes = reader.read_fixed_bytes(4)?;
		let ip = Ipv4Addr::new(ip_bytes[0], ip_bytes[1], ip_bytes[2], ip_bytes[3]);
		// port is the one big-endian field of the protocol
		let port_bytes = reader.read_fixed_bytes(2)?;
		let port = u16::from_be_bytes([port_bytes[0], port_bytes[1]]);
		Ok(NetAddress {
			services,
			addr: PeerAddr::new(ip, port),
		})
	}
}

impl Writeable for NetAddress {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u64(self.services)?;
		let mut prefix = [0u8; 12];
		if !self.addr.ip.is_unspecified() {
			prefix[10] = 0xFF;
			prefix[11] = 0xFF;
		}
		writer.write_fixed_bytes(&prefix)?;
		writer.write_fixed_bytes(&self.addr.ip.octets())?;
		writer.write_fixed_bytes(&self.addr.port.to_be_bytes())
	}
}

/// The version handshake message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VersionMsg {
	/// Protocol version spoken by the sender
	pub version: u32,
	/// Services advertised by the sender
	pub services: u64,
	/// Sender's wall clock
	pub timestamp: u64,
	/// The receiver's address as the sender sees it
	pub your_addr: NetAddress,
	/// The sender's own address
	pub my_addr: NetAddress,
	/// Random nonce to detect self-connections
	pub nonce: u64,
	/// Sender software identification
	pub user_agent: String,
	/// Height of the sender's best chain
	pub start_height: i32,
	/// Whether the sender wants full transaction relay
	pub relay: bool,
}

impl Readable for VersionMsg {
	fn read(reader: &mut dyn Reader) -> Result<VersionMsg, ser::Error> {
		let mut msg = VersionMsg::default();
		msg.version = reader.read_u32()?;
		msg.services = reader.read_u64()?;
		msg.timestamp = reader.read_u64()?;
		msg.your_addr = NetAddress::read(reader)?;
		// later fields appeared over protocol history
		if reader.remaining() > 0 {
			msg.my_addr = NetAddress::read(reader)?;
			msg.nonce = reader.read_u64()?;
		}
		if reader.remaining() > 0 {
			let agent = reader.read_bytes(MAX_USER_AGENT_SIZE)?;
			msg.user_agent = String::from_utf8_lossy(&agent).into_owned();
		}
		if reader.remaining() > 0 {
			msg.start_height = reader.read_i32()?;
			msg.relay = reader.read_u8()? != 0;
		}
		Ok(msg)
	}
}

impl Writeable for VersionMsg {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		writer.write_u64(self.services)?;
		writer.write_u64(self.timestamp)?;
		self.your_addr.write(writer)?;
		self.my_addr.write(writer)?;
		writer.write_u64(self.nonce)?;
		writer.write_bytes(self.user_agent.as_bytes())?;
		writer.write_i32(self.start_height)?;
		writer.write_u8(self.relay as u8)
	}
}

/// A timestamped address relayed by addr messages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimestampedAddress {
	/// Last time the address was seen, per the sender
	pub timestamp: u32,
	/// The address itself
	pub address: NetAddress,
}

impl Readable for TimestampedAddress {
	fn read(reader: &mut dyn Reader) -> Result<TimestampedAddress, ser::Error> {
		let timestamp = reader.read_u32()?;
		let address = NetAddress::read(reader)?;
		Ok(TimestampedAddress { timestamp, address })
	}
}

impl Writeable for TimestampedAddress {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.timestamp)?;
		self.address.write(writer)
	}
}

/// One entry of an inv, getdata or notfound message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InvItem {
	/// What the hash refers to
	pub inv_type: u32,
	/// Hash of the object
	pub hash: Hash,
}

impl InvItem {
	/// Inventory entry for a block.
	pub fn block(hash: Hash) -> InvItem {
		InvItem {
			inv_type: INV_BLOCK,
			hash,
		}
	}
}

impl Readable for InvItem {
	fn read(reader: &mut dyn Reader) -> Result<InvItem, ser::Error> {
		let inv_type = reader.read_u32()?;
		let hash = Hash::read(reader)?;
		Ok(InvItem { inv_type, hash })
	}
}

impl Writeable for InvItem {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.inv_type)?;
		self.hash.write(writer)
	}
}

/// Locator-based request used by getheaders and getblocks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LocatorMsg {
	/// Protocol version
	pub version: u32,
	/// Block hashes, densest near the tip
	pub hashes: Vec<Hash>,
	/// Where to stop, zero for "as many as possible"
	pub stop_hash: Hash,
}

impl Readable for LocatorMsg {
	fn read(reader: &mut dyn Reader) -> Result<LocatorMsg, ser::Error> {
		let version = reader.read_u32()?;
		let hashes = ser::read_vec(reader, MAX_LOCATOR_HASHES)?;
		let stop_hash = Hash::read(reader)?;
		Ok(LocatorMsg {
			version,
			hashes,
			stop_hash,
		})
	}
}

impl Writeable for LocatorMsg {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u32(self.version)?;
		ser::write_vec(writer, &self.hashes)?;
		self.stop_hash.write(writer)
	}
}

/// A rejection notice from the remote.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RejectMsg {
	/// Command being rejected
	pub message: String,
	/// Machine-readable reject code
	pub code: u8,
	/// Human-readable reason
	pub reason: String,
	/// Extra data, often the offending hash
	pub data: Vec<u8>,
}

impl Readable for RejectMsg {
	fn read(reader: &mut dyn Reader) -> Result<RejectMsg, ser::Error> {
		let message = reader.read_bytes(MAX_REJECT_MESSAGE_SIZE)?;
		let code = reader.read_u8()?;
		let reason = reader.read_bytes(MAX_REJECT_REASON_SIZE)?;
		let data = reader.read_fixed_bytes(reader.remaining())?;
		Ok(RejectMsg {
			message: String::from_utf8_lossy(&message).into_owned(),
			code,
			reason: String::from_utf8_lossy(&reason).into_owned(),
			data,
		})
	}
}

impl Writeable for RejectMsg {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_bytes(self.message.as_bytes())?;
		writer.write_u8(self.code)?;
		writer.write_bytes(self.reason.as_bytes())?;
		writer.write_fixed_bytes(&self.data)
	}
}

/// Compact block announcement preference.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SendCmpctMsg {
	/// Whether to announce via cmpctblock
	pub announce: bool,
	/// Compact block protocol version
	pub version: u64,
}

impl Readable for SendCmpctMsg {
	fn read(reader: &mut dyn Reader) -> Result<SendCmpctMsg, ser::Error> {
		let announce = reader.read_u8()? != 0;
		let version = reader.read_u64()?;
		Ok(SendCmpctMsg { announce, version })
	}
}

impl Writeable for SendCmpctMsg {
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		writer.write_u8(self.announce as u8)?;
		writer.write_u64(self.version)
	}
}

/// All the messages this node understands, inbound and outbound alike.
/// Commands that are accepted but carry no behavior decode to `Ignored`;
/// unrecognized commands decode to `Unknown` and are dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
	Version(VersionMsg),
	Verack,
	Ping(u64),
	Pong(u64),
	GetAddr,
	Addr(Vec<TimestampedAddress>),
	Inv(Vec<InvItem>),
	GetData(Vec<InvItem>),
	NotFound(Vec<InvItem>),
	GetBlocks(LocatorMsg),
	GetHeaders(LocatorMsg),
	Headers(Vec<BlockHeader>),
	Block(Box<Block>),
	Tx(Box<Transaction>),
	Reject(RejectMsg),
	SendHeaders,
	SendCmpct(SendCmpctMsg),
	FeeFilter(i64),
	/// Known command this node deliberately does nothing with
	Ignored(String),
	/// Command outside the protocol as this node knows it
	Unknown(String),
}

/// Commands this node accepts without acting on them.
const IGNORED_COMMANDS: [&str; 9] = [
	"mempool",
	"filterload",
	"filteradd",
	"filterclear",
	"merkleblock",
	"alert",
	"cmpctblock",
	"getblocktxn",
	"blocktxn",
];

impl Message {
	/// The wire command for an outbound message.
	pub fn command(&self) -> &'static str {
		match self {
			Message::Version(_) => "version",
			Message::Verack => "verack",
			Message::Ping(_) => "ping",
			Message::Pong(_) => "pong",
			Message::GetAddr => "getaddr",
			Message::Addr(_) => "addr",
			Message::Inv(_) => "inv",
			Message::GetData(_) => "getdata",
			Message::NotFound(_) => "notfound",
			Message::GetBlocks(_) => "getblocks",
			Message::GetHeaders(_) => "getheaders",
			Message::Headers(_) => "headers",
			Message::Block(_) => "block",
			Message::Tx(_) => "tx",
			Message::Reject(_) => "reject",
			Message::SendHeaders => "sendheaders",
			Message::SendCmpct(_) => "sendcmpct",
			Message::FeeFilter(_) => "feefilter",
			Message::Ignored(_) | Message::Unknown(_) => "",
		}
	}

	fn write_payload<W: Writer>(&self, writer: &mut W) -> Result<(), ser::Error> {
		match self {
			Message::Version(msg) => msg.write(writer),
			Message::Verack | Message::GetAddr | Message::SendHeaders => Ok(()),
			Message::Ping(nonce) | Message::Pong(nonce) => writer.write_u64(*nonce),
			Message::Addr(addrs) => ser::write_vec(writer, addrs),
			Message::Inv(items) | Message::GetData(items) | Message::NotFound(items) => {
				ser::write_vec(writer, items)
			}
			Message::GetBlocks(msg) | Message::GetHeaders(msg) => msg.write(writer),
			Message::Headers(headers) => {
				writer.write_compact_size(headers.len() as u64)?;
				for header in headers {
					header.write(writer)?;
					// headers on the wire carry a zero tx count
					writer.write_u8(0)?;
				}
				Ok(())
			}
			Message::Block(block) => block.write(writer),
			Message::Tx(tx) => tx.write(writer),
			Message::Reject(msg) => msg.write(writer),
			Message::SendCmpct(msg) => msg.write(writer),
			Message::FeeFilter(rate) => writer.write_i64(*rate),
			Message::Ignored(_) | Message::Unknown(_) => Err(ser::Error::CorruptedData),
		}
	}
}

fn read_headers(reader: &mut dyn Reader) -> Result<Vec<BlockHeader>, ser::Error> {
	let count = reader.read_compact_size()?;
	if count > MAX_HEADERS_PER_MSG as u64 {
		return Err(ser::Error::CountError(count));
	}
	let mut headers = Vec::with_capacity(count as usize);
	for _ in 0..count {
		headers.push(BlockHeader::read(reader)?);
		let tx_count = reader.read_compact_size()?;
		if tx_count != 0 {
			return Err(ser::Error::CorruptedData);
		}
	}
	Ok(headers)
}

/// Decode a framed payload into a typed message.
pub fn decode_message(header: &MsgHeader, payload: &[u8]) -> Result<Message, Error> {
	let mut reader = BinReader::new(payload);
	let msg = match header.command.as_str() {
		"version" => Message::Version(VersionMsg::read(&mut reader)?),
		"verack" => Message::Verack,
		"ping" => Message::Ping(reader.read_u64()?),
		"pong" => Message::Pong(reader.read_u64()?),
		"getaddr" => Message::GetAddr,
		"addr" => Message::Addr(ser::read_vec(&mut reader, MAX_ADDR_ITEMS)?),
		"inv" => Message::Inv(ser::read_vec(&mut reader, MAX_INV_ITEMS)?),
		"getdata" => Message::GetData(ser::read_vec(&mut reader, MAX_INV_ITEMS)?),
		"notfound" => Message::NotFound(ser::read_vec(&mut reader, MAX_INV_ITEMS)?),
		"headers" => Message::Headers(read_headers(&mut reader)?),
		"block" => Message::Block(Box::new(Block::read(&mut reader)?)),
		"tx" => Message::Tx(Box::new(Transaction::read(&mut reader)?)),
		"reject" => Message::Reject(RejectMsg::read(&mut reader)?),
		"sendheaders" => Message::SendHeaders,
		"sendcmpct" => Message::SendCmpct(SendCmpctMsg::read(&mut reader)?),
		"feefilter" => Message::FeeFilter(reader.read_i64()?),
		cmd if IGNORED_COMMANDS.contains(&cmd) => Message::Ignored(header.command.clone()),
		_ => Message::Unknown(header.command.clone()),
	};
	Ok(msg)
}

/// Frame an outbound message: header with length and checksum, then the
/// payload.
pub fn encode_message(magic: u32, msg: &Message) -> Result<Vec<u8>, ser::Error> {
	let mut payload = Vec::with_capacity(256);
	{
		let mut writer = BinWriter::new(&mut payload);
		msg.write_payload(&mut writer)?;
	}
	let digest = hash_bytes(&payload);
	let checksum = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);

	let mut out = Vec::with_capacity(MSG_HEADER_SIZE + payload.len());
	{
		let mut writer = BinWriter::new(&mut out);
		writer.write_u32(magic)?;
		let mut command = [0u8; 12];
		let name = msg.command().as_bytes();
		command[..name.len()].copy_from_slice(name);
		writer.write_fixed_bytes(&command)?;
		writer.write_u32(payload.len() as u32)?;
		writer.write_u32(checksum)?;
		writer.write_fixed_bytes(&payload)?;
	}
	Ok(out)
}

/// Streaming frame extractor. Bytes are fed as they arrive; complete
/// frames come out, partial trailing bytes are retained. Any framing
/// violation is a hard error and the caller disconnects the peer.
pub struct MessageDecoder {
	magic: u32,
	buffer: Vec<u8>,
}

impl MessageDecoder {
	/// Decoder for one peer connection.
	pub fn new(magic: u32) -> MessageDecoder {
		MessageDecoder {
			magic,
			buffer: vec![],
		}
	}

	/// Append incoming bytes and extract as many complete messages as
	/// possible.
	pub fn feed(&mut self, data: &[u8]) -> Result<Vec<(MsgHeader, Vec<u8>)>, Error> {
		if self.buffer.len() + data.len() > MAX_DECODER_BUFFER {
			return Err(Error::OversizedMessage(
				(self.buffer.len() + data.len()) as u64,
			));
		}
		self.buffer.extend_from_slice(data);
		let mut frames = vec![];
		let mut consumed = 0usize;
		loop {
			match self.decode_one(&self.buffer[consumed..]) {
				Ok(Some((header, payload, size))) => {
					frames.push((header, payload));
					consumed += size;
				}
				Ok(None) => break,
				Err(e) => return Err(e),
			}
		}
		if consumed > 0 {
			self.buffer.drain(..consumed);
		}
		Ok(frames)
	}

	fn decode_one(&self, data: &[u8]) -> Result<Option<(MsgHeader, Vec<u8>, usize)>, Error> {
		if data.len() < MSG_HEADER_SIZE {
			return Ok(None);
		}
		let mut reader = BinReader::new(data);
		let header = MsgHeader::read(&mut reader)?;
		if header.magic != self.magic {
			return Err(Error::BadMagic(header.magic));
		}
		if header.length as u64 > MAX_MSG_SIZE {
			return Err(Error::OversizedMessage(header.length as u64));
		}
		let total = MSG_HEADER_SIZE + header.length as usize;
		if data.len() < total {
			return Ok(None);
		}
		let payload = &data[MSG_HEADER_SIZE..total];
		let digest = hash_bytes(payload);
		let checksum = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
		if checksum != header.checksum {
			return Err(Error::BadChecksum);
		}
		Ok(Some((header, payload.to_vec(), total)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::core::core::hash::ZERO_HASH;

	fn roundtrip(msg: Message) {
		let magic = 0xD9B4BEF9;
		let bytes = encode_message(magic, &msg).unwrap();
		let mut decoder = MessageDecoder::new(magic);
		let frames = decoder.feed(&bytes).unwrap();
		assert_eq!(frames.len(), 1);
		let decoded = decode_message(&frames[0].0, &frames[0].1).unwrap();
		assert_eq!(decoded, msg);
	}

	#[test]
	fn roundtrip_simple_messages() {
		roundtrip(Message::Verack);
		roundtrip(Message::GetAddr);
		roundtrip(Message::SendHeaders);
		roundtrip(Message::Ping(0x1122334455667788));
		roundtrip(Message::Pong(42));
		roundtrip(Message::FeeFilter(1000));
		roundtrip(Message::SendCmpct(SendCmpctMsg {
			announce: false,
			version: 1,
		}));
	}

	#[test]
	fn roundtrip_version() {
		let msg = VersionMsg {
			version: 70015,
			services: 1,
			timestamp: 0x5ab71471,
			your_addr: NetAddress {
				services: 1,
				addr: PeerAddr::parse("45.63.75.41:8333").unwrap(),
			},
			my_addr: NetAddress::default(),
			nonce: 0xb294b9071f019ecc,
			user_agent: "/halley:0.1.0/".to_string(),
			start_height: 0,
			relay: false,
		};
		roundtrip(Message::Version(msg));
	}

	#[test]
	fn roundtrip_structured_messages() {
		roundtrip(Message::Addr(vec![TimestampedAddress {
			timestamp: 1_500_000_000,
			address: NetAddress {
				services: 1,
				addr: PeerAddr::parse("10.0.0.1:8333").unwrap(),
			},
		}]));
		roundtrip(Message::Inv(vec![InvItem::block(hash_bytes(b"block"))]));
		roundtrip(Message::GetData(vec![InvItem {
			inv_type: INV_TX,
			hash: hash_bytes(b"tx"),
		}]));
		roundtrip(Message::GetHeaders(LocatorMsg {
			version: 70015,
			hashes: vec![hash_bytes(b"a"), hash_bytes(b"b")],
			stop_hash: ZERO_HASH,
		}));
		roundtrip(Message::Headers(vec![BlockHeader::default()]));
		roundtrip(Message::Reject(RejectMsg {
			message: "version".to_string(),
			code: 0x11,
			reason: "obsolete".to_string(),
			data: vec![],
		}));
		roundtrip(Message::Block(Box::new(Block::default())));
	}

	#[test]
	fn partial_feed_retains_bytes() {
		let magic = 0xD9B4BEF9;
		let bytes = encode_message(magic, &Message::Ping(7)).unwrap();
		let mut decoder = MessageDecoder::new(magic);
		let split = bytes.len() - 3;
		assert!(decoder.feed(&bytes[..split]).unwrap().is_empty());
		let frames = decoder.feed(&bytes[split..]).unwrap();
		assert_eq!(frames.len(), 1);
		assert_eq!(frames[0].0.command, "ping");
	}

	#[test]
	fn two_messages_in_one_feed() {
		let magic = 0xD9B4BEF9;
		let mut bytes = encode_message(magic, &Message::Ping(1)).unwrap();
		bytes.extend(encode_message(magic, &Message::Pong(2)).unwrap());
		let mut decoder = MessageDecoder::new(magic);
		let frames = decoder.feed(&bytes).unwrap();
		assert_eq!(frames.len(), 2);
	}

	#[test]
	fn bad_magic_is_fatal() {
		let bytes = encode_message(0x0709110B, &Message::Ping(7)).unwrap();
		let mut decoder = MessageDecoder::new(0xD9B4BEF9);
		match decoder.feed(&bytes) {
			Err(Error::BadMagic(0x0709110B)) => {}
			other => panic!("expected bad magic, got {:?}", other.map(|f| f.len())),
		}
	}

	#[test]
	fn bad_checksum_is_fatal() {
		let magic = 0xD9B4BEF9;
		let mut bytes = encode_message(magic, &Message::Ping(7)).unwrap();
		let last = bytes.len() - 1;
		bytes[last] ^= 0xFF;
		let mut decoder = MessageDecoder::new(magic);
		assert!(decoder.feed(&bytes).is_err());
	}

	#[test]
	fn unterminated_command_is_fatal() {
		let magic: u32 = 0xD9B4BEF9;
		let mut bytes = vec![];
		bytes.extend_from_slice(&magic.to_le_bytes());
		bytes.extend_from_slice(b"commandtoolo"); // 12 bytes, no NUL
		bytes.extend_from_slice(&0u32.to_le_bytes());
		bytes.extend_from_slice(&0u32.to_le_bytes());
		let mut decoder = MessageDecoder::new(magic);
		assert!(decoder.feed(&bytes).is_err());
	}

	#[test]
	fn unknown_command_is_not_fatal() {
		let magic: u32 = 0xD9B4BEF9;
		// hand-frame an empty-payload message with a novel command
		let payload: Vec<u8> = vec![];
		let digest = hash_bytes(&payload);
		let mut bytes = vec![];
		bytes.extend_from_slice(&magic.to_le_bytes());
		let mut command = [0u8; 12];
		command[..7].copy_from_slice(b"frobble");
		bytes.extend_from_slice(&command);
		bytes.extend_from_slice(&0u32.to_le_bytes());
		bytes.extend_from_slice(&digest.as_bytes()[..4]);
		let mut decoder = MessageDecoder::new(magic);
		let frames = decoder.feed(&bytes).unwrap();
		assert_eq!(frames.len(), 1);
		let msg = decode_message(&frames[0].0, &frames[0].1).unwrap();
		assert_eq!(msg, Message::Unknown("frobble".to_string()));
	}

	#[test]
	fn headers_tx_count_must_be_zero() {
		let magic = 0xD9B4BEF9;
		let bytes = encode_message(magic, &Message::Headers(vec![BlockHeader::default()])).unwrap();
		// the final byte is the tx count
		let mut tampered = bytes.clone();
		let last = tampered.len() - 1;
		tampered[last] = 1;
		// fix up the checksum for the tampered payload
		let payload = &tampered[MSG_HEADER_SIZE..].to_vec();
		let digest = hash_bytes(payload);
		tampered[20..24].copy_from_slice(&digest.as_bytes()[..4]);
		let mut decoder = MessageDecoder::new(magic);
		let frames = decoder.feed(&tampered).unwrap();
		assert!(decode_message(&frames[0].0, &frames[0].1).is_err());
	}
}
