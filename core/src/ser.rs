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

//! Serialization and deserialization layer specialized for binary encoding.
//! All integers are little-endian, counts use the compact-size encoding and
//! database records use the 7-bit group varint, matching the wire and disk
//! formats of the Bitcoin protocol.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Possible errors deriving from serializing or deserializing.
#[derive(Clone, Eq, PartialEq, Debug, Fail)]
pub enum Error {
	/// Wraps an io error produced when reading or writing
	#[fail(display = "serialization io error: {}", _0)]
	IOErr(String),
	/// Data wasn't in a consumable format
	#[fail(display = "corrupted data")]
	CorruptedData,
	/// A collection was longer than the allowed maximum
	#[fail(display = "count exceeds limit: {}", _0)]
	CountError(u64),
	/// A length-prefixed byte string was longer than the allowed maximum
	#[fail(display = "read exceeds limit: {}", _0)]
	TooLargeReadErr(u64),
	/// Reached the end of the buffer before the item was complete
	#[fail(display = "unexpected end of data")]
	UnexpectedEof,
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		if e.kind() == io::ErrorKind::UnexpectedEof {
			Error::UnexpectedEof
		} else {
			Error::IOErr(format!("{}", e))
		}
	}
}

/// Implementations defined how different numbers and binary structures are
/// written to an underlying stream or container.
pub trait Writer {
	/// Writes a u8 as binary
	fn write_u8(&mut self, n: u8) -> Result<(), Error>;
	/// Writes a u16 as little-endian binary
	fn write_u16(&mut self, n: u16) -> Result<(), Error>;
	/// Writes a u32 as little-endian binary
	fn write_u32(&mut self, n: u32) -> Result<(), Error>;
	/// Writes a u64 as little-endian binary
	fn write_u64(&mut self, n: u64) -> Result<(), Error>;
	/// Writes an i32 as little-endian binary
	fn write_i32(&mut self, n: i32) -> Result<(), Error>;
	/// Writes an i64 as little-endian binary
	fn write_i64(&mut self, n: i64) -> Result<(), Error>;
	/// Writes the provided bytes directly, no length prefix
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error>;

	/// Writes a count using the compact-size encoding
	fn write_compact_size(&mut self, n: u64) -> Result<(), Error> {
		if n < 0xFD {
			self.write_u8(n as u8)
		} else if n <= 0xFFFF {
			self.write_u8(0xFD)?;
			self.write_u16(n as u16)
		} else if n <= 0xFFFF_FFFF {
			self.write_u8(0xFE)?;
			self.write_u32(n as u32)
		} else {
			self.write_u8(0xFF)?;
			self.write_u64(n)
		}
	}

	/// Writes a compact-size length followed by the raw bytes
	fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.write_compact_size(bytes.len() as u64)?;
		self.write_fixed_bytes(bytes)
	}

	/// Writes an integer using the 7-bit group encoding used by the index
	/// database records.
	fn write_varint(&mut self, n: u64) -> Result<(), Error> {
		let mut tmp = [0u8; 10];
		let mut pos = tmp.len() - 1;
		let mut val = n;
		let mut ending = true;
		loop {
			tmp[pos] = (val & 0x7F) as u8 | if ending { 0 } else { 0x80 };
			if val <= 0x7F {
				break;
			}
			val = (val >> 7) - 1;
			pos -= 1;
			ending = false;
		}
		self.write_fixed_bytes(&tmp[pos..])
	}
}

/// Implementations defined how different numbers and binary structures are
/// read from an underlying stream or container.
pub trait Reader {
	/// Read a u8 from the underlying Read
	fn read_u8(&mut self) -> Result<u8, Error>;
	/// Read a little-endian u16 from the underlying Read
	fn read_u16(&mut self) -> Result<u16, Error>;
	/// Read a little-endian u32 from the underlying Read
	fn read_u32(&mut self) -> Result<u32, Error>;
	/// Read a little-endian u64 from the underlying Read
	fn read_u64(&mut self) -> Result<u64, Error>;
	/// Read a little-endian i32 from the underlying Read
	fn read_i32(&mut self) -> Result<i32, Error>;
	/// Read a little-endian i64 from the underlying Read
	fn read_i64(&mut self) -> Result<i64, Error>;
	/// Read exactly the given number of bytes
	fn read_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error>;
	/// Number of bytes left in the underlying source
	fn remaining(&self) -> usize;

	/// Read a compact-size count
	fn read_compact_size(&mut self) -> Result<u64, Error> {
		let tag = self.read_u8()?;
		match tag {
			0xFD => Ok(self.read_u16()? as u64),
			0xFE => Ok(self.read_u32()? as u64),
			0xFF => self.read_u64(),
			n => Ok(n as u64),
		}
	}

	/// Read a compact-size prefixed byte string, refusing anything longer
	/// than `max` bytes.
	fn read_bytes(&mut self, max: usize) -> Result<Vec<u8>, Error> {
		let len = self.read_compact_size()?;
		if len > max as u64 {
			return Err(Error::TooLargeReadErr(len));
		}
		self.read_fixed_bytes(len as usize)
	}

	/// Read an integer in the 7-bit group encoding used by the index
	/// database records.
	fn read_varint(&mut self) -> Result<u64, Error> {
		let mut n: u64 = 0;
		loop {
			if n > (u64::max_value() >> 7) {
				return Err(Error::CorruptedData);
			}
			let byte = self.read_u8()?;
			n = (n << 7) | (byte & 0x7F) as u64;
			if byte & 0x80 != 0 {
				if n == u64::max_value() {
					return Err(Error::CorruptedData);
				}
				n += 1;
			} else {
				return Ok(n);
			}
		}
	}
}

/// Trait that every type that can be serialized as binary must implement.
/// Writes directly to a Writer, a utility type thinly wrapping an
/// underlying Write implementation.
pub trait Writeable {
	/// Write the data held by this Writeable to the provided writer
	fn write<W: Writer>(&self, writer: &mut W) -> Result<(), Error>;
}

/// Trait that every type that can be deserialized from binary must
/// implement. Reads directly to a Reader, a utility type thinly wrapping an
/// underlying Read implementation.
pub trait Readable: Sized {
	/// Reads the data necessary to this Readable from the provided reader
	fn read(reader: &mut dyn Reader) -> Result<Self, Error>;
}

/// Reads a bounded collection of serialized items into a Vec.
pub fn read_vec<T: Readable>(reader: &mut dyn Reader, max: usize) -> Result<Vec<T>, Error> {
	let count = reader.read_compact_size()?;
	if count > max as u64 {
		return Err(Error::CountError(count));
	}
	let mut items = Vec::with_capacity(count as usize);
	for _ in 0..count {
		items.push(T::read(reader)?);
	}
	Ok(items)
}

/// Writes a collection of serialized items with a compact-size count prefix.
pub fn write_vec<W: Writer, T: Writeable>(writer: &mut W, items: &[T]) -> Result<(), Error> {
	writer.write_compact_size(items.len() as u64)?;
	for item in items {
		item.write(writer)?;
	}
	Ok(())
}

/// Deserializes a Readable from the provided byte slice. Trailing bytes are
/// permitted; use `BinReader` directly when the position matters.
pub fn deserialize<T: Readable>(source: &[u8]) -> Result<T, Error> {
	let mut reader = BinReader::new(source);
	T::read(&mut reader)
}

/// Serializes a Writeable into any std::io::Write implementation.
pub fn serialize<W: Writeable>(sink: &mut dyn Write, thing: &W) -> Result<(), Error> {
	let mut writer = BinWriter::new(sink);
	thing.write(&mut writer)
}

/// Utility function to serialize a writeable directly in memory returning a
/// Vec<u8>.
pub fn ser_vec<W: Writeable>(thing: &W) -> Result<Vec<u8>, Error> {
	let mut vec = Vec::with_capacity(128);
	serialize(&mut vec, thing)?;
	Ok(vec)
}

/// Utility to read from a binary source in memory, with a running position.
pub struct BinReader<'a> {
	source: &'a [u8],
	pos: usize,
}

impl<'a> BinReader<'a> {
	/// Constructor for a new BinReader for the provided source
	pub fn new(source: &'a [u8]) -> BinReader<'a> {
		BinReader { source, pos: 0 }
	}

	/// Position of the next byte to be read
	pub fn position(&self) -> usize {
		self.pos
	}

	fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
		if self.pos + len > self.source.len() {
			self.pos = self.source.len();
			return Err(Error::UnexpectedEof);
		}
		let slice = &self.source[self.pos..self.pos + len];
		self.pos += len;
		Ok(slice)
	}
}

impl<'a> Reader for BinReader<'a> {
	fn read_u8(&mut self) -> Result<u8, Error> {
		Ok(self.take(1)?[0])
	}
	fn read_u16(&mut self) -> Result<u16, Error> {
		self.take(2)?.read_u16::<LittleEndian>().map_err(From::from)
	}
	fn read_u32(&mut self) -> Result<u32, Error> {
		self.take(4)?.read_u32::<LittleEndian>().map_err(From::from)
	}
	fn read_u64(&mut self) -> Result<u64, Error> {
		self.take(8)?.read_u64::<LittleEndian>().map_err(From::from)
	}
	fn read_i32(&mut self) -> Result<i32, Error> {
		self.take(4)?.read_i32::<LittleEndian>().map_err(From::from)
	}
	fn read_i64(&mut self) -> Result<i64, Error> {
		self.take(8)?.read_i64::<LittleEndian>().map_err(From::from)
	}
	fn read_fixed_bytes(&mut self, len: usize) -> Result<Vec<u8>, Error> {
		self.take(len).map(|b| b.to_vec())
	}
	fn remaining(&self) -> usize {
		self.source.len() - self.pos
	}
}

/// Utility wrapper for an underlying byte Writer. Defines higher level
/// methods to write numbers, byte vectors, etc.
pub struct BinWriter<'a> {
	sink: &'a mut dyn Write,
}

impl<'a> BinWriter<'a> {
	/// Wraps a standard Write in a new BinWriter
	pub fn new(sink: &'a mut dyn Write) -> BinWriter<'a> {
		BinWriter { sink }
	}
}

impl<'a> Writer for BinWriter<'a> {
	fn write_u8(&mut self, n: u8) -> Result<(), Error> {
		self.sink.write_u8(n).map_err(From::from)
	}
	fn write_u16(&mut self, n: u16) -> Result<(), Error> {
		self.sink.write_u16::<LittleEndian>(n).map_err(From::from)
	}
	fn write_u32(&mut self, n: u32) -> Result<(), Error> {
		self.sink.write_u32::<LittleEndian>(n).map_err(From::from)
	}
	fn write_u64(&mut self, n: u64) -> Result<(), Error> {
		self.sink.write_u64::<LittleEndian>(n).map_err(From::from)
	}
	fn write_i32(&mut self, n: i32) -> Result<(), Error> {
		self.sink.write_i32::<LittleEndian>(n).map_err(From::from)
	}
	fn write_i64(&mut self, n: i64) -> Result<(), Error> {
		self.sink.write_i64::<LittleEndian>(n).map_err(From::from)
	}
	fn write_fixed_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
		self.sink.write_all(bytes).map_err(From::from)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn compact_roundtrip(n: u64) -> Vec<u8> {
		let mut vec = vec![];
		{
			let mut writer = BinWriter::new(&mut vec);
			writer.write_compact_size(n).unwrap();
		}
		let mut reader = BinReader::new(&vec);
		assert_eq!(reader.read_compact_size().unwrap(), n);
		assert_eq!(reader.remaining(), 0);
		vec
	}

	#[test]
	fn compact_size_boundaries() {
		assert_eq!(compact_roundtrip(0).len(), 1);
		assert_eq!(compact_roundtrip(0xFC).len(), 1);
		assert_eq!(compact_roundtrip(0xFD).len(), 3);
		assert_eq!(compact_roundtrip(0xFFFF).len(), 3);
		assert_eq!(compact_roundtrip(0x10000).len(), 5);
		assert_eq!(compact_roundtrip(0xFFFF_FFFF).len(), 5);
		assert_eq!(compact_roundtrip(0x1_0000_0000).len(), 9);
	}

	#[test]
	fn varint_roundtrip() {
		for n in &[0u64, 1, 127, 128, 255, 256, 0x3FFF, 0x4000, 1234567890, u64::max_value()] {
			let mut vec = vec![];
			{
				let mut writer = BinWriter::new(&mut vec);
				writer.write_varint(*n).unwrap();
			}
			let mut reader = BinReader::new(&vec);
			assert_eq!(reader.read_varint().unwrap(), *n, "varint {}", n);
		}
	}

	#[test]
	fn bounded_bytes() {
		let mut vec = vec![];
		{
			let mut writer = BinWriter::new(&mut vec);
			writer.write_bytes(&[1u8, 2, 3, 4]).unwrap();
		}
		let mut reader = BinReader::new(&vec);
		assert_eq!(reader.read_bytes(4).unwrap(), vec![1, 2, 3, 4]);
		let mut reader = BinReader::new(&vec);
		assert_eq!(reader.read_bytes(3), Err(Error::TooLargeReadErr(4)));
	}

	#[test]
	fn truncated_read() {
		let mut reader = BinReader::new(&[1u8, 2]);
		assert_eq!(reader.read_u32(), Err(Error::UnexpectedEof));
	}
}
