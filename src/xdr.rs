
use std::io::{self, Error, ErrorKind};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::InvalidData, msg) }

// Every item in XDR occupies a multiple of four bytes
fn padding(n:usize) -> usize { (4 - n % 4) % 4 }

#[derive(Debug, Default)]
pub struct Packer {
	buff: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct Unpacker {
	buff: Vec<u8>,
	pos: usize,
}

impl Packer {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self) { self.buff.clear(); }

	pub fn as_bytes(&self) -> &[u8] { &self.buff }

	// Packing methods that can only add multiples of four bytes, so if we started off with the correct
	// padding, we'll end up with the correct padding
	pub fn pack_u32(&mut self, x:u32) -> io::Result<()> { self.buff.write_u32::<BigEndian>(x) }
	pub fn pack_i32(&mut self, x:i32) -> io::Result<()> { self.buff.write_i32::<BigEndian>(x) }
	pub fn pack_bool(&mut self, b:bool) -> io::Result<()> { self.pack_i32(if b { 1 } else { 0 }) }
	pub fn pack_enum(&mut self, x:i32) -> io::Result<()> { self.pack_i32(x) }

	pub fn pack_variable_len_opaque(&mut self, data:&[u8]) -> io::Result<()> {
		if data.len() > u32::MAX as usize {
			return Err(err("Opaque data too long for XDR length prefix"));
		}
		self.pack_u32(data.len() as u32)?;
		self.buff.extend_from_slice(data);
		self.buff.resize(self.buff.len() + padding(data.len()), 0);
		Ok(())
	}

}

impl Unpacker {

	pub fn new() -> Self { Self::default() }

	pub fn reset(&mut self, data:&[u8]) {
		self.buff.clear();
		self.buff.extend_from_slice(data);
		self.pos = 0;
	}

	pub fn remaining(&self) -> &[u8] { &self.buff[self.pos..] }
	pub fn all_data_consumed(&self) -> bool { self.pos == self.buff.len() }

	fn take(&mut self, n:usize) -> io::Result<&[u8]> {
		if self.remaining().len() < n {
			return Err(Error::new(ErrorKind::UnexpectedEof, "Tried to unpack past the end of the buffer"));
		}
		let start = self.pos;
		self.pos += n;
		Ok(&self.buff[start..self.pos])
	}

	pub fn unpack_u32(&mut self) -> io::Result<u32> { self.take(4).map(BigEndian::read_u32) }
	pub fn unpack_i32(&mut self) -> io::Result<i32> { self.take(4).map(BigEndian::read_i32) }

	// An enum is just an i32 with a restricted set of values.  We can't check that this value is in the restricted set at this
	// level because it depends on the application, so for our purposes here, an enum is the same as an i32
	pub fn unpack_enum(&mut self) -> io::Result<i32> { self.unpack_i32() }

	pub fn unpack_bool(&mut self) -> io::Result<bool> {
		match self.unpack_i32()? {
			0 => Ok(false),
			1 => Ok(true),
			_ => Err(err("Expected 0 or 1 in unpack_bool")),
		}
	}

	pub fn unpack_variable_len_opaque(&mut self) -> io::Result<Vec<u8>> {
		let n = self.unpack_u32()? as usize;
		let ans:Vec<u8> = self.take(n)?.to_vec();
		self.take(padding(n))?;
		Ok(ans)
	}

}
