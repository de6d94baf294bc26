
use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};

use crate::xdr;
use super::{xdr_pack, xdr_unpack, LAST_FRAGMENT};

pub struct TcpClient {
	pub stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	pub lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout: Option<Duration>) -> io::Result<Self> {
		let stream = match timeout {
			Some(t) => connect_timeout(addr, t)?,
			None => TcpStream::connect(addr)?,
		};
		stream.set_read_timeout(timeout)?;
		stream.set_write_timeout(timeout)?;
		stream.set_nodelay(true)?;
		Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	// Starts a new call: call arguments get packed into self.packer after this returns
	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	// Sends the packed call and loads the matching reply into self.unpacker, positioned at the results
	pub fn do_call(&mut self) -> io::Result<()> {
		let call:&[u8] = self.packer.as_bytes();
		if call.len() as u64 >= LAST_FRAGMENT as u64 {
			return Err(Error::new(ErrorKind::InvalidInput, "Call too large for a single record fragment"));
		}

		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;

		loop {
			let reply:Vec<u8> = read_record(&mut self.stream)?;

			// Load the response into the unpacker and make sure the xid matches
			self.unpacker.reset(&reply);
			let xid = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;

			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Reply to an earlier call that we already gave up on
				log::debug!("Skipping stale RPC reply xid={} (expecting {})", xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, "Somehow got a reply from the future"));
			}
		}
	}

}

// Tries each resolved address in turn, like TcpStream::connect
fn connect_timeout<A: ToSocketAddrs>(addr:A, timeout:Duration) -> io::Result<TcpStream> {
	let mut last_err:Option<Error> = None;
	for a in addr.to_socket_addrs()? {
		match TcpStream::connect_timeout(&a, timeout) {
			Ok(stream) => return Ok(stream),
			Err(e) => last_err = Some(e),
		}
	}
	Err(last_err.unwrap_or_else(|| Error::new(ErrorKind::InvalidInput, "Address resolved to nothing")))
}

/// Largest reply record accepted, enough for a full-depth capture of 16-bit samples.
pub const MAX_RECORD_LEN:usize = 512 * 1024 * 1024;

pub fn read_record<R: Read>(rdr:&mut R) -> io::Result<Vec<u8>> {
	let mut record:Vec<u8> = vec![];

	let mut last:bool = false;
	while !last {
		let x:u32 = rdr.read_u32::<BigEndian>()?;

		last = (x & LAST_FRAGMENT) != 0;
		let n = (x & !LAST_FRAGMENT) as usize;

		if n > MAX_RECORD_LEN - record.len() {
			return Err(Error::new(ErrorKind::InvalidData, format!("RPC record exceeds {} bytes", MAX_RECORD_LEN)));
		}

		// Grows with the data actually received rather than the length the header claims
		let start = record.len();
		rdr.by_ref().take(n as u64).read_to_end(&mut record)?;
		if record.len() - start < n {
			return Err(Error::new(ErrorKind::UnexpectedEof, "RPC record fragment ended early"));
		}
	}

	Ok(record)
}
