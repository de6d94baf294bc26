
// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;
pub const DEFAULT_DEVICE_NAME:&str = "inst0";

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits returned by device_read
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use crate::rpc::port_mapping::{TcpPortMapperClient, Mapping, Protocol};
use crate::rpc::tcp_clients::TcpClient;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

// Maps a VXI-11 device error code to an I/O error
fn device_error(code:i32) -> io::Result<()> {
	let (kind, msg) = match code {
		0  => return Ok(()),
		1  => (ErrorKind::InvalidInput, "Syntax error"),
		3  => (ErrorKind::NotFound, "Device not accessible"),
		4  => (ErrorKind::NotConnected, "Invalid link identifier"),
		5  => (ErrorKind::InvalidInput, "Parameter error"),
		6  => (ErrorKind::Other, "Channel not established"),
		8  => (ErrorKind::Unsupported, "Operation not supported"),
		9  => (ErrorKind::Other, "Out of resources"),
		11 => (ErrorKind::WouldBlock, "Device locked by another link"),
		12 => (ErrorKind::Other, "No lock held by this link"),
		15 => (ErrorKind::TimedOut, "I/O timeout"),
		17 => (ErrorKind::Other, "I/O error"),
		21 => (ErrorKind::InvalidInput, "Invalid address"),
		23 => (ErrorKind::Interrupted, "Abort"),
		29 => (ErrorKind::AlreadyExists, "Channel already established"),
		_  => (ErrorKind::Other, "Unknown device error"),
	};
	Err(Error::new(kind, format!("VXI-11 error {}: {}", code, msg)))
}

// The socket waits a little longer than the device so device-side timeouts come back as replies
fn socket_timeout(io_timeout:Duration) -> Duration {
	io_timeout.saturating_add(Duration::from_secs(1))
}

pub struct CoreClient {
	client: TcpClient,
	opt_link: Option<Link>,
	io_timeout_ms: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
	pub link_id: i32,
	pub abort_port: u32,
	pub max_recv_size: u32,
}

impl CoreClient {

	fn get_link(&self) -> io::Result<Link> {
		self.opt_link.ok_or_else(|| Error::new(ErrorKind::NotConnected, "No link"))
	}

	pub fn link(&self) -> Option<Link> { self.opt_link }

	pub fn new(host:&str, io_timeout:Duration) -> io::Result<Self> {
		// Find the port to use for the core program
		let mut pmap_client = TcpPortMapperClient::new(host, Some(io_timeout))?;

		let mapping = Mapping {
			program: DEVICE_CORE_PROG,
			version: DEVICE_CORE_VERS,
			protocol: Protocol::TCP,
			port: 0,
		};

		let port = pmap_client.get_port(&mapping)?;

		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, Some(socket_timeout(io_timeout)))?;

		let io_timeout_ms = io_timeout.as_millis().min(u32::MAX as u128) as u32;
		Ok(CoreClient { client, opt_link: None, io_timeout_ms })
	}

	pub fn create_link(&mut self) -> io::Result<()> {
		if self.opt_link.is_some() {
			return Err(err("Already connected to a link"));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, DEFAULT_LOCK_TIMEOUT, DEFAULT_DEVICE_NAME)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;

		device_error(error)?;

		log::debug!("Created VXI-11 link {} (max_recv_size={})", link_id, max_recv_size);
		self.opt_link = Some(Link{ link_id, abort_port, max_recv_size });
		Ok(())
	}

	pub fn ask(&mut self, data:&[u8]) -> io::Result<Vec<u8>> {
		self.write(data)?;
		self.read()
	}

	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let link = self.get_link()?;
		if data.is_empty() { return Ok(()); }

		// The device may advertise a maximum; zero means it didn't
		let chunk_size = match link.max_recv_size as usize { 0 => data.len(), n => n };
		let mut chunks = data.chunks(chunk_size).peekable();

		while let Some(chunk) = chunks.next() {
			let flags = if chunks.peek().is_none() { OPERATION_FLAGS_END } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(&mut self.client.packer, link.link_id, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, flags, chunk)?;
			self.client.do_call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;
			device_error(error)?;

			if size as usize != chunk.len() {
				return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
			}
		}

		Ok(())
	}

	// Reads until the device flags END, concatenating partial reads
	pub fn read(&mut self) -> io::Result<Vec<u8>> {
		let link = self.get_link()?;
		let mut ans:Vec<u8> = vec![];

		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, u32::MAX, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, 0, 0)?;
			self.client.do_call()?;

			let error:i32  = self.client.unpacker.unpack_i32()?;
			let reason:i32 = self.client.unpacker.unpack_i32()?;
			let mut data:Vec<u8> = self.client.unpacker.unpack_variable_len_opaque()?;
			device_error(error)?;

			let got = data.len();
			ans.append(&mut data);

			if reason & REASON_END != 0 {
				return Ok(ans);
			} else if reason & (REASON_REQCNT | REASON_CHR) == 0 && got == 0 {
				return Err(err("Expected one of three reason bits to be set"));
			}
			log::trace!("Partial device_read, {} bytes so far (reason={})", ans.len(), reason);
		}
	}

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link = self.get_link()?;

		self.client.start_call(DESTROY_LINK)?;
		xdr_pack::pack_device_link(&mut self.client.packer, link.link_id)?;
		self.client.do_call()?;
		self.opt_link = None;

		device_error(self.client.unpacker.unpack_i32()?)
	}

}

impl Drop for CoreClient {

	fn drop(&mut self) {
		if self.opt_link.is_some() {
			if let Err(e) = self.destroy_link() { log::warn!("Unable to destroy VXI-11 link: {}", e); }
		}
	}

}

pub mod xdr_pack;
