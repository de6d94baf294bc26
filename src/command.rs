//! The text/binary command seam between instrument drivers and their transport.

use std::io::{self, Error, ErrorKind};
use std::str;

use crate::vxi11::CoreClient;

/// A sequential command/response channel to one instrument.
///
/// Implementations are not reentrant: a request must be fully answered before the next one is sent.
pub trait CommandChannel {
	/// Sends a command that produces no response.
	fn send_command(&mut self, cmd:&str) -> io::Result<()>;

	/// Sends a query and returns its response as one line of text, without trailing whitespace.
	fn query(&mut self, cmd:&str) -> io::Result<String> {
		let raw = self.query_raw(cmd)?;
		str::from_utf8(&raw)
			.map(|s| s.trim_end().to_owned())
			.map_err(|_| Error::new(ErrorKind::InvalidData, format!("Unable to parse response to {} as UTF-8", cmd)))
	}

	/// Sends a query and returns the untouched response bytes.
	fn query_raw(&mut self, cmd:&str) -> io::Result<Vec<u8>>;
}

impl CommandChannel for CoreClient {
	fn send_command(&mut self, cmd:&str) -> io::Result<()> { self.write(cmd.as_bytes()) }
	fn query_raw(&mut self, cmd:&str) -> io::Result<Vec<u8>> { self.ask(cmd.as_bytes()) }
}

impl<C: CommandChannel + ?Sized> CommandChannel for &mut C {
	fn send_command(&mut self, cmd:&str) -> io::Result<()> { (**self).send_command(cmd) }
	fn query(&mut self, cmd:&str) -> io::Result<String> { (**self).query(cmd) }
	fn query_raw(&mut self, cmd:&str) -> io::Result<Vec<u8>> { (**self).query_raw(cmd) }
}
