
use std::fmt;
use std::io;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use regex::Regex;
use serde::{Serialize, Deserialize};

use crate::command::CommandChannel;
use crate::vxi11::CoreClient;

lazy_static! {
	static ref IDN_RE: Regex = Regex::new("^([^,]+),([^,]+),([^,]+),([^,\\s]+)").unwrap();
}

pub mod acquisition;
pub mod config;
pub mod convert;
pub mod preamble;
pub mod waveform;

pub use acquisition::{CancelToken, TriggerMode, TriggerState};
pub use config::ScopeConfig;
pub use convert::{to_voltage, RawWaveform, WaveformWidth};
pub use preamble::WaveformPreamble;
pub use waveform::Trace;

/// Leading `#9` + nine length digits on every binary block response.
pub const HEADER_LEN:usize = 11;

/// Trailing bytes after the last sample of a waveform data response.
pub const FOOTER_LEN:usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
	#[error("Transport error: {0}")]
	Transport(#[from] io::Error),

	#[error("Capture did not complete within {waited:?}")]
	CaptureTimeout { waited: Duration },

	#[error("Wait for capture was cancelled")]
	Cancelled,

	#[error("Malformed preamble: {0}")]
	MalformedPreamble(String),

	#[error("Unable to decode waveform: {0}")]
	Decode(String),

	#[error("Unexpected response to {command}: {response:?}")]
	UnexpectedResponse { command: String, response: String },

	#[error("Channel {0} is out of range, the SDS2000X Plus has channels 1 to 4")]
	InvalidChannel(u8),

	#[error("Connected to {0:?}, which doesn't appear to be an SDS2000X Plus")]
	WrongModel(String),

	#[error("Invalid configuration: {0}")]
	Config(String),
}

pub type Result<T> = std::result::Result<T, ScopeError>;

fn unexpected(command:&str, response:&str) -> ScopeError {
	ScopeError::UnexpectedResponse { command: command.to_owned(), response: response.to_owned() }
}

/// Analog input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel { C1, C2, C3, C4 }

impl Channel {
	pub const ALL:[Channel; 4] = [Channel::C1, Channel::C2, Channel::C3, Channel::C4];

	pub fn from_number(n:u8) -> Result<Self> {
		match n {
			1 => Ok(Channel::C1),
			2 => Ok(Channel::C2),
			3 => Ok(Channel::C3),
			4 => Ok(Channel::C4),
			_ => Err(ScopeError::InvalidChannel(n)),
		}
	}

	pub fn number(&self) -> u8 { match self {
		Channel::C1 => 1,
		Channel::C2 => 2,
		Channel::C3 => 3,
		Channel::C4 => 4,
	}}

	pub fn as_str(&self) -> &'static str { match self {
		Channel::C1 => "C1",
		Channel::C2 => "C2",
		Channel::C3 => "C3",
		Channel::C4 => "C4",
	}}
}

impl fmt::Display for Channel {
	fn fmt(&self, f:&mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// Accepts "C2", "c2" or "2"
impl FromStr for Channel {
	type Err = ScopeError;

	fn from_str(s:&str) -> Result<Self> {
		let digits = s.trim().trim_start_matches(|c:char| c == 'C' || c == 'c');
		match digits.parse::<u8>() {
			Ok(n) => Channel::from_number(n),
			Err(_) => Err(ScopeError::Decode(format!("{:?} is not a channel name", s))),
		}
	}
}

/// The four fields of the `*IDN?` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
	pub vendor: String,
	pub product: String,
	pub serial: String,
	pub firmware: String,
}

impl Identity {

	pub fn parse(idn:&str) -> Result<Self> {
		let caps = IDN_RE.captures(idn.trim()).ok_or_else(|| unexpected("*IDN?", idn))?;
		let field = |i:usize| caps.get(i).map(|m| m.as_str().trim().to_owned()).unwrap_or_default();
		Ok(Self{ vendor: field(1), product: field(2), serial: field(3), firmware: field(4) })
	}

	pub fn is_sds2000x_plus(&self) -> bool {
		self.product.starts_with("SDS2") && self.product.ends_with("X Plus")
	}

}

/// A session with one SDS2000X Plus oscilloscope.
///
/// Every operation takes `&mut self`. To share a session between threads, wrap it in a `Mutex` and hold
/// the lock across the whole arm, wait and fetch sequence (or use [`Sds2000xPlus::acquire`]).
pub struct Sds2000xPlus<C: CommandChannel = CoreClient> {
	chan: C,
	config: ScopeConfig,
	identity: Identity,
}

impl Sds2000xPlus<CoreClient> {

	pub fn connect(host:&str, config:ScopeConfig) -> Result<Self> {
		config.validate()?;

		log::debug!("Connecting to {} over VXI-11", host);
		let mut core = CoreClient::new(host, config.io_timeout)?;
		core.create_link()?;

		Self::with_channel(core, config)
	}

}

impl<C: CommandChannel> Sds2000xPlus<C> {

	/// Wraps an already open command channel, checking that it leads to an SDS2000X Plus.
	pub fn with_channel(chan:C, config:ScopeConfig) -> Result<Self> {
		config.validate()?;

		let mut chan = chan;
		let idn = chan.query("*IDN?")?;
		let identity = Identity::parse(&idn)?;
		if !identity.is_sds2000x_plus() {
			return Err(ScopeError::WrongModel(idn));
		}

		log::debug!("Connected to {} {} (serial {}, firmware {})", identity.vendor, identity.product, identity.serial, identity.firmware);
		Ok(Self{ chan, config, identity })
	}

	pub fn identity(&self) -> &Identity { &self.identity }
	pub fn config(&self) -> &ScopeConfig { &self.config }
	pub fn into_inner(self) -> C { self.chan }

	fn throttle(&self) {
		if !self.config.tx_throttle.is_zero() { thread::sleep(self.config.tx_throttle); }
	}

	pub(crate) fn send(&mut self, cmd:&str) -> Result<()> {
		self.throttle();
		log::debug!("-> {}", cmd);
		Ok(self.chan.send_command(cmd)?)
	}

	pub(crate) fn ask(&mut self, cmd:&str) -> Result<String> {
		self.throttle();
		let res = self.chan.query(cmd)?;
		log::trace!("{} <- {:?}", cmd, res);
		Ok(res)
	}

	pub(crate) fn ask_raw(&mut self, cmd:&str) -> Result<Vec<u8>> {
		self.throttle();
		let res = self.chan.query_raw(cmd)?;
		log::debug!("{} <- {} bytes", cmd, res.len());
		Ok(res)
	}

}
