
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use super::{Result, ScopeError};

pub const DEFAULT_POLL_INTERVAL_SEC:f64 = 0.01;
pub const DEFAULT_CAPTURE_TIMEOUT_SEC:f64 = 10.0;
pub const DEFAULT_IO_TIMEOUT_SEC:f64 = 10.0;

/// Session timing.  In config files every duration is written as floating-point seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScopeConfig {
	/// Delay between trigger status queries while waiting for a capture.
	#[serde(rename = "poll_interval_sec", with = "secs")]
	pub poll_interval: Duration,

	/// How long a capture may take before giving up.
	#[serde(rename = "capture_timeout_sec", with = "secs")]
	pub capture_timeout: Duration,

	/// Pause before every command sent, for instruments that drop commands sent back to back.
	#[serde(rename = "tx_throttle_sec", with = "secs")]
	pub tx_throttle: Duration,

	/// Device-side timeout for each VXI-11 read and write.
	#[serde(rename = "io_timeout_sec", with = "secs")]
	pub io_timeout: Duration,
}

impl Default for ScopeConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SEC),
			capture_timeout: Duration::from_secs_f64(DEFAULT_CAPTURE_TIMEOUT_SEC),
			tx_throttle: Duration::from_secs(0),
			io_timeout: Duration::from_secs_f64(DEFAULT_IO_TIMEOUT_SEC),
		}
	}
}

impl ScopeConfig {

	pub fn from_json_str(s:&str) -> Result<Self> {
		let config:Self = serde_json::from_str(s).map_err(|e| ScopeError::Config(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_json_file<P: AsRef<Path>>(path:P) -> Result<Self> {
		let path = path.as_ref();
		let s = fs::read_to_string(path).map_err(|e| ScopeError::Config(format!("{}: {}", path.display(), e)))?;
		Self::from_json_str(&s)
	}

	pub fn validate(&self) -> Result<()> {
		if self.poll_interval.is_zero() { return Err(ScopeError::Config("poll_interval_sec must be positive".to_owned())); }
		if self.capture_timeout.is_zero() { return Err(ScopeError::Config("capture_timeout_sec must be positive".to_owned())); }
		if self.io_timeout.is_zero() { return Err(ScopeError::Config("io_timeout_sec must be positive".to_owned())); }
		Ok(())
	}

}

mod secs {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer, Serializer};
	use serde::de::Error;

	pub fn serialize<S: Serializer>(d:&Duration, s:S) -> Result<S::Ok, S::Error> {
		s.serialize_f64(d.as_secs_f64())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d:D) -> Result<Duration, D::Error> {
		let x = f64::deserialize(d)?;
		Duration::try_from_secs_f64(x).map_err(|_| D::Error::custom(format!("{} is not a valid number of seconds", x)))
	}
}
