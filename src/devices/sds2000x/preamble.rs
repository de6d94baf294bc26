//! Decoding of the binary `:WAVeform:PREamble?` block.
//!
//! Offsets below are into the block body, after the 11-byte `#9nnnnnnnnn` header.  All fields are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Serialize, Deserialize};

use super::{Result, ScopeError, HEADER_LEN, WaveformWidth};
use super::convert::to_voltage;

pub const OFFSET_TOTAL_POINTS:usize       = 116;
pub const OFFSET_VOLTS_PER_DIV:usize      = 156;
pub const OFFSET_VERTICAL_OFFSET:usize    = 160;
pub const OFFSET_CODE_PER_DIV:usize       = 164;
pub const OFFSET_SAMPLE_INTERVAL:usize    = 176;
pub const OFFSET_TRIGGER_DELAY:usize      = 180;
pub const OFFSET_TIMEBASE:usize           = 324;
pub const OFFSET_PROBE_ATTENUATION:usize  = 328;

/// Shortest body that holds every field we read.
pub const PREAMBLE_MIN_LEN:usize = OFFSET_PROBE_ATTENUATION + 4;

/// Horizontal divisions on screen.
pub const HORIZONTAL_DIVISIONS:f64 = 10.0;

// Seconds per division, indexed by the preamble's timebase code
pub const TIMEBASE_TABLE:[f64; 39] = [
	200e-12, 500e-12,
	1e-9, 2e-9, 5e-9, 10e-9, 20e-9, 50e-9, 100e-9, 200e-9, 500e-9,
	1e-6, 2e-6, 5e-6, 10e-6, 20e-6, 50e-6, 100e-6, 200e-6, 500e-6,
	1e-3, 2e-3, 5e-3, 10e-3, 20e-3, 50e-3, 100e-3, 200e-3, 500e-3,
	1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0,
];

/// Scaling and timing of one capture.  Vertical fields already include the probe attenuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveformPreamble {
	pub total_points: u32,
	pub volts_per_division: f64,
	pub vertical_offset: f64,
	pub code_per_division: f64,
	pub timebase_index: i16,
	pub trigger_delay: f64,
	pub sample_interval: f64,
	pub probe_attenuation: f64,
}

fn malformed(msg:String) -> ScopeError { ScopeError::MalformedPreamble(msg) }

fn field<'a>(body:&'a [u8], offset:usize, len:usize, name:&str) -> Result<&'a [u8]> {
	body.get(offset..offset + len)
		.ok_or_else(|| malformed(format!("{} at byte {} is past the end of a {} byte preamble", name, offset, body.len())))
}

fn finite(x:f64, name:&str) -> Result<f64> {
	if x.is_finite() { Ok(x) } else { Err(malformed(format!("{} is {}", name, x))) }
}

fn read_f32(body:&[u8], offset:usize, name:&str) -> Result<f64> {
	finite(LittleEndian::read_f32(field(body, offset, 4, name)?) as f64, name)
}

impl WaveformPreamble {

	/// Decodes a complete preamble response, header included.
	pub fn decode(buf:&[u8]) -> Result<Self> {
		if buf.len() < HEADER_LEN {
			return Err(malformed(format!("{} bytes is too short to hold the block header", buf.len())));
		}
		let body = &buf[HEADER_LEN..];
		if body.len() < PREAMBLE_MIN_LEN {
			return Err(malformed(format!("body is {} bytes, expected at least {}", body.len(), PREAMBLE_MIN_LEN)));
		}

		let total_points = LittleEndian::read_i32(field(body, OFFSET_TOTAL_POINTS, 4, "total_points")?);
		if total_points < 0 {
			return Err(malformed(format!("total_points is negative ({})", total_points)));
		}

		let probe_attenuation = read_f32(body, OFFSET_PROBE_ATTENUATION, "probe_attenuation")?;
		let volts_per_division = read_f32(body, OFFSET_VOLTS_PER_DIV, "volts_per_division")? * probe_attenuation;
		let vertical_offset = read_f32(body, OFFSET_VERTICAL_OFFSET, "vertical_offset")? * probe_attenuation;
		let code_per_division = read_f32(body, OFFSET_CODE_PER_DIV, "code_per_division")? * probe_attenuation;
		if code_per_division == 0.0 {
			return Err(malformed("code_per_division is zero".to_owned()));
		}

		let sample_interval = read_f32(body, OFFSET_SAMPLE_INTERVAL, "sample_interval")?;
		let trigger_delay = finite(LittleEndian::read_f64(field(body, OFFSET_TRIGGER_DELAY, 8, "trigger_delay")?), "trigger_delay")?;
		let timebase_index = LittleEndian::read_i16(field(body, OFFSET_TIMEBASE, 2, "timebase_index")?);

		Ok(Self {
			total_points: total_points as u32,
			volts_per_division,
			vertical_offset,
			code_per_division,
			timebase_index,
			trigger_delay,
			sample_interval,
			probe_attenuation,
		})
	}

	pub fn to_voltage(&self, code:i32, width:WaveformWidth) -> f64 {
		to_voltage(code, width, self.volts_per_division, self.vertical_offset, self.code_per_division)
	}

	/// Seconds per horizontal division, if the timebase code is one we know.
	pub fn time_per_division(&self) -> Option<f64> {
		if self.timebase_index < 0 { return None; }
		TIMEBASE_TABLE.get(self.timebase_index as usize).copied()
	}

	/// Time of sample `idx` relative to the trigger point.
	pub fn sample_time(&self, idx:usize) -> Option<f64> {
		let tdiv = self.time_per_division()?;
		Some(-self.trigger_delay - tdiv * HORIZONTAL_DIVISIONS / 2.0 + (idx as f64) * self.sample_interval)
	}

}

// Builds preamble responses for tests elsewhere in the crate
#[cfg(test)]
pub(crate) mod testing {
	use byteorder::{ByteOrder, LittleEndian};

	use super::*;

	pub struct Fields {
		pub total_points: i32,
		pub probe_attenuation: f32,
		pub volts_per_division: f32,
		pub vertical_offset: f32,
		pub code_per_division: f32,
		pub timebase_index: i16,
		pub sample_interval: f32,
		pub trigger_delay: f64,
	}

	impl Default for Fields {
		fn default() -> Self {
			Self {
				total_points: 0,
				probe_attenuation: 1.0,
				volts_per_division: 0.5,
				vertical_offset: 0.0,
				code_per_division: 25.0,
				timebase_index: 11,
				sample_interval: 1e-9,
				trigger_delay: 0.0,
			}
		}
	}

	pub fn encode(f:&Fields) -> Vec<u8> {
		let mut body = vec![0u8; 346];
		LittleEndian::write_i32(&mut body[OFFSET_TOTAL_POINTS..], f.total_points);
		LittleEndian::write_f32(&mut body[OFFSET_VOLTS_PER_DIV..], f.volts_per_division);
		LittleEndian::write_f32(&mut body[OFFSET_VERTICAL_OFFSET..], f.vertical_offset);
		LittleEndian::write_f32(&mut body[OFFSET_CODE_PER_DIV..], f.code_per_division);
		LittleEndian::write_f32(&mut body[OFFSET_SAMPLE_INTERVAL..], f.sample_interval);
		LittleEndian::write_f64(&mut body[OFFSET_TRIGGER_DELAY..], f.trigger_delay);
		LittleEndian::write_i16(&mut body[OFFSET_TIMEBASE..], f.timebase_index);
		LittleEndian::write_f32(&mut body[OFFSET_PROBE_ATTENUATION..], f.probe_attenuation);

		let mut buf = format!("#9{:09}", body.len()).into_bytes();
		buf.extend_from_slice(&body);
		buf
	}
}
