
use byteorder::{ByteOrder, LittleEndian};
use serde::{Serialize, Deserialize};

use super::{Result, ScopeError, WaveformPreamble};

/// Size of one sample in the `:WAVeform:DATA?` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveformWidth { Byte, Word }

impl WaveformWidth {
	pub fn as_str(&self) -> &'static str { match self {
		WaveformWidth::Byte => "BYTE",
		WaveformWidth::Word => "WORD",
	}}

	pub fn parse(s:&str) -> Option<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"BYTE" => Some(WaveformWidth::Byte),
			"WORD" => Some(WaveformWidth::Word),
			_      => None,
		}
	}

	pub fn sample_size(&self) -> usize { match self {
		WaveformWidth::Byte => 1,
		WaveformWidth::Word => 2,
	}}

	// Largest code that still counts as a non-negative deviation
	pub fn center(&self) -> i32 { match self {
		WaveformWidth::Byte => 127,
		WaveformWidth::Word => 32767,
	}}

	pub fn full_scale(&self) -> i32 { match self {
		WaveformWidth::Byte => 256,
		WaveformWidth::Word => 65536,
	}}
}

/// Converts one sample code to volts.
///
/// Codes above the width's center are taken as unsigned readings and wrapped down by the full scale, so
/// `200` and `-56` give the same voltage for byte samples.  Codes that are already signed pass through.
pub fn to_voltage(code:i32, width:WaveformWidth, volts_per_division:f64, vertical_offset:f64, code_per_division:f64) -> f64 {
	let code = if code > width.center() { code - width.full_scale() } else { code };
	(code as f64) * (volts_per_division / code_per_division) - vertical_offset
}

/// Sample codes of one capture, in capture order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawWaveform {
	Byte(Vec<i8>),
	Word(Vec<i16>),
}

impl RawWaveform {

	/// Interprets an unframed payload as samples of the given width.  Word samples are little-endian.
	pub fn from_payload(width:WaveformWidth, payload:&[u8]) -> Result<Self> {
		if payload.len() % width.sample_size() != 0 {
			return Err(ScopeError::Decode(format!("{} payload bytes is not a whole number of {} samples", payload.len(), width.as_str())));
		}

		Ok(match width {
			WaveformWidth::Byte => RawWaveform::Byte(payload.iter().map(|b| *b as i8).collect()),
			WaveformWidth::Word => {
				let mut codes = vec![0i16; payload.len() / 2];
				LittleEndian::read_i16_into(payload, &mut codes);
				RawWaveform::Word(codes)
			},
		})
	}

	pub fn width(&self) -> WaveformWidth { match self {
		RawWaveform::Byte(_) => WaveformWidth::Byte,
		RawWaveform::Word(_) => WaveformWidth::Word,
	}}

	pub fn len(&self) -> usize { match self {
		RawWaveform::Byte(v) => v.len(),
		RawWaveform::Word(v) => v.len(),
	}}

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	pub fn codes(&self) -> Box<dyn Iterator<Item = i32> + '_> { match self {
		RawWaveform::Byte(v) => Box::new(v.iter().map(|c| *c as i32)),
		RawWaveform::Word(v) => Box::new(v.iter().map(|c| *c as i32)),
	}}

	pub fn to_voltages(&self, preamble:&WaveformPreamble) -> Vec<f64> {
		let width = self.width();
		self.codes().map(|c| preamble.to_voltage(c, width)).collect()
	}

}
