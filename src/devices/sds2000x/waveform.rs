//! Waveform transfer: source selection, block framing and conversion to volts.

use serde::{Serialize, Deserialize};

use crate::command::CommandChannel;
use super::{Channel, CancelToken, RawWaveform, Result, ScopeError, Sds2000xPlus, WaveformPreamble, WaveformWidth};
use super::{FOOTER_LEN, HEADER_LEN};

/// Strips the block header and footer from a `:WAVeform:DATA?` response.
pub fn strip_framing(resp:&[u8]) -> Result<&[u8]> {
	if resp.len() < HEADER_LEN + FOOTER_LEN {
		return Err(ScopeError::Decode(format!("waveform response of {} bytes is shorter than its framing", resp.len())));
	}
	Ok(&resp[HEADER_LEN..resp.len() - FOOTER_LEN])
}

/// A converted capture with its time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
	pub channel: Channel,
	pub preamble: WaveformPreamble,
	pub times: Vec<f64>,
	pub voltages: Vec<f64>,
}

impl Trace {

	pub fn new(channel:Channel, preamble:WaveformPreamble, voltages:Vec<f64>) -> Result<Self> {
		let times:Vec<f64> = (0..voltages.len())
			.map(|i| preamble.sample_time(i))
			.collect::<Option<_>>()
			.ok_or_else(|| ScopeError::Decode(format!("unknown timebase code {}", preamble.timebase_index)))?;
		Ok(Self{ channel, preamble, times, voltages })
	}

	pub fn len(&self) -> usize { self.voltages.len() }
	pub fn is_empty(&self) -> bool { self.voltages.is_empty() }

	pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
		self.times.iter().copied().zip(self.voltages.iter().copied())
	}

}

impl<C: CommandChannel> Sds2000xPlus<C> {

	pub fn set_waveform_source(&mut self, channel:Channel) -> Result<()> {
		self.send(&format!(":WAVeform:SOURce {}", channel))
	}

	pub fn waveform_width(&mut self) -> Result<WaveformWidth> {
		let res = self.ask(":WAVeform:WIDTh?")?;
		WaveformWidth::parse(&res).ok_or_else(|| ScopeError::Decode(format!("unrecognized waveform width {:?}", res)))
	}

	pub fn set_waveform_width(&mut self, width:WaveformWidth) -> Result<()> {
		self.send(&format!(":WAVeform:WIDTh {}", width.as_str()))
	}

	/// Preamble of the currently selected source.
	pub fn preamble(&mut self) -> Result<WaveformPreamble> {
		let buf = self.ask_raw(":WAVeform:PREamble?")?;
		WaveformPreamble::decode(&buf)
	}

	/// Waits for the capture to stop, then fetches the preamble and samples of `channel` from that capture.
	fn fetch(&mut self, channel:Channel, cancel:Option<&CancelToken>) -> Result<(WaveformPreamble, RawWaveform)> {
		let (poll_interval, timeout) = (self.config.poll_interval, self.config.capture_timeout);
		self.wait_for_capture(poll_interval, timeout, cancel)?;

		self.set_waveform_source(channel)?;
		let width = self.waveform_width()?;
		let preamble = self.preamble()?;

		let resp = self.ask_raw(":WAVeform:DATA?")?;
		let raw = RawWaveform::from_payload(width, strip_framing(&resp)?)?;

		if raw.len() != preamble.total_points as usize {
			return Err(ScopeError::Decode(format!("{} samples received but the preamble declares {}", raw.len(), preamble.total_points)));
		}

		log::debug!("Fetched {} {} samples from {}", raw.len(), width.as_str(), channel);
		Ok((preamble, raw))
	}

	/// Sample codes of the completed capture on `channel`.
	pub fn capture_raw(&mut self, channel:Channel) -> Result<RawWaveform> {
		self.fetch(channel, None).map(|(_, raw)| raw)
	}

	/// Voltages of the completed capture on `channel`.
	pub fn capture(&mut self, channel:Channel) -> Result<Vec<f64>> {
		let (preamble, raw) = self.fetch(channel, None)?;
		Ok(raw.to_voltages(&preamble))
	}

	pub fn capture_trace(&mut self, channel:Channel) -> Result<Trace> {
		self.capture_trace_cancellable(channel, None)
	}

	fn capture_trace_cancellable(&mut self, channel:Channel, cancel:Option<&CancelToken>) -> Result<Trace> {
		let (preamble, raw) = self.fetch(channel, cancel)?;
		Trace::new(channel, preamble, raw.to_voltages(&preamble))
	}

	/// Arms, waits for the capture and fetches it as one transaction.
	pub fn acquire(&mut self, channel:Channel, cancel:Option<&CancelToken>) -> Result<Trace> {
		self.arm()?;
		self.capture_trace_cancellable(channel, cancel)
	}

	/// Same as [`Sds2000xPlus::acquire`] with every channel in `channels` read from the one capture.
	pub fn acquire_many(&mut self, channels:&[Channel], cancel:Option<&CancelToken>) -> Result<Vec<Trace>> {
		if channels.is_empty() { return Ok(vec![]); }
		self.arm()?;
		channels.iter().map(|c| self.capture_trace_cancellable(*c, cancel)).collect()
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::devices::sds2000x::ScopeConfig;
	use crate::devices::sds2000x::preamble::testing::{encode, Fields};
	use crate::devices::sds2000x::testing::FakeChannel;

	fn framed(payload:&[u8]) -> Vec<u8> {
		let mut resp = format!("#9{:09}", payload.len()).into_bytes();
		resp.extend_from_slice(payload);
		resp.extend_from_slice(b"\n\n");
		resp
	}

	fn stopped_scope(width:&str, fields:Fields, payload:&[u8]) -> Sds2000xPlus<FakeChannel> {
		let mut chan = FakeChannel::new();
		chan.always(":TRIGger:STATus?", b"Stop")
			.always(":WAVeform:WIDTh?", width.as_bytes())
			.always(":WAVeform:PREamble?", &encode(&fields))
			.always(":WAVeform:DATA?", &framed(payload))
			.always("*OPC?", b"1");
		Sds2000xPlus::with_channel(chan, ScopeConfig::default()).unwrap()
	}

	#[test]
	fn framing_is_stripped() {
		assert_eq!(strip_framing(&framed(&[1, 2, 3])).unwrap(), &[1, 2, 3]);
		assert!(strip_framing(&framed(&[])).unwrap().is_empty());
		assert!(matches!(strip_framing(b"#9000"), Err(ScopeError::Decode(_))));
	}

	#[test]
	fn capture_converts_every_sample() {
		let mut scope = stopped_scope("BYTE", Fields { total_points: 3, ..Fields::default() }, &[200, 10, 0]);
		let volts = scope.capture(Channel::C2).unwrap();

		assert_eq!(volts.len(), 3);
		assert!((volts[0] - -1.12).abs() < 1e-9);
		assert!((volts[1] - 0.2).abs() < 1e-9);
		assert_eq!(volts[2], 0.0);

		let sent = scope.into_inner().sent;
		let src = sent.iter().position(|s| s == ":WAVeform:SOURce C2").unwrap();
		let data = sent.iter().position(|s| s == ":WAVeform:DATA?").unwrap();
		assert!(src < data);
	}

	#[test]
	fn capture_matches_converted_raw() {
		let payload:Vec<u8> = (0..=255).collect();
		let fields = || Fields { total_points: 256, volts_per_division: 0.1, vertical_offset: 0.02, code_per_division: 30.0, ..Fields::default() };

		let raw = stopped_scope("BYTE", fields(), &payload).capture_raw(Channel::C1).unwrap();
		let volts = stopped_scope("BYTE", fields(), &payload).capture(Channel::C1).unwrap();
		let preamble = WaveformPreamble::decode(&encode(&fields())).unwrap();

		let expected:Vec<f64> = raw.codes().map(|c| preamble.to_voltage(c, WaveformWidth::Byte)).collect();
		assert_eq!(volts, expected);
	}

	#[test]
	fn length_mismatch_is_a_decode_error() {
		let mut scope = stopped_scope("BYTE", Fields { total_points: 4, ..Fields::default() }, &[1, 2, 3]);
		assert!(matches!(scope.capture(Channel::C1), Err(ScopeError::Decode(_))));

		let mut scope = stopped_scope("BYTE", Fields { total_points: 2, ..Fields::default() }, &[1, 2, 3]);
		assert!(matches!(scope.capture_raw(Channel::C1), Err(ScopeError::Decode(_))));
	}

	#[test]
	fn word_samples_are_decoded() {
		let mut scope = stopped_scope("WORD", Fields { total_points: 2, code_per_division: 6400.0, ..Fields::default() }, &[0x00, 0x19, 0x00, 0xe7]);
		let raw = scope.capture_raw(Channel::C3).unwrap();
		assert_eq!(raw, RawWaveform::Word(vec![6400, -6400]));
	}

	#[test]
	fn partial_word_payload_is_a_decode_error() {
		let mut scope = stopped_scope("WORD", Fields { total_points: 1, ..Fields::default() }, &[1, 2, 3]);
		assert!(matches!(scope.capture(Channel::C1), Err(ScopeError::Decode(_))));
	}

	#[test]
	fn unknown_width_is_a_decode_error() {
		let mut scope = stopped_scope("NIBBLE", Fields { total_points: 1, ..Fields::default() }, &[1]);
		assert!(matches!(scope.capture(Channel::C1), Err(ScopeError::Decode(_))));
	}

	#[test]
	fn bad_preamble_fails_the_capture() {
		let mut chan = FakeChannel::new();
		chan.always(":TRIGger:STATus?", b"Stop")
			.always(":WAVeform:WIDTh?", b"BYTE")
			.always(":WAVeform:PREamble?", b"#9000000004abcd")
			.always(":WAVeform:DATA?", &framed(&[1]));
		let mut scope = Sds2000xPlus::with_channel(chan, ScopeConfig::default()).unwrap();
		assert!(matches!(scope.capture(Channel::C1), Err(ScopeError::MalformedPreamble(_))));
	}

	#[test]
	fn transport_errors_propagate() {
		let mut chan = FakeChannel::new();
		chan.always(":TRIGger:STATus?", b"Stop").always(":WAVeform:WIDTh?", b"BYTE");
		let mut scope = Sds2000xPlus::with_channel(chan, ScopeConfig::default()).unwrap();
		// The fake has nothing scripted for the preamble query
		assert!(matches!(scope.capture(Channel::C1), Err(ScopeError::Transport(_))));
	}

	#[test]
	fn capture_times_out_if_never_stopped() {
		let mut chan = FakeChannel::new();
		chan.always(":TRIGger:STATus?", b"Ready");
		let config = ScopeConfig { capture_timeout: std::time::Duration::from_millis(30), ..ScopeConfig::default() };
		let mut scope = Sds2000xPlus::with_channel(chan, config).unwrap();

		assert!(matches!(scope.capture(Channel::C1), Err(ScopeError::CaptureTimeout { .. })));
		assert_eq!(scope.into_inner().count(":WAVeform:DATA?"), 0);
	}

	#[test]
	fn acquire_arms_then_builds_trace() {
		let mut scope = stopped_scope("BYTE", Fields { total_points: 2, timebase_index: 11, sample_interval: 1e-9, ..Fields::default() }, &[10, 10]);
		let trace = scope.acquire(Channel::C4, None).unwrap();

		assert_eq!(trace.channel, Channel::C4);
		assert_eq!(trace.len(), 2);
		assert!((trace.times[0] - -5e-6).abs() < 1e-12);
		assert!(trace.times[1] > trace.times[0]);
		assert!(trace.points().all(|(_, v)| (v - 0.2).abs() < 1e-9));

		let sent = scope.into_inner().sent;
		assert_eq!(sent[1], ":TRIGger:MODE SINGle");
	}

	#[test]
	fn trace_needs_known_timebase() {
		let mut scope = stopped_scope("BYTE", Fields { total_points: 1, timebase_index: 200, ..Fields::default() }, &[0]);
		assert!(matches!(scope.capture_trace(Channel::C1), Err(ScopeError::Decode(_))));
	}

	#[test]
	fn acquire_many_reads_each_channel() {
		let mut scope = stopped_scope("BYTE", Fields { total_points: 1, ..Fields::default() }, &[0]);
		let traces = scope.acquire_many(&[Channel::C1, Channel::C3], None).unwrap();
		assert_eq!(traces.iter().map(|t| t.channel).collect::<Vec<_>>(), vec![Channel::C1, Channel::C3]);
		assert_eq!(scope.into_inner().count(":TRIGger:RUN"), 1);
	}
}
