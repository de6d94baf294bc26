//! Arming the trigger and waiting for a single-shot capture to finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Serialize, Deserialize};

use crate::command::CommandChannel;
use super::{unexpected, Result, ScopeError, Sds2000xPlus};

/// Response to `:TRIGger:STATus?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerState { Arm, Ready, Auto, Triggered, Stopped, Roll }

impl TriggerState {
	pub fn parse(s:&str) -> Option<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"ARM"                  => Some(TriggerState::Arm),
			"READY"                => Some(TriggerState::Ready),
			"AUTO"                 => Some(TriggerState::Auto),
			"TRIG'D" | "TRIGGERED" => Some(TriggerState::Triggered),
			"STOP"                 => Some(TriggerState::Stopped),
			"ROLL"                 => Some(TriggerState::Roll),
			_                      => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode { Single, Normal, Auto, ForceTrigger }

impl TriggerMode {
	pub fn as_str(&self) -> &'static str { match self {
		TriggerMode::Single       => "SINGle",
		TriggerMode::Normal       => "NORMal",
		TriggerMode::Auto         => "AUTO",
		TriggerMode::ForceTrigger => "FTRIG",
	}}

	// The instrument answers in long form but accepts both
	pub fn parse(s:&str) -> Option<Self> {
		match s.trim().to_ascii_uppercase().as_str() {
			"SINGLE" | "SING" => Some(TriggerMode::Single),
			"NORMAL" | "NORM" => Some(TriggerMode::Normal),
			"AUTO"            => Some(TriggerMode::Auto),
			"FTRIG"           => Some(TriggerMode::ForceTrigger),
			_                 => None,
		}
	}
}

/// Cooperative cancellation for [`Sds2000xPlus::wait_for_capture`], checked before every status poll.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self { Self::default() }
	pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
	pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

impl<C: CommandChannel> Sds2000xPlus<C> {

	pub fn trigger_mode(&mut self) -> Result<TriggerMode> {
		let res = self.ask(":TRIGger:MODE?")?;
		TriggerMode::parse(&res).ok_or_else(|| unexpected(":TRIGger:MODE?", &res))
	}

	pub fn set_trigger_mode(&mut self, mode:TriggerMode) -> Result<()> {
		self.send(&format!(":TRIGger:MODE {}", mode.as_str()))
	}

	pub fn trigger_state(&mut self) -> Result<TriggerState> {
		let res = self.ask(":TRIGger:STATus?")?;
		TriggerState::parse(&res).ok_or_else(|| unexpected(":TRIGger:STATus?", &res))
	}

	pub fn run(&mut self) -> Result<()> { self.send(":TRIGger:RUN") }
	pub fn stop(&mut self) -> Result<()> { self.send(":TRIGger:STOP") }

	/// Blocks until the instrument reports that all pending operations have finished.
	pub fn operation_complete(&mut self) -> Result<()> {
		let res = self.ask("*OPC?")?;
		if res.trim() == "1" { Ok(()) } else { Err(unexpected("*OPC?", &res)) }
	}

	/// Puts the instrument in single-shot mode and starts it waiting for a trigger.
	pub fn arm(&mut self) -> Result<()> {
		self.set_trigger_mode(TriggerMode::Single)?;
		self.run()?;
		self.operation_complete()?;
		log::debug!("Armed for a single capture");
		Ok(())
	}

	/// Polls the trigger status until it reads `Stop`.
	///
	/// Any other status keeps the loop going.  The status is queried at least once, even with a zero timeout,
	/// and the last poll happens no later than the deadline.
	pub fn wait_for_capture(&mut self, poll_interval:Duration, timeout:Duration, cancel:Option<&CancelToken>) -> Result<()> {
		let start = Instant::now();
		// A timeout too long to represent never expires
		let deadline = start.checked_add(timeout);
		let mut polls:u32 = 0;

		loop {
			if cancel.map_or(false, CancelToken::is_cancelled) {
				log::debug!("Capture wait cancelled after {} polls", polls);
				return Err(ScopeError::Cancelled);
			}

			let state = self.trigger_state()?;
			polls += 1;
			log::trace!("Poll {}: trigger state {:?}", polls, state);

			if state == TriggerState::Stopped {
				log::debug!("Capture complete after {} polls ({:?})", polls, start.elapsed());
				return Ok(());
			}

			let pause = match deadline {
				Some(deadline) => {
					let now = Instant::now();
					if now >= deadline {
						return Err(ScopeError::CaptureTimeout { waited: now - start });
					}
					poll_interval.min(deadline - now)
				},
				None => poll_interval,
			};
			thread::sleep(pause);
		}
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::devices::sds2000x::ScopeConfig;
	use crate::devices::sds2000x::testing::FakeChannel;

	fn scope(chan:FakeChannel) -> Sds2000xPlus<FakeChannel> {
		Sds2000xPlus::with_channel(chan, ScopeConfig::default()).unwrap()
	}

	const POLL:&str = ":TRIGger:STATus?";

	#[test]
	fn trigger_states_parse() {
		assert_eq!(TriggerState::parse("Stop\n"), Some(TriggerState::Stopped));
		assert_eq!(TriggerState::parse("Trig'd"), Some(TriggerState::Triggered));
		assert_eq!(TriggerState::parse("Ready"), Some(TriggerState::Ready));
		assert_eq!(TriggerState::parse("Roll"), Some(TriggerState::Roll));
		assert_eq!(TriggerState::parse("Sleeping"), None);
	}

	#[test]
	fn arm_sets_single_runs_and_waits_for_opc() {
		let mut chan = FakeChannel::new();
		chan.always("*OPC?", b"1\n");
		let mut scope = scope(chan);

		scope.arm().unwrap();
		let sent = &scope.into_inner().sent;
		assert_eq!(&sent[1..], &[":TRIGger:MODE SINGle", ":TRIGger:RUN", "*OPC?"]);
	}

	#[test]
	fn arm_fails_on_bad_opc() {
		let mut chan = FakeChannel::new();
		chan.always("*OPC?", b"0");
		assert!(matches!(scope(chan).arm(), Err(ScopeError::UnexpectedResponse { .. })));
	}

	#[test]
	fn wait_returns_on_first_stop_without_further_polls() {
		let mut chan = FakeChannel::new();
		chan.then(POLL, b"Arm").then(POLL, b"Ready").then(POLL, b"Trig'd").then(POLL, b"Stop").always(POLL, b"Ready");
		let mut scope = scope(chan);

		scope.wait_for_capture(Duration::from_millis(1), Duration::from_secs(5), None).unwrap();
		assert_eq!(scope.into_inner().count(POLL), 4);
	}

	#[test]
	fn wait_times_out_when_never_stopped() {
		let mut chan = FakeChannel::new();
		chan.always(POLL, b"Ready");
		let mut scope = scope(chan);

		let started = Instant::now();
		match scope.wait_for_capture(Duration::from_millis(5), Duration::from_millis(50), None) {
			Err(ScopeError::CaptureTimeout { waited }) => assert!(waited >= Duration::from_millis(50)),
			other => panic!("expected a timeout, got {:?}", other),
		}
		assert!(started.elapsed() < Duration::from_secs(2));
	}

	#[test]
	fn unbounded_timeout_waits_for_stop() {
		let mut chan = FakeChannel::new();
		chan.then(POLL, b"Ready").then(POLL, b"Trig'd").always(POLL, b"Stop");
		let mut scope = scope(chan);

		scope.wait_for_capture(Duration::from_millis(1), Duration::MAX, None).unwrap();
		assert_eq!(scope.into_inner().count(POLL), 3);
	}

	#[test]
	fn wait_respects_cancellation() {
		let mut chan = FakeChannel::new();
		chan.always(POLL, b"Ready");
		let mut scope = scope(chan);

		let cancel = CancelToken::new();
		cancel.cancel();
		assert!(matches!(scope.wait_for_capture(Duration::from_millis(1), Duration::from_secs(5), Some(&cancel)), Err(ScopeError::Cancelled)));
		assert_eq!(scope.into_inner().count(POLL), 0);
	}

	#[test]
	fn cancel_from_another_thread() {
		let mut chan = FakeChannel::new();
		chan.always(POLL, b"Auto");
		let mut scope = scope(chan);

		let cancel = CancelToken::new();
		let remote = cancel.clone();
		let canceller = thread::spawn(move || {
			thread::sleep(Duration::from_millis(20));
			remote.cancel();
		});

		let res = scope.wait_for_capture(Duration::from_millis(2), Duration::from_secs(10), Some(&cancel));
		canceller.join().unwrap();
		assert!(matches!(res, Err(ScopeError::Cancelled)));
	}

	#[test]
	fn unknown_status_is_an_error() {
		let mut chan = FakeChannel::new();
		chan.always(POLL, b"Bogus");
		assert!(matches!(scope(chan).wait_for_capture(Duration::from_millis(1), Duration::from_secs(1), None), Err(ScopeError::UnexpectedResponse { .. })));
	}

	#[test]
	fn trigger_mode_round_trip() {
		let mut chan = FakeChannel::new();
		chan.always(":TRIGger:MODE?", b"NORMal\n");
		let mut scope = scope(chan);

		scope.set_trigger_mode(TriggerMode::Normal).unwrap();
		assert_eq!(scope.trigger_mode().unwrap(), TriggerMode::Normal);
		assert_eq!(scope.into_inner().count(":TRIGger:MODE NORMal"), 1);
	}
}
