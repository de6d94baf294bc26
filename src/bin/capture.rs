
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use sds2000x::{Channel, ScopeConfig, ScopeError, Sds2000xPlus};
use sds2000x::devices::sds2000x::WaveformWidth;

/// Arm an SDS2000X Plus for one single-shot capture and save the waveform as JSON
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
	/// Hostname or IP address of the oscilloscope
	host: String,

	/// Channels to read from the capture (C1-C4 or 1-4)
	#[arg(short, long, default_value = "C1", value_delimiter = ',')]
	channel: Vec<Channel>,

	/// JSON session config (poll_interval_sec, capture_timeout_sec, tx_throttle_sec, io_timeout_sec)
	#[arg(long)]
	config: Option<PathBuf>,

	/// Override the capture timeout, in seconds
	#[arg(short, long)]
	timeout: Option<f64>,

	/// Transfer 16-bit samples instead of 8-bit
	#[arg(long)]
	word: bool,

	/// Output file; stdout when omitted
	#[arg(short, long)]
	output: Option<PathBuf>,
}

fn parse_timeout(t:f64) -> Result<Duration, ScopeError> {
	match Duration::try_from_secs_f64(t) {
		Ok(d) if !d.is_zero() => Ok(d),
		_ => Err(ScopeError::Config(format!("timeout must be a positive number of seconds, got {}", t))),
	}
}

fn run(args:Args) -> Result<(), ScopeError> {
	let mut config = match &args.config {
		Some(path) => ScopeConfig::from_json_file(path)?,
		None => ScopeConfig::default(),
	};
	if let Some(t) = args.timeout {
		config.capture_timeout = parse_timeout(t)?;
	}

	let mut dev = Sds2000xPlus::connect(&args.host, config)?;
	log::info!("Connected to {} {}", dev.identity().product, dev.identity().serial);

	dev.set_waveform_width(if args.word { WaveformWidth::Word } else { WaveformWidth::Byte })?;

	let traces = dev.acquire_many(&args.channel, None)?;
	for t in traces.iter() {
		log::info!("{}: {} samples", t.channel, t.len());
	}

	let json = serde_json::to_string_pretty(&traces).map_err(|e| ScopeError::Decode(e.to_string()))?;
	match &args.output {
		Some(path) => std::fs::write(path, json.as_bytes())?,
		None => println!("{}", json),
	}

	Ok(())
}

fn main() -> ExitCode {
	env_logger::init();

	match run(Args::parse()) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			log::error!("{}", e);
			eprintln!("Error: {}", e);
			ExitCode::FAILURE
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timeout_must_fit_a_duration() {
		assert_eq!(parse_timeout(2.5).unwrap(), Duration::from_millis(2500));
		for t in [0.0, -1.0, 1e30, f64::NAN, f64::INFINITY].iter() {
			assert!(matches!(parse_timeout(*t), Err(ScopeError::Config(_))), "{}", t);
		}
	}
}
