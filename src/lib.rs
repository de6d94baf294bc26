
#[macro_use]
extern crate lazy_static;

// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// The text command seam that device drivers are written against
pub mod command;

// Module for devices reachable through a command channel
pub mod devices;

pub use command::CommandChannel;
pub use devices::sds2000x::{Channel, ScopeConfig, ScopeError, Sds2000xPlus};
