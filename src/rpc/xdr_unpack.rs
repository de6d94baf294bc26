
use std::io::{self, Error, ErrorKind};

use crate::xdr::Unpacker;
use crate::rpc::{REPLY, MSG_DENIED, RPC_MISMATCH, AUTH_ERROR, MSG_ACCEPTED, PROG_UNAVAIL, PROG_MISMATCH, PROC_UNAVAIL, GARBAGE_ARGS, SYSTEM_ERR, SUCCESS};

fn err(msg:String) -> io::Error { Error::new(ErrorKind::Other, msg) }

pub fn unpack_auth(unpacker:&mut Unpacker) -> io::Result<(i32, Vec<u8>)> {
	let flavor:i32    = unpacker.unpack_enum()?;
	let stuff:Vec<u8> = unpacker.unpack_variable_len_opaque()?;
	Ok((flavor, stuff))
}

// Returns the xid of an accepted, successful reply.  The unpacker is left positioned at the procedure results.
pub fn unpack_replyheader(unpacker:&mut Unpacker) -> io::Result<u32> {
	let xid:u32 = unpacker.unpack_u32()?;

	let mtype:i32 = unpacker.unpack_enum()?;
	if mtype != REPLY { return Err(err(format!("Expected REPLY message type but got {}", mtype))); }

	match unpacker.unpack_enum()? {
		MSG_DENIED => {
			return match unpacker.unpack_enum()? {
				RPC_MISMATCH => {
					let low  = unpacker.unpack_u32()?;
					let high = unpacker.unpack_u32()?;
					Err(err(format!("Message denied, RPC version mismatch (supported {}..{})", low, high)))
				},
				AUTH_ERROR => {
					let stat = unpacker.unpack_u32()?;
					Err(err(format!("Message denied, authentication error {}", stat)))
				},
				other => Err(err(format!("Message denied for unknown reason {}", other))),
			};
		},
		MSG_ACCEPTED => { },
		other => return Err(err(format!("Neither MSG_DENIED nor MSG_ACCEPTED in reply: {}", other))),
	}

	let _verf = unpack_auth(unpacker)?;

	match unpacker.unpack_enum()? {
		SUCCESS       => Ok(xid),
		PROG_UNAVAIL  => Err(err("Program unavailable".to_owned())),
		PROG_MISMATCH => {
			let low  = unpacker.unpack_u32()?;
			let high = unpacker.unpack_u32()?;
			Err(err(format!("Program version mismatch (supported {}..{})", low, high)))
		},
		PROC_UNAVAIL  => Err(err("Procedure unavailable".to_owned())),
		GARBAGE_ARGS  => Err(err("Server could not decode arguments".to_owned())),
		SYSTEM_ERR    => Err(err("Server system error".to_owned())),
		other         => Err(err(format!("Call failed with unknown accept status {}", other))),
	}
}
