use std::io;

use crate::xdr::Packer;

pub fn pack_device_link(packer:&mut Packer, link:i32) -> io::Result<()> {
	packer.pack_i32(link)
}

pub fn pack_create_link_parms(packer:&mut Packer, id:i32, lock_device:bool, lock_timeout:u32, device:&str) -> io::Result<()> {
	if !device.is_ascii() {
		return Err(io::Error::new(io::ErrorKind::InvalidInput, "VXI-11 device names must be ASCII"));
	}
	packer.pack_i32(id)?;
	packer.pack_bool(lock_device)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_variable_len_opaque(device.as_bytes())
}

pub fn pack_device_write_parms(packer:&mut Packer, link:i32, timeout:u32, lock_timeout:u32, flags:i32, data:&[u8]) -> io::Result<()> {
	packer.pack_i32(link)?;
	packer.pack_u32(timeout)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_i32(flags)?;
	packer.pack_variable_len_opaque(data)
}

pub fn pack_device_read_parms(packer:&mut Packer, link:i32, request_size:u32, timeout:u32, lock_timeout:u32, flags:i32, term_char:i32) -> io::Result<()> {
	packer.pack_i32(link)?;
	packer.pack_u32(request_size)?;
	packer.pack_u32(timeout)?;
	packer.pack_u32(lock_timeout)?;
	packer.pack_i32(flags)?;
	packer.pack_i32(term_char)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn write_parms_carry_data_as_opaque() {
		let mut packer = Packer::new();
		pack_device_write_parms(&mut packer, 1, 10000, 10000, 8, b"*IDN?").unwrap();
		// link, timeout, lock timeout, flags, length, five data bytes padded to eight
		assert_eq!(packer.as_bytes().len(), 5*4 + 8);
		assert_eq!(&packer.as_bytes()[16..20], &[0, 0, 0, 5]);
	}

	#[test]
	fn non_ascii_device_name_is_rejected() {
		let mut packer = Packer::new();
		assert!(pack_create_link_parms(&mut packer, 1, false, 0, "inst\u{e9}").is_err());
	}
}
