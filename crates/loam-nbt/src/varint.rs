//! LEB128 varints as used by the Bedrock protocol. Signed values are
//! zigzag-encoded before being written.

use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub fn read_var_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut result: u32 = 0;
    for shift in (0..35).step_by(7) {
        let byte = reader.read_u8()?;
        result |= ((byte & 0x7F) as u32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "VarInt too big"))
}

pub fn read_var_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut result: u64 = 0;
    for shift in (0..70).step_by(7) {
        let byte = reader.read_u8()?;
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "VarLong too big"))
}

pub fn read_zigzag_i32<R: Read>(reader: &mut R) -> io::Result<i32> {
    let raw = read_var_u32(reader)?;
    Ok(((raw >> 1) as i32) ^ -((raw & 1) as i32))
}

pub fn read_zigzag_i64<R: Read>(reader: &mut R) -> io::Result<i64> {
    let raw = read_var_u64(reader)?;
    Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
}

pub fn write_var_u32<W: Write>(writer: &mut W, mut value: u32) -> io::Result<()> {
    while value & !0x7F != 0 {
        writer.write_u8(((value & 0x7F) as u8) | 0x80)?;
        value >>= 7;
    }
    writer.write_u8(value as u8)
}

pub fn write_var_u64<W: Write>(writer: &mut W, mut value: u64) -> io::Result<()> {
    while value & !0x7F != 0 {
        writer.write_u8(((value & 0x7F) as u8) | 0x80)?;
        value >>= 7;
    }
    writer.write_u8(value as u8)
}

pub fn write_zigzag_i32<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    write_var_u32(writer, ((value << 1) ^ (value >> 31)) as u32)
}

pub fn write_zigzag_i64<W: Write>(writer: &mut W, value: i64) -> io::Result<()> {
    write_var_u64(writer, ((value << 1) ^ (value >> 63)) as u64)
}
