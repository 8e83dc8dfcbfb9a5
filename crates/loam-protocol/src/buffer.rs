use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use loam_nbt::varint;
use std::io::{self, Read};

fn eof(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("Not enough bytes to read {}", what),
    )
}

/// Read cursor over a received payload.
/// The payload is shared, so slicing out sub-ranges does not copy.
#[derive(Debug, Clone)]
pub struct PacketBuffer {
    buffer: Bytes,
    cursor: usize,
}

impl PacketBuffer {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer, cursor: 0 }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(Bytes::from(bytes))
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn peek_byte(&self) -> Option<u8> {
        self.buffer.get(self.cursor).copied()
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        let byte = self.peek_byte().ok_or_else(|| eof("u8"))?;
        self.cursor += 1;
        Ok(byte)
    }

    /// Reads an u32 in network (big-endian) order.
    pub fn read_u32_be(&mut self) -> io::Result<u32> {
        let bytes = self.read_array::<4>("u32")?;
        Ok(BigEndian::read_u32(&bytes))
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> io::Result<[u8; N]> {
        if self.remaining() < N {
            return Err(eof(what));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buffer[self.cursor..self.cursor + N]);
        self.cursor += N;
        Ok(out)
    }

    /// Slices `length` bytes out of the payload.
    pub fn read_bytes(&mut self, length: usize) -> io::Result<Bytes> {
        if self.remaining() < length {
            return Err(eof("byte array"));
        }
        let bytes = self.buffer.slice(self.cursor..self.cursor + length);
        self.cursor += length;
        Ok(bytes)
    }

    pub fn read_var_u32(&mut self) -> io::Result<u32> {
        varint::read_var_u32(self)
    }

    /// Zigzag-encoded signed VarInt.
    pub fn read_zigzag_i32(&mut self) -> io::Result<i32> {
        varint::read_zigzag_i32(self)
    }

    /// Advances the cursor by up to `length` bytes and returns how many were skipped.
    pub fn skip(&mut self, length: usize) -> usize {
        let skipped = length.min(self.remaining());
        self.cursor += skipped;
        skipped
    }

    /// Everything after the cursor, without advancing.
    pub fn rest(&self) -> &[u8] {
        &self.buffer[self.cursor..]
    }
}

impl Read for PacketBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.remaining());
        buf[..count].copy_from_slice(&self.buffer[self.cursor..self.cursor + count]);
        self.cursor += count;
        Ok(count)
    }
}
