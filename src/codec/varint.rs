use crate::errors::{Error, Result};

/// Longest LEB128 encoding of a 64-bit value.
const MAX_VARINT_BYTES: usize = 10;

/// Forward-only view over a byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteCursor { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.position).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = self
            .peek_u8()
            .ok_or_else(|| Error::truncated("byte", self.position))?;
        self.position += 1;
        Ok(byte)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::truncated("byte run", self.position));
        }
        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Reads up to (and consumes) the next zero byte.
    pub fn read_cstr(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.position..];
        let end = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| Error::truncated("zero-terminated string", self.data.len()))?;
        self.position += end + 1;
        Ok(&rest[..end])
    }

    /// Moves to an absolute offset at or after the current position.
    pub fn skip_to(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(Error::truncated("skip", self.data.len()));
        }
        self.position = offset.max(self.position);
        Ok(())
    }

    /// Bytes consumed since `start`.
    pub fn slice_from(&self, start: usize) -> &'a [u8] {
        &self.data[start.min(self.position)..self.position]
    }

    /// Restricts the cursor to the next `len` bytes and advances past them.
    pub fn sub_cursor(&mut self, len: usize) -> Result<ByteCursor<'a>> {
        Ok(ByteCursor::new(self.read_bytes(len)?))
    }
}

pub fn read_unsigned_varint(cursor: &mut ByteCursor<'_>) -> Result<u64> {
    let start = cursor.position();
    let mut value: u64 = 0;
    for index in 0..MAX_VARINT_BYTES {
        let byte = cursor
            .read_u8()
            .map_err(|_| Error::truncated("varint", start))?;
        let payload = u64::from(byte & 0x7f);
        if index == MAX_VARINT_BYTES - 1 && payload > 1 {
            return Err(Error::Overflow { offset: start });
        }
        value |= payload << (7 * index);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::Overflow { offset: start })
}

pub fn read_signed_varint(cursor: &mut ByteCursor<'_>) -> Result<i64> {
    read_unsigned_varint(cursor).map(decode_zigzag)
}

pub fn decode_zigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

pub fn encode_zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn write_unsigned_varint(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn write_signed_varint(out: &mut Vec<u8>, value: i64) {
    write_unsigned_varint(out, encode_zigzag(value));
}
