//! Minimal big-endian-free byte cursor used by the block/transaction parser.
//!
//! Zcash (like Bitcoin) serializes integers little-endian and length
//! prefixes as a variable-width "compact size" encoding; this mirrors that
//! without pulling in a general-purpose binary codec crate.

use crate::error::ParseError;

pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn need(&self, n: usize) -> Result<(), ParseError> {
        if self.data.len() - self.pos < n {
            Err(ParseError::Truncated {
                wanted: n,
                had: self.data.len() - self.pos,
            })
        } else {
            Ok(())
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        self.need(n)?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32, ParseError> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, ParseError> {
        Ok(i32::from_le_bytes(self.read_array::<4>()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ParseError> {
        Ok(u64::from_le_bytes(self.read_array::<8>()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, ParseError> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Bitcoin/Zcash "compact size" varint: values below 0xfd encode
    /// directly; 0xfd/0xfe/0xff prefix a following u16/u32/u64.
    pub fn read_compact_size(&mut self) -> Result<u64, ParseError> {
        let marker = self.read_u8()?;
        match marker {
            0..=0xfc => Ok(marker as u64),
            0xfd => Ok(u16::from_le_bytes(self.read_array::<2>()?) as u64),
            0xfe => Ok(u32::from_le_bytes(self.read_array::<4>()?) as u64),
            0xff => Ok(u64::from_le_bytes(self.read_array::<8>()?)),
        }
    }

    /// Reads a compact-size length prefix followed by that many bytes.
    pub fn read_compact_bytes(&mut self) -> Result<&'a [u8], ParseError> {
        let len = self.read_compact_size()?;
        if len > u32::MAX as u64 {
            return Err(ParseError::ImpossibleLength(format!(
                "compact-size byte string length {len} exceeds u32::MAX"
            )));
        }
        self.read_bytes(len as usize)
    }
}

pub fn write_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}
