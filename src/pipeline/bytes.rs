//! Little-endian cursor helpers for the binary asset formats.

use crate::error::CacheError;

pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Reader positioned at `pos`.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CacheError> {
        let end = self.pos.checked_add(n).ok_or(CacheError::Truncated(self.pos))?;
        let s = self.bytes.get(self.pos..end).ok_or(CacheError::Truncated(self.pos))?;
        self.pos = end;
        Ok(s)
    }

    pub fn u8(&mut self) -> Result<u8, CacheError> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16, CacheError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> Result<u32, CacheError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> Result<u64, CacheError> {
        let b = self.take(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(u64::from_le_bytes(a))
    }

    /// `u32` length followed by that many bytes.
    pub fn blob(&mut self) -> Result<&'a [u8], CacheError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    /// `u32` unit count followed by UTF-16 code units.
    pub fn utf16(&mut self) -> Result<String, CacheError> {
        let len = self.u32()? as usize;
        let raw = self.take(len.checked_mul(2).ok_or(CacheError::Truncated(self.pos))?)?;
        let units: Vec<u16> = raw
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units).map_err(|_| CacheError::InvalidUtf16)
    }
}

#[derive(Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    pub fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn blob(&mut self, b: &[u8]) {
        self.u32(b.len() as u32);
        self.bytes(b);
    }

    pub fn utf16(&mut self, s: &str) {
        let units: Vec<u16> = s.encode_utf16().collect();
        self.u32(units.len() as u32);
        for u in units {
            self.bytes.extend_from_slice(&u.to_le_bytes());
        }
    }

    /// Overwrite a previously written `u32` at `pos`.
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        if let Some(dst) = self.bytes.get_mut(pos..pos + 4) {
            dst.copy_from_slice(&v.to_le_bytes());
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_utf16_with_unit_count() {
        let mut w = ByteWriter::new();
        w.utf16("a.hlsl");
        let bytes = w.into_inner();
        assert_eq!(&bytes[..4], &6u32.to_le_bytes());
        assert_eq!(bytes.len(), 4 + 12);
        assert_eq!(ByteReader::new(&bytes).utf16().unwrap(), "a.hlsl");
    }

    #[test]
    fn short_input_reports_position() {
        let mut r = ByteReader::new(&[1, 0, 0, 0, 9]);
        assert_eq!(r.u32().unwrap(), 1);
        assert_eq!(r.u32(), Err(CacheError::Truncated(4)));
    }
}
