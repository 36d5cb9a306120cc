use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryFault {
    #[error("memory access out of bounds at byte address {addr}")]
    OutOfBounds { addr: i32 },
    #[error("misaligned word access at byte address {addr}")]
    Misaligned { addr: i32 },
}

/// Flat byte-addressable memory. Accesses are word (4-byte) aligned and
/// bounds checked; a violation is a fatal simulator fault.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    bytes: BytesMut,
}
impl Memory {
    pub fn new(words: usize) -> Self {
        let mut bytes = BytesMut::with_capacity(words * 4);
        bytes.put_bytes(0, words * 4);
        Self { bytes }
    }

    pub fn words(&self) -> usize {
        self.bytes.len() / 4
    }

    pub fn read_word(&self, addr: i32) -> Result<i32, MemoryFault> {
        let offset = self.check(addr)?;
        Ok((&self.bytes[offset..offset + 4]).get_i32())
    }

    pub fn write_word(&mut self, addr: i32, value: i32) -> Result<(), MemoryFault> {
        let offset = self.check(addr)?;
        (&mut self.bytes[offset..offset + 4]).put_i32(value);
        Ok(())
    }

    pub fn to_words(&self) -> Vec<i32> {
        let mut slice = &self.bytes[..];
        let mut words = Vec::with_capacity(self.words());
        while slice.remaining() >= 4 {
            words.push(slice.get_i32());
        }
        words
    }

    fn check(&self, addr: i32) -> Result<usize, MemoryFault> {
        if addr < 0 {
            return Err(MemoryFault::OutOfBounds { addr });
        }
        if addr % 4 != 0 {
            return Err(MemoryFault::Misaligned { addr });
        }
        let offset = addr as usize;
        if offset + 4 > self.bytes.len() {
            return Err(MemoryFault::OutOfBounds { addr });
        }
        Ok(offset)
    }
}
