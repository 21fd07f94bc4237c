/*
 * BSD 2-Clause License
 *
 * Copyright (c) 2021, Khaled Emara
 * All rights reserved.
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions are met:
 *
 * 1. Redistributions of source code must retain the above copyright notice, this
 *    list of conditions and the following disclaimer.
 *
 * 2. Redistributions in binary form must reproduce the above copyright notice,
 *    this list of conditions and the following disclaimer in the documentation
 *    and/or other materials provided with the distribution.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS"
 * AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
 * IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
 * DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE
 * FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
 * DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
 * SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER
 * CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY,
 * OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
 * OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */
use byteorder::{BigEndian, ByteOrder};

use super::definitions::FourCC;
use super::error::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// One materialized allocator block: an immutable byte buffer with a
/// strictly bounds-checked cursor.  All integer reads are big-endian.
#[derive(Clone, Debug)]
pub struct Block {
    value: Vec<u8>,
    pos: usize,
}

impl Block {
    pub fn new(value: Vec<u8>) -> Self {
        Block { value, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.value.len() - self.pos
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.value
    }

    /// The unread tail of the block.
    pub fn rest(&self) -> &[u8] {
        &self.value[self.pos..]
    }

    /// Move the cursor.  `Whence::End` positions the cursor `pos` bytes
    /// *before* the end: the argument is `size - pos`, not `size + pos`.
    pub fn seek(&mut self, pos: i64, whence: Whence) -> Result<()> {
        let pos = match whence {
            Whence::Set => pos,
            Whence::Cur => pos + self.pos as i64,
            Whence::End => self.value.len() as i64 - pos,
        };
        if pos < 0 || pos > self.value.len() as i64 {
            return Err(Error::OutOfRange);
        }
        self.pos = pos as usize;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        if self.remaining() < n {
            return Err(Error::ShortRead {
                wanted: n,
                remaining: self.remaining(),
            });
        }
        let data = &self.value[self.pos..self.pos + n];
        self.pos += n;
        Ok(data)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.take(n).map(|d| d.to_vec())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.take(1).map(|d| d[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take(2).map(BigEndian::read_u16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take(4).map(BigEndian::read_u32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.take(8).map(BigEndian::read_u64)
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let d = self.take(4)?;
        Ok(FourCC([d[0], d[1], d[2], d[3]]))
    }
}

#[cfg(test)]
mod t {
    use super::*;

    fn harness() -> Block {
        Block::new((0u8..10).collect())
    }

    #[test]
    fn seek_set() {
        let mut b = harness();
        b.seek(4, Whence::Set).unwrap();
        assert_eq!(b.tell(), 4);
        assert_eq!(b.read_u8().unwrap(), 4);
    }

    #[test]
    fn seek_cur() {
        let mut b = harness();
        b.seek(4, Whence::Set).unwrap();
        b.seek(-2, Whence::Cur).unwrap();
        assert_eq!(b.tell(), 2);
        b.seek(3, Whence::Cur).unwrap();
        assert_eq!(b.tell(), 5);
    }

    /// `Whence::End` measures backwards from the end.
    #[test]
    fn seek_end() {
        let mut b = harness();
        b.seek(4, Whence::End).unwrap();
        assert_eq!(b.tell(), 6);
        b.seek(0, Whence::End).unwrap();
        assert_eq!(b.tell(), 10);
    }

    #[test]
    fn seek_out_of_range() {
        let mut b = harness();
        assert!(matches!(b.seek(11, Whence::Set), Err(Error::OutOfRange)));
        assert!(matches!(b.seek(-1, Whence::Set), Err(Error::OutOfRange)));
        assert!(matches!(b.seek(11, Whence::End), Err(Error::OutOfRange)));
        // the cursor is untouched by a failed seek
        assert_eq!(b.tell(), 0);
    }

    #[test]
    fn short_read() {
        let mut b = harness();
        b.seek(8, Whence::Set).unwrap();
        let e = b.read_bytes(4).unwrap_err();
        assert!(matches!(
            e,
            Error::ShortRead {
                wanted: 4,
                remaining: 2
            }
        ));
        // a failed read consumes nothing
        assert_eq!(b.tell(), 8);
    }

    #[test]
    fn big_endian_reads() {
        let mut b = Block::new(vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        assert_eq!(b.read_u16().unwrap(), 0x0102);
        assert_eq!(b.read_u32().unwrap(), 0x0304_0506);
        assert_eq!(b.remaining(), 2);
    }

    #[test]
    fn fourcc_read() {
        let mut b = Block::new(b"Ilocblob".to_vec());
        assert_eq!(b.read_fourcc().unwrap(), FourCC(*b"Iloc"));
        assert_eq!(b.read_fourcc().unwrap(), FourCC(*b"blob"));
    }
}
