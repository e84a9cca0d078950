//! Byte sink for slice data with emulation prevention.
//!
//! The sink owns the output buffer of one slice-segment encode pass. Every
//! byte goes through [`Bitstream::put_byte_with_epb`], which inserts an
//! emulation prevention byte (0x03) whenever two zero bytes would be
//! followed by a byte in `0x00..=0x03`.

use crate::error::{EntropyError, Result};

/// Emulation prevention byte.
pub const EMULATION_PREVENTION_BYTE: u8 = 0x03;

/// Number of trailing bytes a carry can touch.
const CARRY_LOOKBACK: usize = 4;

/// Output buffer with a hard capacity and an emulation prevention state.
#[derive(Debug, Clone)]
pub struct Bitstream {
    /// Bytes written so far; the write offset is `data.len()`.
    data: Vec<u8>,
    /// Reserved capacity.
    max_size: usize,
    /// Number of consecutive zero bytes at the end of `data`.
    zero_run: u32,
    /// Start offsets of NAL units written into this buffer.
    nal_unit_offsets: Vec<usize>,
}

/// Saved write position, used to rewind a speculative write.
///
/// Carries can modify already written bytes, so the last bytes before the
/// mark are kept along with the offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitstreamMark {
    offset: usize,
    zero_run: u32,
    tail: [u8; CARRY_LOOKBACK],
    tail_len: usize,
}

impl BitstreamMark {
    /// Write offset captured by the mark.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Bitstream {
    /// Create an empty bitstream with the given capacity in bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            data: Vec::with_capacity(max_size.min(1 << 20)),
            max_size,
            zero_run: 0,
            nal_unit_offsets: Vec::new(),
        }
    }

    /// Create a bitstream that already holds `prefix`, typically a slice
    /// segment header written elsewhere.
    pub fn with_prefix(prefix: &[u8], max_size: usize) -> Result<Self> {
        if prefix.len() > max_size {
            return Err(EntropyError::BufferOverflow {
                offset: 0,
                required: prefix.len(),
                capacity: max_size,
            });
        }

        let mut stream = Self::new(max_size);
        stream.data.extend_from_slice(prefix);
        stream.zero_run = prefix.iter().rev().take_while(|&&b| b == 0).count().min(2) as u32;
        Ok(stream)
    }

    /// Current write offset.
    pub fn offset(&self) -> usize {
        self.data.len()
    }

    /// Reserved capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Consecutive zero bytes at the end of the buffer.
    pub fn zero_run(&self) -> u32 {
        self.zero_run
    }

    /// Bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Record the start of a new NAL unit at the current offset.
    pub fn begin_nal_unit(&mut self) {
        self.nal_unit_offsets.push(self.data.len());
    }

    /// Start offsets of the NAL units recorded with [`begin_nal_unit`](Self::begin_nal_unit).
    pub fn nal_unit_offsets(&self) -> &[usize] {
        &self.nal_unit_offsets
    }

    /// Fail unless `bytes` more bytes, with the prevention bytes a zero run
    /// among them may need, fit strictly below the capacity.
    ///
    /// The engine calls this before resolving outstanding bytes so that a
    /// byte emission either completes or writes nothing.
    pub fn ensure_room(&self, bytes: usize) -> Result<()> {
        // at most one prevention byte per two data bytes, plus one when
        // the buffer already ends in two zeros
        let required = bytes + bytes / 2 + 1;
        if self.data.len() + required >= self.max_size {
            return Err(EntropyError::BufferOverflow {
                offset: self.data.len(),
                required,
                capacity: self.max_size,
            });
        }
        Ok(())
    }

    /// Append one byte, inserting an emulation prevention byte first when
    /// the two preceding bytes are zero and `byte & 0xFC == 0`.
    pub fn put_byte_with_epb(&mut self, byte: u8) -> Result<()> {
        let needs_epb = self.zero_run == 2 && (byte & 0xFC) == 0;
        let required = if needs_epb { 2 } else { 1 };

        if self.data.len() + required > self.max_size {
            return Err(EntropyError::BufferOverflow {
                offset: self.data.len(),
                required,
                capacity: self.max_size,
            });
        }

        if needs_epb {
            self.data.push(EMULATION_PREVENTION_BYTE);
            self.zero_run = 0;
        }

        self.data.push(byte);
        self.zero_run = if byte == 0 { self.zero_run + 1 } else { 0 };
        Ok(())
    }

    /// Propagate an arithmetic-coder carry into the last written byte.
    ///
    /// When the buffer ends in `00 00 03 03`, the trailing byte is data that
    /// forced an emulation prevention byte. After the increment it no
    /// longer needs one, so the carry is applied to the prevention byte
    /// position instead and the data byte is dropped.
    pub(crate) fn add_carry(&mut self) -> Result<()> {
        let len = self.data.len();
        if len >= CARRY_LOOKBACK && self.data[len - CARRY_LOOKBACK..] == [0x00, 0x00, 0x03, 0x03] {
            self.data.truncate(len - 1);
        }

        match self.data.last_mut() {
            Some(last) => {
                *last = last.wrapping_add(1);
                self.zero_run = 0;
                Ok(())
            }
            // a carry with nothing to absorb it
            None => Err(EntropyError::BufferOverflow {
                offset: 0,
                required: 1,
                capacity: self.max_size,
            }),
        }
    }

    /// Capture the write position for a later [`rewind`](Self::rewind).
    pub fn mark(&self) -> BitstreamMark {
        let len = self.data.len();
        let tail_len = len.min(CARRY_LOOKBACK);
        let mut tail = [0u8; CARRY_LOOKBACK];
        tail[..tail_len].copy_from_slice(&self.data[len - tail_len..]);

        BitstreamMark {
            offset: len,
            zero_run: self.zero_run,
            tail,
            tail_len,
        }
    }

    /// Restore the buffer to a previously captured mark.
    pub fn rewind(&mut self, mark: &BitstreamMark) {
        self.data.resize(mark.offset, 0);
        let start = mark.offset - mark.tail_len;
        self.data[start..].copy_from_slice(&mark.tail[..mark.tail_len]);
        self.zero_run = mark.zero_run;
        self.nal_unit_offsets.retain(|&o| o <= mark.offset);
    }
}

/// Strip emulation prevention bytes, yielding the RBSP payload.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len());
    let mut zeros = 0;

    for &byte in data {
        if zeros == 2 && byte == EMULATION_PREVENTION_BYTE {
            zeros = 0;
            continue;
        }

        result.push(byte);
        zeros = if byte == 0 { zeros + 1 } else { 0 };
    }

    result
}
