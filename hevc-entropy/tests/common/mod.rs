//! Shared helpers for the integration tests: a straightforward CABAC
//! decoder used to check that encoded bins come back unchanged.

#![allow(dead_code)]

use hevc_entropy::cabac::{BinKind, RecordedBin};
use hevc_entropy::tables::{NEXT_STATE_LPS, NEXT_STATE_MPS, RANGE_TAB_LPS};
use hevc_entropy::ContextTable;

/// Bit reader over an RBSP; reads past the end yield zeros.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn read_bit(&mut self) -> u32 {
        let byte = self.data.get(self.pos / 8).copied().unwrap_or(0);
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        bit as u32
    }

    pub fn read_bits(&mut self, n: u32) -> u32 {
        (0..n).fold(0, |acc, _| (acc << 1) | self.read_bit())
    }

    pub fn bit_position(&self) -> usize {
        self.pos
    }
}

/// Arithmetic decoder following the decoding process of H.265 9.3.4.3.
pub struct ReferenceDecoder<'a> {
    reader: BitReader<'a>,
    range: u32,
    offset: u32,
    contexts: ContextTable,
}

impl<'a> ReferenceDecoder<'a> {
    pub fn new(data: &'a [u8], contexts: ContextTable) -> Self {
        let mut reader = BitReader::new(data);
        let offset = reader.read_bits(9);
        Self {
            reader,
            range: 510,
            offset,
            contexts,
        }
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    pub fn decode_decision(&mut self, ctx_idx: usize) -> u32 {
        let packed = self.contexts.get(ctx_idx);
        let state = (packed >> 1) as usize;
        let mps = (packed & 1) as u32;

        let lps = RANGE_TAB_LPS[state][((self.range >> 6) & 3) as usize] as u32;
        self.range -= lps;

        let bin = if self.offset >= self.range {
            self.offset -= self.range;
            self.range = lps;
            let next_mps = if state == 0 { 1 - mps } else { mps };
            self.contexts.set(ctx_idx, (NEXT_STATE_LPS[state] << 1) | next_mps as u8);
            1 - mps
        } else {
            self.contexts.set(ctx_idx, (NEXT_STATE_MPS[state] << 1) | mps as u8);
            mps
        };

        while self.range < 256 {
            self.range <<= 1;
            self.offset = (self.offset << 1) | self.reader.read_bit();
        }
        bin
    }

    pub fn decode_bypass(&mut self) -> u32 {
        self.offset = (self.offset << 1) | self.reader.read_bit();
        if self.offset >= self.range {
            self.offset -= self.range;
            1
        } else {
            0
        }
    }

    pub fn decode_bypass_bins(&mut self, count: u32) -> u32 {
        (0..count).fold(0, |acc, _| (acc << 1) | self.decode_bypass())
    }

    pub fn decode_terminate(&mut self) -> u32 {
        self.range -= 2;
        if self.offset >= self.range {
            1
        } else {
            while self.range < 256 {
                self.range <<= 1;
                self.offset = (self.offset << 1) | self.reader.read_bit();
            }
            0
        }
    }

    /// Decode bins of the given kinds, returning their values.
    pub fn decode_like(&mut self, bins: &[RecordedBin]) -> Vec<u32> {
        bins.iter()
            .map(|b| match b.kind {
                BinKind::Context(ctx_idx) => self.decode_decision(ctx_idx),
                BinKind::Bypass => self.decode_bypass(),
                BinKind::Terminate => self.decode_terminate(),
            })
            .collect()
    }
}

/// Arithmetic encoder that keeps the whole codeword as one big integer.
///
/// No bits are output while coding, so carries simply ripple through the
/// integer; the result is compared against the byte-oriented engine.
pub struct BigIntEncoder {
    /// Codeword bits, most significant first; the last ten bits are the
    /// `low` register.
    bits: Vec<u8>,
    range: u32,
    contexts: ContextTable,
    /// Longest run of bits cleared by a single carry.
    pub longest_carry: usize,
}

impl BigIntEncoder {
    pub fn new(contexts: ContextTable) -> Self {
        Self {
            bits: vec![0; 10],
            range: 510,
            contexts,
            longest_carry: 0,
        }
    }

    fn add(&mut self, value: u32) {
        let mut carry = value as u64;
        let mut cleared = 0;
        let mut i = self.bits.len();
        while carry != 0 {
            assert!(i > 0, "codeword overflow");
            i -= 1;
            let sum = self.bits[i] as u64 + (carry & 1);
            if self.bits[i] == 1 && sum & 1 == 0 {
                cleared += 1;
            }
            self.bits[i] = (sum & 1) as u8;
            carry = (carry >> 1) + (sum >> 1);
        }
        self.longest_carry = self.longest_carry.max(cleared);
    }

    fn renormalize(&mut self) {
        while self.range < 256 {
            self.range <<= 1;
            self.bits.push(0);
        }
    }

    pub fn encode_decision(&mut self, bin: u32, ctx_idx: usize) {
        let packed = self.contexts.get(ctx_idx);
        let state = (packed >> 1) as usize;
        let mps = (packed & 1) as u32;

        let lps = RANGE_TAB_LPS[state][((self.range >> 6) & 3) as usize] as u32;
        self.range -= lps;
        if bin != mps {
            self.add(self.range);
            self.range = lps;
            let next_mps = if state == 0 { 1 - mps } else { mps };
            self.contexts.set(ctx_idx, (NEXT_STATE_LPS[state] << 1) | next_mps as u8);
        } else {
            self.contexts.set(ctx_idx, (NEXT_STATE_MPS[state] << 1) | mps as u8);
        }
        self.renormalize();
    }

    pub fn encode_bypass(&mut self, bin: u32) {
        self.bits.push(0);
        if bin != 0 {
            self.add(self.range);
        }
    }

    pub fn encode_terminate(&mut self, bin: u32) {
        self.range -= 2;
        if bin != 0 {
            self.add(self.range);
            self.range = 2;
        }
        self.renormalize();
    }

    /// Codeword after a terminating bin: every bit above the low register's
    /// bottom eight, minus the leading carry position, then the stop bit and
    /// zero padding.
    pub fn finish(&self) -> Vec<u8> {
        let mut out: Vec<u8> = self.bits[1..self.bits.len() - 8].to_vec();
        out.push(1);
        while out.len() % 8 != 0 {
            out.push(0);
        }
        out.chunks(8)
            .map(|byte| byte.iter().fold(0u8, |acc, &b| (acc << 1) | b))
            .collect()
    }
}

/// Small deterministic generator for test data.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next_u32() % n
    }
}
