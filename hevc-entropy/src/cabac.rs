//! CABAC engine.
//!
//! Syntax encoders are written against [`BinEncoder`] and never branch on
//! the operating mode. Three implementations exist:
//!
//! - [`BitEmittingCoder`] runs the arithmetic coder and writes bytes into a
//!   [`Bitstream`];
//! - [`BitCountingCoder`] only adapts contexts and sums fractional bit
//!   costs, for rate estimation;
//! - [`BinRecorder`] additionally keeps every bin so a sequence can be
//!   inspected or replayed into another encoder.
//!
//! All three advance contexts and accumulate the Q12 estimate through
//! [`update_context_q12`], so the context tables and estimates they hold
//! after the same bin sequence are identical.

use crate::bitstream::{Bitstream, BitstreamMark};
use crate::context::ContextTable;
use crate::error::Result;
use crate::tables::{
    bin_cost_q12, q12_to_bits, terminate_cost_q12, BYPASS_COST_Q12, NEXT_STATE_LPS,
    NEXT_STATE_MPS, RANGE_TAB_LPS,
};

/// Initial value of the coding range.
pub const INITIAL_RANGE: u32 = 510;

/// Pending bits above which a byte is emitted.
const BYTE_EMIT_THRESHOLD: u32 = 9;

/// Maximum bypass bins folded into `low` per step.
const BYPASS_BATCH: u32 = 8;

/// Sink for binary decisions.
pub trait BinEncoder {
    /// Code `bin` (0 or 1) with the context at `ctx_idx`.
    fn encode_bin(&mut self, bin: u32, ctx_idx: usize) -> Result<()>;

    /// Code the `count` low bits of `bins` as equiprobable bins, MSB first.
    fn encode_bypass_bins(&mut self, bins: u32, count: u32) -> Result<()>;

    /// Code one equiprobable bin.
    fn encode_bypass_bin(&mut self, bin: u32) -> Result<()> {
        self.encode_bypass_bins(bin & 1, 1)
    }

    /// Code a terminating bin. A set bin ends the arithmetic codeword.
    fn encode_terminate(&mut self, bin: u32) -> Result<()>;

    /// Context table in use.
    fn contexts(&self) -> &ContextTable;

    /// Mutable context table in use.
    fn contexts_mut(&mut self) -> &mut ContextTable;

    /// Accumulated cost in 1/4096 bit.
    fn bits_estimated_q12(&self) -> u64;

    /// Zero the cost accumulator.
    fn reset_bit_estimate(&mut self);

    /// Accumulated cost rounded to whole bits.
    fn rounded_bits(&self) -> u64 {
        q12_to_bits(self.bits_estimated_q12())
    }
}

/// Advance the context at `ctx_idx` past `bin`.
///
/// Returns the packed state before the update and the Q12 cost of the bin.
#[inline]
pub fn update_context_q12(contexts: &mut ContextTable, ctx_idx: usize, bin: u32) -> (u8, u32) {
    let packed = contexts.get(ctx_idx);
    let state = (packed >> 1) as usize;
    let mps = (packed & 1) as u32;
    let cost = bin_cost_q12(packed, bin);

    let next = if bin == mps {
        (NEXT_STATE_MPS[state] << 1) | mps as u8
    } else if state == 0 {
        (NEXT_STATE_LPS[state] << 1) | (1 - mps) as u8
    } else {
        (NEXT_STATE_LPS[state] << 1) | mps as u8
    };
    contexts.set(ctx_idx, next);

    (packed, cost)
}

/// Saved state of a [`BitEmittingCoder`].
#[derive(Debug, Clone)]
pub struct CoderCheckpoint {
    low: u32,
    range: u32,
    bits_gen: u32,
    outstanding: u32,
    bytes_emitted: u64,
    bits_q12: u64,
    contexts: ContextTable,
    mark: BitstreamMark,
}

impl CoderCheckpoint {
    /// Context table at the time of the checkpoint.
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }
}

/// Arithmetic coder writing into a [`Bitstream`].
#[derive(Debug, Clone)]
pub struct BitEmittingCoder {
    /// Pending codeword bits; the carry sits at bit `bits_gen + 9`.
    low: u32,
    /// Coding range, 256..=510 between bins.
    range: u32,
    /// Bits shifted into `low` since the last emitted byte.
    bits_gen: u32,
    /// Run of 0xFF bytes waiting for a carry decision.
    outstanding: u32,
    /// Data bytes written since the last reset, emulation prevention excluded.
    bytes_emitted: u64,
    /// Cost estimate in Q12.
    bits_q12: u64,
    contexts: ContextTable,
    stream: Bitstream,
}

impl BitEmittingCoder {
    /// Create a coder writing into `stream`.
    pub fn new(stream: Bitstream) -> Self {
        Self {
            low: 0,
            range: INITIAL_RANGE,
            bits_gen: 0,
            outstanding: 0,
            bytes_emitted: 0,
            bits_q12: 0,
            contexts: ContextTable::default(),
            stream,
        }
    }

    /// Reset the engine and load the initial contexts of a slice.
    pub fn init(&mut self, init_idc: usize, slice_qp: i32) {
        self.contexts.init_states(init_idc, slice_qp);
        self.reset();
        tracing::debug!(init_idc, qp = slice_qp.clamp(0, 51), "cabac init");
    }

    /// Reset the engine keeping the context table.
    ///
    /// Writing resumes at the current end of the bitstream.
    pub fn reset(&mut self) {
        self.low = 0;
        self.range = INITIAL_RANGE;
        self.bits_gen = 0;
        self.outstanding = 0;
        self.bytes_emitted = 0;
        self.bits_q12 = 0;
    }

    /// Current range.
    pub fn range(&self) -> u32 {
        self.range
    }

    /// Bits produced since the last reset, including bits still held in
    /// `low` and outstanding bytes. Emulation prevention bytes are not
    /// counted.
    pub fn engine_bits(&self) -> u64 {
        8 * (self.bytes_emitted + self.outstanding as u64) + self.bits_gen as u64
    }

    /// Output written so far.
    pub fn bitstream(&self) -> &Bitstream {
        &self.stream
    }

    /// Swap in a new output buffer, returning the previous one.
    pub fn replace_bitstream(&mut self, stream: Bitstream) -> Bitstream {
        std::mem::replace(&mut self.stream, stream)
    }

    /// Consume the coder, returning its output.
    pub fn into_bitstream(self) -> Bitstream {
        self.stream
    }

    /// Save the engine, contexts and bitstream position.
    pub fn checkpoint(&self) -> CoderCheckpoint {
        CoderCheckpoint {
            low: self.low,
            range: self.range,
            bits_gen: self.bits_gen,
            outstanding: self.outstanding,
            bytes_emitted: self.bytes_emitted,
            bits_q12: self.bits_q12,
            contexts: self.contexts,
            mark: self.stream.mark(),
        }
    }

    /// Return to a checkpoint, discarding everything written after it.
    pub fn rollback(&mut self, checkpoint: &CoderCheckpoint) {
        self.low = checkpoint.low;
        self.range = checkpoint.range;
        self.bits_gen = checkpoint.bits_gen;
        self.outstanding = checkpoint.outstanding;
        self.bytes_emitted = checkpoint.bytes_emitted;
        self.bits_q12 = checkpoint.bits_q12;
        self.contexts = checkpoint.contexts;
        self.stream.rewind(&checkpoint.mark);
    }

    #[inline]
    fn renormalize(&mut self) -> Result<()> {
        let shift = self.range.leading_zeros() - 23;
        self.low <<= shift;
        self.range <<= shift;
        self.bits_gen += shift;

        if self.bits_gen > BYTE_EMIT_THRESHOLD {
            self.put_byte()?;
        }
        Ok(())
    }

    /// Write the leading byte of `low`, or defer it when it may still
    /// receive a carry.
    fn put_byte(&mut self) -> Result<()> {
        self.stream.ensure_room(self.outstanding as usize + 1)?;

        let lead = self.low >> (self.bits_gen + 1);
        self.bits_gen -= 8;
        self.low &= (1 << (self.bits_gen + 9)) - 1;

        if lead == 0xFF {
            self.outstanding += 1;
            return Ok(());
        }

        let carry = (lead >> 8) & 1 != 0;
        self.resolve_outstanding(carry)?;
        self.emit((lead & 0xFF) as u8)
    }

    /// Apply a carry decision to the previous byte and the 0xFF run.
    fn resolve_outstanding(&mut self, carry: bool) -> Result<()> {
        if carry {
            self.stream.add_carry()?;
        }

        let fill = if carry { 0x00 } else { 0xFF };
        for _ in 0..self.outstanding {
            self.emit(fill)?;
        }
        self.outstanding = 0;
        Ok(())
    }

    #[inline]
    fn emit(&mut self, byte: u8) -> Result<()> {
        self.stream.put_byte_with_epb(byte)?;
        self.bytes_emitted += 1;
        Ok(())
    }

    /// Write out the codeword after a terminating bin.
    ///
    /// Emits the `bits_gen + 1` pending bits followed by a stop bit and
    /// zero padding to the next byte boundary.
    fn flush(&mut self) -> Result<()> {
        self.stream.ensure_room(self.outstanding as usize + 2)?;

        let carry = (self.low >> (self.bits_gen + 9)) & 1 != 0;
        self.low &= (1 << (self.bits_gen + 9)) - 1;
        self.resolve_outstanding(carry)?;

        let mut bits_left = self.bits_gen + 1;
        let rem = self.low >> 8;
        if bits_left >= 8 {
            self.emit(((rem >> (bits_left - 8)) & 0xFF) as u8)?;
            bits_left -= 8;
        }
        let last = ((rem << (8 - bits_left)) | (1 << (7 - bits_left))) & 0xFF;
        self.emit(last as u8)?;

        self.low = 0;
        self.bits_gen = 0;
        Ok(())
    }
}

impl BinEncoder for BitEmittingCoder {
    fn encode_bin(&mut self, bin: u32, ctx_idx: usize) -> Result<()> {
        let (packed, cost) = update_context_q12(&mut self.contexts, ctx_idx, bin);
        self.bits_q12 += cost as u64;

        let state = (packed >> 1) as usize;
        let lps = RANGE_TAB_LPS[state][((self.range >> 6) & 3) as usize] as u32;
        self.range -= lps;

        if bin != (packed & 1) as u32 {
            self.low += self.range;
            self.range = lps;
        }

        self.renormalize()
    }

    fn encode_bypass_bins(&mut self, bins: u32, count: u32) -> Result<()> {
        self.bits_q12 += (BYPASS_COST_Q12 * count) as u64;

        let mut remaining = count;
        while remaining > 0 {
            let n = remaining.min(BYPASS_BATCH);
            remaining -= n;
            let chunk = (bins >> remaining) & ((1 << n) - 1);

            self.low = (self.low << n) + self.range * chunk;
            self.bits_gen += n;
            if self.bits_gen > BYTE_EMIT_THRESHOLD {
                self.put_byte()?;
            }
        }
        Ok(())
    }

    fn encode_terminate(&mut self, bin: u32) -> Result<()> {
        self.bits_q12 += terminate_cost_q12(bin) as u64;

        self.range -= 2;
        if bin != 0 {
            self.low += self.range;
            self.range = 2;
        }
        self.renormalize()?;

        if bin != 0 {
            self.flush()?;
        }
        Ok(())
    }

    fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    fn contexts_mut(&mut self) -> &mut ContextTable {
        &mut self.contexts
    }

    fn bits_estimated_q12(&self) -> u64 {
        self.bits_q12
    }

    fn reset_bit_estimate(&mut self) {
        self.bits_q12 = 0;
    }
}

/// Rate estimator: adapts contexts and sums fractional bit costs.
#[derive(Debug, Clone, Default)]
pub struct BitCountingCoder {
    contexts: ContextTable,
    bits_q12: u64,
}

impl BitCountingCoder {
    /// Create an estimator starting from `contexts`.
    pub fn new(contexts: ContextTable) -> Self {
        Self {
            contexts,
            bits_q12: 0,
        }
    }

    /// Restart from `contexts` with a zero estimate.
    pub fn reset_from(&mut self, contexts: &ContextTable) {
        self.contexts = *contexts;
        self.bits_q12 = 0;
    }
}

impl BinEncoder for BitCountingCoder {
    #[inline]
    fn encode_bin(&mut self, bin: u32, ctx_idx: usize) -> Result<()> {
        let (_, cost) = update_context_q12(&mut self.contexts, ctx_idx, bin);
        self.bits_q12 += cost as u64;
        Ok(())
    }

    #[inline]
    fn encode_bypass_bins(&mut self, _bins: u32, count: u32) -> Result<()> {
        self.bits_q12 += (BYPASS_COST_Q12 * count) as u64;
        Ok(())
    }

    fn encode_terminate(&mut self, bin: u32) -> Result<()> {
        self.bits_q12 += terminate_cost_q12(bin) as u64;
        Ok(())
    }

    fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    fn contexts_mut(&mut self) -> &mut ContextTable {
        &mut self.contexts
    }

    fn bits_estimated_q12(&self) -> u64 {
        self.bits_q12
    }

    fn reset_bit_estimate(&mut self) {
        self.bits_q12 = 0;
    }
}

/// How a recorded bin was coded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinKind {
    /// Context coded with the given context index.
    Context(usize),
    /// Bypass coded.
    Bypass,
    /// Terminating bin.
    Terminate,
}

/// One recorded bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordedBin {
    /// Coding method.
    pub kind: BinKind,
    /// Bin value.
    pub bin: u32,
}

/// Estimator that also keeps every bin it is given.
#[derive(Debug, Clone, Default)]
pub struct BinRecorder {
    counter: BitCountingCoder,
    bins: Vec<RecordedBin>,
}

impl BinRecorder {
    /// Create a recorder starting from `contexts`.
    pub fn new(contexts: ContextTable) -> Self {
        Self {
            counter: BitCountingCoder::new(contexts),
            bins: Vec::new(),
        }
    }

    /// Recorded bins in coding order.
    pub fn bins(&self) -> &[RecordedBin] {
        &self.bins
    }

    /// Number of context-coded bins.
    pub fn context_bins(&self) -> usize {
        self.bins
            .iter()
            .filter(|b| matches!(b.kind, BinKind::Context(_)))
            .count()
    }

    /// Number of bypass bins.
    pub fn bypass_bins(&self) -> usize {
        self.bins.iter().filter(|b| b.kind == BinKind::Bypass).count()
    }

    /// Drop the recorded bins, keeping contexts and the estimate.
    pub fn clear(&mut self) {
        self.bins.clear();
    }

    /// Code every recorded bin into `dest` in order.
    pub fn replay<E: BinEncoder + ?Sized>(&self, dest: &mut E) -> Result<()> {
        for b in &self.bins {
            match b.kind {
                BinKind::Context(ctx_idx) => dest.encode_bin(b.bin, ctx_idx)?,
                BinKind::Bypass => dest.encode_bypass_bin(b.bin)?,
                BinKind::Terminate => dest.encode_terminate(b.bin)?,
            }
        }
        Ok(())
    }
}

impl BinEncoder for BinRecorder {
    fn encode_bin(&mut self, bin: u32, ctx_idx: usize) -> Result<()> {
        self.bins.push(RecordedBin {
            kind: BinKind::Context(ctx_idx),
            bin,
        });
        self.counter.encode_bin(bin, ctx_idx)
    }

    fn encode_bypass_bins(&mut self, bins: u32, count: u32) -> Result<()> {
        for i in (0..count).rev() {
            self.bins.push(RecordedBin {
                kind: BinKind::Bypass,
                bin: (bins >> i) & 1,
            });
        }
        self.counter.encode_bypass_bins(bins, count)
    }

    fn encode_terminate(&mut self, bin: u32) -> Result<()> {
        self.bins.push(RecordedBin {
            kind: BinKind::Terminate,
            bin,
        });
        self.counter.encode_terminate(bin)
    }

    fn contexts(&self) -> &ContextTable {
        self.counter.contexts()
    }

    fn contexts_mut(&mut self) -> &mut ContextTable {
        self.counter.contexts_mut()
    }

    fn bits_estimated_q12(&self) -> u64 {
        self.counter.bits_estimated_q12()
    }

    fn reset_bit_estimate(&mut self) {
        self.counter.reset_bit_estimate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ctx;

    fn coder() -> BitEmittingCoder {
        let mut c = BitEmittingCoder::new(Bitstream::new(1 << 16));
        c.init(0, 26);
        c
    }

    #[test]
    fn test_context_update() {
        let mut table = ContextTable::default();
        // state 0, mps 0: an LPS flips the mps
        update_context_q12(&mut table, 0, 1);
        assert_eq!(table.get(0), 1);

        update_context_q12(&mut table, 0, 1);
        assert_eq!(table.state(0), 1);
        assert_eq!(table.mps(0), 1);
    }

    #[test]
    fn test_range_invariant() {
        let mut c = coder();
        for i in 0..2000u32 {
            let bin = (i * 7 + i / 3) % 5 == 0;
            c.encode_bin(bin as u32, (i as usize) % 20).unwrap();
            assert!((256..512).contains(&c.range()));
            if i % 3 == 0 {
                c.encode_bypass_bin(i & 1).unwrap();
                assert!((256..512).contains(&c.range()));
            }
        }
    }

    #[test]
    fn test_bypass_bits_exact() {
        let mut c = coder();
        c.encode_bypass_bins(0x1234_5678, 32).unwrap();
        c.encode_bypass_bins(0b101, 3).unwrap();
        assert_eq!(c.engine_bits(), 35);
        assert_eq!(c.rounded_bits(), 35);
    }

    #[test]
    fn test_terminate_flush_byte_aligned() {
        let mut c = coder();
        c.encode_bin(1, ctx::SPLIT_CU_FLAG).unwrap();
        c.encode_terminate(1).unwrap();
        let bytes = c.bitstream().as_bytes();
        assert!(!bytes.is_empty());
        // stop bit terminates the last byte
        assert_ne!(*bytes.last().unwrap(), 0);
        assert_eq!(c.engine_bits() % 8, 0);
    }

    #[test]
    fn test_counting_matches_emitting_contexts() {
        let mut emit = coder();
        let mut count = BitCountingCoder::new(ContextTable::initial(0, 26));
        for i in 0..500u32 {
            let bin = (i % 3 == 0) as u32;
            emit.encode_bin(bin, ctx::SIG_COEFF + (i as usize % 42)).unwrap();
            count.encode_bin(bin, ctx::SIG_COEFF + (i as usize % 42)).unwrap();
        }
        emit.encode_bypass_bins(5, 3).unwrap();
        count.encode_bypass_bins(5, 3).unwrap();
        assert_eq!(emit.contexts(), count.contexts());
        assert_eq!(emit.bits_estimated_q12(), count.bits_estimated_q12());
    }

    #[test]
    fn test_checkpoint_rollback() {
        let mut c = coder();
        for i in 0..100 {
            c.encode_bin(i & 1, ctx::GREATER1).unwrap();
        }
        let cp = c.checkpoint();
        let before = c.bitstream().as_bytes().to_vec();
        let contexts = *c.contexts();

        c.encode_terminate(1).unwrap();
        assert_ne!(c.bitstream().as_bytes(), &before[..]);

        c.rollback(&cp);
        assert_eq!(c.bitstream().as_bytes(), &before[..]);
        assert_eq!(*c.contexts(), contexts);
        assert_eq!(cp.contexts(), &contexts);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut c = BitEmittingCoder::new(Bitstream::new(4));
        c.init(0, 26);
        let err = c.encode_bypass_bins(u32::MAX, 32).and_then(|_| c.encode_bypass_bins(0x5A5A, 16));
        assert!(err.unwrap_err().is_buffer_overflow());
    }

    #[test]
    fn test_overflow_during_carry_run_writes_nothing() {
        // the last one carries through seven pending 0xFF bytes, which
        // resolve to a zero run that needs prevention bytes
        let mut bins = vec![1u32];
        for _ in 0..8 {
            bins.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
        }
        bins.extend_from_slice(&[0, 0, 0, 0, 0, 1]);

        let mut overflows = 0;
        for capacity in 1..24 {
            let mut c = BitEmittingCoder::new(Bitstream::new(capacity));
            c.init(0, 30);
            for &bin in &bins {
                let before = c.bitstream().as_bytes().to_vec();
                if let Err(err) = c.encode_bypass_bin(bin) {
                    assert!(err.is_buffer_overflow());
                    assert_eq!(c.bitstream().as_bytes(), &before[..], "capacity {}", capacity);
                    overflows += 1;
                    break;
                }
            }
        }
        assert!(overflows > 0);
    }

    #[test]
    fn test_recorder_replay() {
        let mut rec = BinRecorder::new(ContextTable::initial(1, 30));
        rec.encode_bin(1, ctx::SKIP_FLAG).unwrap();
        rec.encode_bypass_bins(0b10, 2).unwrap();
        rec.encode_terminate(0).unwrap();
        assert_eq!(rec.bins().len(), 4);
        assert_eq!(rec.context_bins(), 1);
        assert_eq!(rec.bypass_bins(), 2);

        let mut count = BitCountingCoder::new(ContextTable::initial(1, 30));
        rec.replay(&mut count).unwrap();
        assert_eq!(count.bits_estimated_q12(), rec.bits_estimated_q12());
        assert_eq!(count.contexts(), rec.contexts());
    }
}
