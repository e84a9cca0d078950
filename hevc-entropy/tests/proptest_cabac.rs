//! Property-based tests for the arithmetic coder and its byte sink.

mod common;

use common::{BigIntEncoder, ReferenceDecoder};
use hevc_entropy::context::NUM_CONTEXTS;
use hevc_entropy::{
    hide_signs, remove_emulation_prevention, BinEncoder, BinRecorder, BitCountingCoder,
    BitEmittingCoder, Bitstream, ContextTable, InverseQuantizer, ScanOrder,
};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Context { ctx_idx: usize, bin: u32 },
    Bypass { bins: u32, count: u32 },
    Terminate,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0..NUM_CONTEXTS, 0u32..2).prop_map(|(ctx_idx, bin)| Op::Context { ctx_idx, bin }),
        // a few hot contexts so states saturate
        3 => (0usize..4, prop::bool::weighted(0.05))
            .prop_map(|(ctx_idx, lps)| Op::Context { ctx_idx, bin: lps as u32 }),
        2 => (1u32..=16, any::<u32>())
            .prop_map(|(count, bins)| Op::Bypass { bins: bins & ((1 << count) - 1), count }),
        1 => Just(Op::Terminate),
    ]
}

fn apply<E: BinEncoder>(enc: &mut E, op: Op) {
    match op {
        Op::Context { ctx_idx, bin } => enc.encode_bin(bin, ctx_idx).unwrap(),
        Op::Bypass { bins, count } => enc.encode_bypass_bins(bins, count).unwrap(),
        Op::Terminate => enc.encode_terminate(0).unwrap(),
    }
}

fn emitting_coder(init_idc: usize, qp: i32) -> BitEmittingCoder {
    let mut coder = BitEmittingCoder::new(Bitstream::new(1 << 16));
    coder.init(init_idc, qp);
    coder
}

// =============================================================================
// Engine
// =============================================================================

proptest! {
    /// The range stays normalized after every bin.
    #[test]
    fn range_stays_normalized(ops in prop::collection::vec(op(), 1..500), init_idc in 0usize..3, qp in 0i32..52) {
        let mut coder = emitting_coder(init_idc, qp);
        for op in ops {
            apply(&mut coder, op);
            prop_assert!((256..512).contains(&coder.range()));
        }
    }

    /// A conforming decoder recovers every bin.
    #[test]
    fn bins_round_trip(ops in prop::collection::vec(op(), 1..800), init_idc in 0usize..3, qp in 0i32..52) {
        let mut coder = emitting_coder(init_idc, qp);
        let mut rec = BinRecorder::new(ContextTable::initial(init_idc, qp));
        for &op in &ops {
            apply(&mut coder, op);
            apply(&mut rec, op);
        }
        coder.encode_terminate(1).unwrap();

        let rbsp = remove_emulation_prevention(coder.bitstream().as_bytes());
        let mut dec = ReferenceDecoder::new(&rbsp, ContextTable::initial(init_idc, qp));
        let expected: Vec<u32> = rec.bins().iter().map(|b| b.bin).collect();
        prop_assert_eq!(dec.decode_like(rec.bins()), expected);
        prop_assert_eq!(dec.decode_terminate(), 1);
    }

    /// Byte-wise carry resolution matches exact big-integer arithmetic.
    #[test]
    fn codeword_matches_big_integer(ops in prop::collection::vec(op(), 1..800), qp in 0i32..52) {
        let mut coder = emitting_coder(2, qp);
        let mut reference = BigIntEncoder::new(ContextTable::initial(2, qp));
        for &op in &ops {
            apply(&mut coder, op);
            match op {
                Op::Context { ctx_idx, bin } => reference.encode_decision(bin, ctx_idx),
                Op::Bypass { bins, count } => {
                    for i in (0..count).rev() {
                        reference.encode_bypass((bins >> i) & 1);
                    }
                }
                Op::Terminate => reference.encode_terminate(0),
            }
        }
        coder.encode_terminate(1).unwrap();
        reference.encode_terminate(1);

        prop_assert_eq!(remove_emulation_prevention(coder.bitstream().as_bytes()), reference.finish());
    }

    /// Both modes adapt contexts and accumulate the estimate identically.
    #[test]
    fn modes_agree_on_state(ops in prop::collection::vec(op(), 1..500)) {
        let mut emit = emitting_coder(1, 33);
        let mut count = BitCountingCoder::new(ContextTable::initial(1, 33));
        for &op in &ops {
            apply(&mut emit, op);
            apply(&mut count, op);
        }
        prop_assert_eq!(emit.contexts(), count.contexts());
        prop_assert_eq!(emit.bits_estimated_q12(), count.bits_estimated_q12());
    }

    /// Bypass-only sequences cost exactly one bit per bin in both modes.
    #[test]
    fn bypass_estimate_is_exact(chunks in prop::collection::vec((1u32..=16, any::<u32>()), 1..100)) {
        let mut emit = emitting_coder(0, 26);
        let mut count = BitCountingCoder::new(ContextTable::initial(0, 26));
        let mut total = 0u64;
        for (n, bins) in chunks {
            let bins = bins & ((1 << n) - 1);
            emit.encode_bypass_bins(bins, n).unwrap();
            count.encode_bypass_bins(bins, n).unwrap();
            total += n as u64;
        }
        prop_assert_eq!(emit.engine_bits(), total);
        prop_assert_eq!(count.rounded_bits(), total);
    }
}

// =============================================================================
// Emulation prevention
// =============================================================================

proptest! {
    /// No start-code prefix survives, and stripping restores the payload.
    #[test]
    fn emulation_prevention_escapes_start_codes(
        payload in prop::collection::vec(prop_oneof![3 => Just(0u8), 1 => 0u8..4, 1 => any::<u8>()], 0..400)
    ) {
        let mut stream = Bitstream::new(1024);
        for &byte in &payload {
            stream.put_byte_with_epb(byte).unwrap();
        }
        let out = stream.as_bytes();
        for w in out.windows(3) {
            prop_assert!(!(w[0] == 0 && w[1] == 0 && w[2] < 3), "unescaped {:02x?}", w);
        }
        prop_assert_eq!(remove_emulation_prevention(out), payload);
    }
}

// =============================================================================
// Sign data hiding
// =============================================================================

fn sub_block_levels() -> impl Strategy<Value = Vec<i16>> {
    prop::collection::vec(prop_oneof![2 => Just(0i16), 1 => -6i16..=6], 64)
}

proptest! {
    /// Every sub-block that still qualifies after the adjustment carries its
    /// first sign in the level parity, and the distortion delta covers
    /// exactly the changed levels.
    #[test]
    fn sign_hiding_parity_and_distortion(
        levels in sub_block_levels(),
        errors in prop::collection::vec(-200i32..200, 64),
        noise in prop::collection::vec(0i32..30, 64),
        qp in 0i32..52,
    ) {
        let log2 = 3u8;
        let iq = InverseQuantizer::new(qp, log2, 8);
        let src: Vec<i32> = levels
            .iter()
            .zip(&noise)
            .map(|(&l, &n)| {
                let magnitude = iq.dequantize(l.abs()) + n;
                if l < 0 || (l == 0 && n % 2 == 1) { -magnitude } else { magnitude }
            })
            .collect();

        let mut adjusted = levels.clone();
        let delta = hide_signs(&mut adjusted, log2, ScanOrder::Diagonal, &src, &errors, &iq).unwrap();

        let mut expected = 0i64;
        for i in 0..64 {
            if adjusted[i] != levels[i] {
                prop_assert_eq!((adjusted[i] as i32 - levels[i] as i32).abs(), 1);
                let old = (src[i] - iq.dequantize(levels[i])) as i64;
                let new = (src[i] - iq.dequantize(adjusted[i])) as i64;
                expected += new * new - old * old;
            }
        }
        prop_assert_eq!(delta, expected);

        for sub_block in 0..4 {
            let scanned: Vec<i16> = (0..16)
                .map(|pos| adjusted[hevc_entropy::scan::coeff_index(log2, ScanOrder::Diagonal, sub_block, pos)])
                .collect();
            let changes = (0..16)
                .map(|pos| hevc_entropy::scan::coeff_index(log2, ScanOrder::Diagonal, sub_block, pos))
                .filter(|&i| adjusted[i] != levels[i])
                .count();
            prop_assert!(changes <= 1);

            let nonzero: Vec<usize> = (0..16).filter(|&p| scanned[p] != 0).collect();
            if let (Some(&first), Some(&last)) = (nonzero.first(), nonzero.last()) {
                if last - first >= 4 {
                    let sum: u32 = scanned.iter().map(|l| l.unsigned_abs() as u32).sum();
                    prop_assert_eq!(sum % 2 == 1, scanned[first] < 0);
                }
            }
        }
    }
}
