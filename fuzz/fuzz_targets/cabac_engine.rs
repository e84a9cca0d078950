#![no_main]

//! Fuzz target for the CABAC engine.
//!
//! Drives both coder modes with arbitrary bins into a small buffer. Overflow
//! must surface as an error, never a panic, and both modes must agree on
//! context state while the emitting coder still has room.

use arbitrary::Arbitrary;
use hevc_entropy::context::NUM_CONTEXTS;
use hevc_entropy::{BinEncoder, BitCountingCoder, BitEmittingCoder, Bitstream, ContextTable};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct EngineInput {
    init_idc: u8,
    qp: u8,
    capacity: u16,
    operations: Vec<BinOperation>,
}

#[derive(Arbitrary, Debug)]
enum BinOperation {
    Context { ctx_idx: u8, bin: bool },
    Bypass { bins: u32, count: u8 },
    Terminate,
    Checkpoint,
    Rollback,
}

fuzz_target!(|input: EngineInput| {
    let init_idc = (input.init_idc % 3) as usize;
    let qp = (input.qp % 52) as i32;

    let mut emit = BitEmittingCoder::new(Bitstream::new(input.capacity as usize));
    emit.init(init_idc, qp);
    let mut count = BitCountingCoder::new(ContextTable::initial(init_idc, qp));
    let mut checkpoint = None;

    for op in input.operations.iter().take(4096) {
        let result = match *op {
            BinOperation::Context { ctx_idx, bin } => {
                let ctx_idx = ctx_idx as usize % NUM_CONTEXTS;
                count.encode_bin(bin as u32, ctx_idx).and(emit.encode_bin(bin as u32, ctx_idx))
            }
            BinOperation::Bypass { bins, count: n } => {
                let n = (n % 16) as u32 + 1;
                let bins = bins & ((1 << n) - 1);
                count.encode_bypass_bins(bins, n).and(emit.encode_bypass_bins(bins, n))
            }
            BinOperation::Terminate => count.encode_terminate(0).and(emit.encode_terminate(0)),
            BinOperation::Checkpoint => {
                checkpoint = Some((emit.checkpoint(), *count.contexts()));
                Ok(())
            }
            BinOperation::Rollback => {
                if let Some((cp, contexts)) = &checkpoint {
                    emit.rollback(cp);
                    count.reset_from(contexts);
                }
                Ok(())
            }
        };
        if result.is_err() {
            return;
        }
        assert!((256..512).contains(&emit.range()));
        assert_eq!(emit.contexts(), count.contexts());
    }

    let _ = emit.encode_terminate(1);
});
