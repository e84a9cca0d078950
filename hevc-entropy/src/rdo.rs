//! Bit-cost estimation for rate-distortion decisions.
//!
//! [`RdoEntropyContext`] prices candidate CUs, TUs and SAO parameters by
//! running the slice-data syntax encoders on [`BitCountingCoder`] scratch
//! buffers. Every pricing call starts from the same official context table,
//! so candidates are compared on equal terms; [`RdoEntropyContext::adopt`]
//! then commits the winner.

use crate::cabac::{BinEncoder, BitCountingCoder};
use crate::config::{EntropyConfig, SliceParams};
use crate::context::{ctx, ContextTable};
use crate::error::{EntropyError, Result};
use crate::syntax::cu_pu::encode_coding_unit;
use crate::syntax::cursor::{CtbNeighbours, FrameContext, TraversalState};
use crate::syntax::residual::{encode_residual, ResidualOptions};
use crate::syntax::sao::encode_sao;
use crate::tables::q12_to_bits;
use crate::types::{CodingUnit, Component, Prediction, SaoParams, ScanOrder, SliceType};

/// Number of scratch buffers.
pub const NUM_SCRATCH_BUFFERS: usize = 2;

/// Rounded cost of one CU candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CuBitCost {
    /// All bins of the CU, including its `split_cu_flag`.
    pub total_bits: u64,
    /// Transform tree bins without the `split_transform_flag`s.
    pub texture_bits: u64,
    /// The candidate was a 2Nx2N merge without residual and was priced as
    /// a skipped CU.
    pub priced_as_skip: bool,
}

/// Rate estimation context of one mode-decision worker.
#[derive(Debug, Clone)]
pub struct RdoEntropyContext {
    config: EntropyConfig,
    slice: SliceParams,
    /// Contexts of the real coder at the current decision point.
    init_states: ContextTable,
    scratch: [BitCountingCoder; NUM_SCRATCH_BUFFERS],
    scratch_state: [TraversalState; NUM_SCRATCH_BUFFERS],
    priced_as_skip: [bool; NUM_SCRATCH_BUFFERS],
    sao_scratch: BitCountingCoder,
    /// Neighbour maps and QP prediction of the adopted decisions.
    state: TraversalState,
}

impl RdoEntropyContext {
    /// Create a context for a slice, starting from its initial contexts.
    pub fn new(config: EntropyConfig, slice: SliceParams) -> Result<Self> {
        config.validate()?;
        slice.validate(&config)?;

        let init_states = ContextTable::initial(slice.cabac_init_idc(), slice.clipped_qp());
        let state = TraversalState::new(&config, &slice);
        Ok(Self {
            init_states,
            scratch: Default::default(),
            scratch_state: [state.clone(), state.clone()],
            priced_as_skip: [false; NUM_SCRATCH_BUFFERS],
            sao_scratch: BitCountingCoder::default(),
            state,
            config,
            slice,
        })
    }

    /// Enter the CTB at `ctb_addr`, pricing from `contexts` (usually the
    /// table of the real coder).
    pub fn ctb_init(&mut self, ctb_addr: u32, contexts: &ContextTable) {
        self.init_states = *contexts;

        let frame = FrameContext::new(&self.config, &self.slice);
        let neighbours = frame.ctb_neighbours(ctb_addr);
        if self.config.entropy_coding_sync_enabled
            && neighbours.ctb_x == 0
            && ctb_addr > self.slice.slice_address
        {
            self.state.qp.reset_to_slice_qp();
        }
        self.state.maps.start_ctb(neighbours);
    }

    /// Official context table.
    pub fn init_states(&self) -> &ContextTable {
        &self.init_states
    }

    /// Neighbour maps and QP state of the adopted decisions.
    pub fn state(&self) -> &TraversalState {
        &self.state
    }

    /// Context table left in scratch buffer `buf_idx` by the last pricing call.
    pub fn scratch_contexts(&self, buf_idx: usize) -> Result<&ContextTable> {
        check_buf(buf_idx)?;
        Ok(self.scratch[buf_idx].contexts())
    }

    /// Price a CU candidate in scratch buffer `buf_idx`.
    ///
    /// The cost includes the `split_cu_flag = 0` that ends the quadtree at
    /// the CU when that flag is coded.
    pub fn encode_cu_for_cost(
        &mut self,
        buf_idx: usize,
        cu: &CodingUnit,
        neighbours: &CtbNeighbours,
    ) -> Result<CuBitCost> {
        check_buf(buf_idx)?;
        let frame = FrameContext::new(&self.config, &self.slice);
        let enc = &mut self.scratch[buf_idx];
        let state = &mut self.scratch_state[buf_idx];

        enc.reset_from(&self.init_states);
        state.clone_from(&self.state);
        state.maps.start_ctb(*neighbours);

        let config = &self.config;
        let (ctb_x, ctb_y) = neighbours.origin(config.log2_ctb_size);
        let size = 1u32 << cu.log2_size;
        let inside = ctb_x + cu.x + size <= config.width && ctb_y + cu.y + size <= config.height;
        if inside && cu.log2_size > config.log2_min_cb_size {
            let depth = config.log2_ctb_size.saturating_sub(cu.log2_size);
            let ctx_inc = state.maps.split_ctx_inc(cu.x, cu.y, depth);
            enc.encode_bin(0, ctx::SPLIT_CU_FLAG + ctx_inc)?;
        }

        let qg_mask = (1u32 << state.qp.log2_qg_size()) - 1;
        if config.cu_qp_delta_enabled && cu.x & qg_mask == 0 && cu.y & qg_mask == 0 {
            state.qp.start_quant_group(cu.x, cu.y);
        }

        let priced_as_skip = self.slice.slice_type != SliceType::I
            && !cu.skip
            && cu.is_merge_2nx2n()
            && !cu.has_residual();
        self.priced_as_skip[buf_idx] = priced_as_skip;

        let cost = if priced_as_skip {
            encode_coding_unit(enc, &frame, state, &as_skip(cu))?
        } else {
            encode_coding_unit(enc, &frame, state, cu)?
        };

        Ok(CuBitCost {
            total_bits: enc.rounded_bits(),
            texture_bits: q12_to_bits(cost.texture_q12),
            priced_as_skip,
        })
    }

    /// Price the residual coding of one transform block in scratch buffer
    /// `buf_idx`.
    pub fn encode_tu_for_cost(
        &mut self,
        buf_idx: usize,
        coeffs: &[i16],
        log2_size: u8,
        component: Component,
        scan: ScanOrder,
    ) -> Result<u64> {
        check_buf(buf_idx)?;
        let enc = &mut self.scratch[buf_idx];
        enc.reset_from(&self.init_states);

        let opts = ResidualOptions::new(log2_size, component, scan);
        encode_residual(enc, &self.config, coeffs, &opts)?;
        Ok(enc.rounded_bits())
    }

    /// Price SAO parameters for the CTB described by `neighbours`.
    pub fn encode_sao_for_cost(&mut self, sao: &SaoParams, neighbours: &CtbNeighbours) -> Result<u64> {
        let frame = FrameContext::new(&self.config, &self.slice);
        self.sao_scratch.reset_from(&self.init_states);
        encode_sao(&mut self.sao_scratch, &frame, neighbours, sao)?;
        Ok(self.sao_scratch.rounded_bits())
    }

    /// Commit the candidate last priced in `buf_idx`.
    ///
    /// The scratch contexts become the official table, and the CU's depth and
    /// effective skip flag go into the neighbour maps used by later pricing.
    pub fn adopt(&mut self, buf_idx: usize, cu: &CodingUnit) -> Result<()> {
        check_buf(buf_idx)?;
        self.init_states = *self.scratch[buf_idx].contexts();

        let skip = cu.skip || self.priced_as_skip[buf_idx];
        let depth = self.config.log2_ctb_size.saturating_sub(cu.log2_size);
        self.state.maps.record(cu.x, cu.y, cu.log2_size, depth, skip);
        self.state.qp = self.scratch_state[buf_idx].qp;
        Ok(())
    }
}

fn check_buf(buf_idx: usize) -> Result<()> {
    if buf_idx >= NUM_SCRATCH_BUFFERS {
        return Err(EntropyError::InvalidState(format!(
            "Scratch buffer {} out of range",
            buf_idx
        )));
    }
    Ok(())
}

/// Skipped CU using the merge candidate of a 2Nx2N merge CU.
fn as_skip(cu: &CodingUnit) -> CodingUnit {
    let merge_idx = match &cu.prediction {
        Prediction::Inter(pus) => pus.first().map_or(0, |pu| pu.merge_idx),
        Prediction::Intra(_) => 0,
    };
    let mut skip = CodingUnit::skip(cu.x, cu.y, cu.log2_size, merge_idx, cu.qp);
    skip.tq_bypass = cu.tq_bypass;
    skip
}
