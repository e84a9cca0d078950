//! Context model table and its initialization.
//!
//! Every context is a packed byte `(state << 1) | mps`. The table holds one
//! cell per syntax-element context, laid out by the offsets in [`ctx`].
//! Initial tables for all three init types and QP 0..=51 are built once per
//! process and shared read-only.

use std::sync::LazyLock;

use crate::config::MAX_QP;

/// Context offsets of each syntax element.
pub mod ctx {
    /// `sao_merge_left_flag` / `sao_merge_up_flag`.
    pub const SAO_MERGE: usize = 0;
    /// First bin of `sao_type_idx_luma` / `sao_type_idx_chroma`.
    pub const SAO_TYPE: usize = 1;
    /// `split_cu_flag` (3).
    pub const SPLIT_CU_FLAG: usize = 2;
    /// `cu_transquant_bypass_flag`.
    pub const CU_TRANSQUANT_BYPASS: usize = 5;
    /// `cu_skip_flag` (3).
    pub const SKIP_FLAG: usize = 6;
    /// `cu_qp_delta_abs` prefix (2).
    pub const QP_DELTA_ABS: usize = 9;
    /// `pred_mode_flag`.
    pub const PRED_MODE: usize = 11;
    /// `part_mode` (4).
    pub const PART_MODE: usize = 12;
    /// `prev_intra_luma_pred_flag`.
    pub const PREV_INTRA_LUMA_PRED: usize = 16;
    /// First bin of `intra_chroma_pred_mode`.
    pub const CHROMA_PRED_MODE: usize = 17;
    /// `merge_flag`.
    pub const MERGE_FLAG: usize = 18;
    /// First bin of `merge_idx`.
    pub const MERGE_IDX: usize = 19;
    /// `inter_pred_idc` (5).
    pub const INTER_PRED_IDC: usize = 20;
    /// `ref_idx_lX` (2).
    pub const REF_IDX: usize = 25;
    /// `abs_mvd_greater0_flag`.
    pub const MVD_GREATER0: usize = 27;
    /// `abs_mvd_greater1_flag`.
    pub const MVD_GREATER1: usize = 28;
    /// `mvp_lX_flag`.
    pub const MVP_FLAG: usize = 29;
    /// `rqt_root_cbf`.
    pub const RQT_ROOT_CBF: usize = 30;
    /// `split_transform_flag` (3).
    pub const SPLIT_TRANSFORM: usize = 31;
    /// `cbf_luma` (2).
    pub const CBF_LUMA: usize = 34;
    /// `cbf_cb` / `cbf_cr` (4).
    pub const CBF_CBCR: usize = 36;
    /// `transform_skip_flag` luma.
    pub const TRANSFORM_SKIP_LUMA: usize = 40;
    /// `transform_skip_flag` chroma.
    pub const TRANSFORM_SKIP_CHROMA: usize = 41;
    /// `last_sig_coeff_x_prefix` (18).
    pub const LAST_X_PREFIX: usize = 42;
    /// `last_sig_coeff_y_prefix` (18).
    pub const LAST_Y_PREFIX: usize = 60;
    /// `coded_sub_block_flag` (4).
    pub const CODED_SUB_BLOCK: usize = 78;
    /// `sig_coeff_flag` (42).
    pub const SIG_COEFF: usize = 82;
    /// `coeff_abs_level_greater1_flag` (24).
    pub const GREATER1: usize = 124;
    /// `coeff_abs_level_greater2_flag` (6).
    pub const GREATER2: usize = 148;
    /// Number of contexts.
    pub const NUM_CONTEXTS: usize = 154;
}

pub use ctx::NUM_CONTEXTS;

/// Number of QP values with a precomputed initial table.
pub const NUM_INIT_QPS: usize = (MAX_QP + 1) as usize;

/// Number of initialization types.
pub const NUM_INIT_TYPES: usize = 3;

/// Table of packed context states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextTable {
    cells: [u8; NUM_CONTEXTS],
}

impl Default for ContextTable {
    fn default() -> Self {
        Self {
            cells: [0; NUM_CONTEXTS],
        }
    }
}

impl ContextTable {
    /// Initial table for an init type and slice QP (clipped to 0..=51).
    pub fn initial(init_idc: usize, slice_qp: i32) -> Self {
        let qp = slice_qp.clamp(0, MAX_QP) as usize;
        INIT_TABLES[init_idc.min(NUM_INIT_TYPES - 1)][qp]
    }

    /// Reload from the initial table of an init type and slice QP.
    pub fn init_states(&mut self, init_idc: usize, slice_qp: i32) {
        *self = Self::initial(init_idc, slice_qp);
    }

    /// Packed `(state << 1) | mps` of a context.
    #[inline]
    pub fn get(&self, idx: usize) -> u8 {
        self.cells[idx]
    }

    /// Overwrite the packed state of a context.
    #[inline]
    pub fn set(&mut self, idx: usize, packed: u8) {
        self.cells[idx] = packed;
    }

    /// Probability state index of a context.
    pub fn state(&self, idx: usize) -> u8 {
        self.cells[idx] >> 1
    }

    /// Most probable symbol of a context.
    pub fn mps(&self, idx: usize) -> u8 {
        self.cells[idx] & 1
    }

    /// All cells.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

/// Copy every cell of `src` into `dst`.
#[inline]
pub fn copy_states(dst: &mut ContextTable, src: &ContextTable) {
    dst.cells.copy_from_slice(&src.cells);
}

/// Packed initial state for an 8-bit init value at a QP.
pub fn init_context_state(init_value: u8, qp: i32) -> u8 {
    let qp = qp.clamp(0, MAX_QP);
    let slope = ((init_value >> 4) as i32) * 5 - 45;
    let offset = (((init_value & 15) as i32) << 3) - 16;
    let pre = (((slope * qp) >> 4) + offset).clamp(1, 126);

    if pre <= 63 {
        ((63 - pre) << 1) as u8
    } else {
        (((pre - 64) << 1) | 1) as u8
    }
}

/// Init values of one syntax element for each init type.
struct InitEntry {
    offset: usize,
    values: [&'static [u8]; NUM_INIT_TYPES],
}

const LAST_PREFIX_INIT: [&[u8]; NUM_INIT_TYPES] = [
    &[110, 110, 124, 125, 140, 153, 125, 127, 140, 109, 111, 143, 127, 111, 79, 108, 123, 63],
    &[125, 110, 94, 110, 95, 79, 125, 111, 110, 78, 110, 111, 111, 95, 94, 108, 123, 108],
    &[125, 110, 124, 110, 95, 94, 125, 111, 111, 79, 125, 126, 111, 111, 79, 108, 123, 93],
];

#[rustfmt::skip]
const INIT_ENTRIES: &[InitEntry] = &[
    InitEntry { offset: ctx::SAO_MERGE, values: [&[153], &[153], &[153]] },
    InitEntry { offset: ctx::SAO_TYPE, values: [&[200], &[185], &[160]] },
    InitEntry { offset: ctx::SPLIT_CU_FLAG, values: [&[139, 141, 157], &[107, 139, 126], &[107, 139, 126]] },
    InitEntry { offset: ctx::CU_TRANSQUANT_BYPASS, values: [&[154], &[154], &[154]] },
    InitEntry { offset: ctx::SKIP_FLAG, values: [&[197, 185, 201], &[197, 185, 201], &[197, 185, 201]] },
    InitEntry { offset: ctx::QP_DELTA_ABS, values: [&[154, 154], &[154, 154], &[154, 154]] },
    InitEntry { offset: ctx::PRED_MODE, values: [&[149], &[149], &[134]] },
    InitEntry { offset: ctx::PART_MODE, values: [&[184, 154, 139, 154], &[154, 139, 154, 154], &[154, 139, 154, 154]] },
    InitEntry { offset: ctx::PREV_INTRA_LUMA_PRED, values: [&[184], &[154], &[183]] },
    InitEntry { offset: ctx::CHROMA_PRED_MODE, values: [&[63], &[152], &[152]] },
    InitEntry { offset: ctx::MERGE_FLAG, values: [&[154], &[110], &[154]] },
    InitEntry { offset: ctx::MERGE_IDX, values: [&[154], &[122], &[137]] },
    InitEntry { offset: ctx::INTER_PRED_IDC, values: [&[154; 5], &[95, 79, 63, 31, 31], &[95, 79, 63, 31, 31]] },
    InitEntry { offset: ctx::REF_IDX, values: [&[154, 154], &[153, 153], &[153, 153]] },
    InitEntry { offset: ctx::MVD_GREATER0, values: [&[154], &[140], &[169]] },
    InitEntry { offset: ctx::MVD_GREATER1, values: [&[154], &[198], &[198]] },
    InitEntry { offset: ctx::MVP_FLAG, values: [&[154], &[168], &[168]] },
    InitEntry { offset: ctx::RQT_ROOT_CBF, values: [&[154], &[79], &[79]] },
    InitEntry { offset: ctx::SPLIT_TRANSFORM, values: [&[153, 138, 138], &[124, 138, 94], &[224, 167, 122]] },
    InitEntry { offset: ctx::CBF_LUMA, values: [&[111, 141], &[153, 111], &[153, 111]] },
    InitEntry { offset: ctx::CBF_CBCR, values: [&[94, 138, 182, 154], &[149, 107, 167, 154], &[149, 92, 167, 154]] },
    InitEntry { offset: ctx::TRANSFORM_SKIP_LUMA, values: [&[139], &[139], &[139]] },
    InitEntry { offset: ctx::TRANSFORM_SKIP_CHROMA, values: [&[139], &[139], &[139]] },
    InitEntry { offset: ctx::LAST_X_PREFIX, values: LAST_PREFIX_INIT },
    InitEntry { offset: ctx::LAST_Y_PREFIX, values: LAST_PREFIX_INIT },
    InitEntry { offset: ctx::CODED_SUB_BLOCK, values: [&[91, 171, 134, 141], &[121, 140, 61, 154], &[121, 140, 61, 154]] },
    InitEntry {
        offset: ctx::SIG_COEFF,
        values: [
            &[111, 111, 125, 110, 110, 94, 124, 108, 124, 107, 125, 141, 179, 153, 125, 107, 125, 141,
              179, 153, 125, 107, 125, 141, 179, 153, 125, 140, 139, 182, 182, 152, 136, 152, 136, 153,
              136, 139, 111, 136, 139, 111],
            &[155, 154, 139, 153, 139, 123, 123, 63, 153, 166, 183, 140, 136, 153, 154, 166, 183, 140,
              136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 123, 123, 107, 121, 107, 121, 167,
              151, 183, 140, 151, 183, 140],
            &[170, 154, 139, 153, 139, 123, 123, 63, 124, 166, 183, 140, 136, 153, 154, 166, 183, 140,
              136, 153, 154, 166, 183, 140, 136, 153, 154, 170, 153, 138, 138, 122, 121, 122, 121, 167,
              151, 183, 140, 151, 183, 140],
        ],
    },
    InitEntry {
        offset: ctx::GREATER1,
        values: [
            &[140, 92, 137, 138, 140, 152, 138, 139, 153, 74, 149, 92, 139, 107, 122, 152, 140, 179,
              166, 182, 140, 227, 122, 197],
            &[154, 196, 196, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 137, 169, 194,
              166, 167, 154, 167, 137, 182],
            &[154, 196, 167, 167, 154, 152, 167, 182, 182, 134, 149, 136, 153, 121, 136, 122, 169, 208,
              166, 167, 154, 152, 167, 182],
        ],
    },
    InitEntry {
        offset: ctx::GREATER2,
        values: [
            &[138, 153, 136, 167, 152, 152],
            &[107, 167, 91, 122, 107, 167],
            &[107, 167, 91, 107, 107, 167],
        ],
    },
];

fn init_values(init_idc: usize) -> [u8; NUM_CONTEXTS] {
    let mut values = [154u8; NUM_CONTEXTS];
    for entry in INIT_ENTRIES {
        let v = entry.values[init_idc];
        values[entry.offset..entry.offset + v.len()].copy_from_slice(v);
    }
    values
}

/// Initial context tables indexed by `[init_idc][qp]`.
static INIT_TABLES: LazyLock<Box<[[ContextTable; NUM_INIT_QPS]; NUM_INIT_TYPES]>> =
    LazyLock::new(|| {
        let mut tables = Box::new([[ContextTable::default(); NUM_INIT_QPS]; NUM_INIT_TYPES]);
        for (init_idc, per_qp) in tables.iter_mut().enumerate() {
            let values = init_values(init_idc);
            for (qp, table) in per_qp.iter_mut().enumerate() {
                for (cell, &v) in table.cells.iter_mut().zip(values.iter()) {
                    *cell = init_context_state(v, qp as i32);
                }
            }
        }
        tables
    });
