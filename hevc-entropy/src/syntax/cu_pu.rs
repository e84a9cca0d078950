//! `coding_unit` and `prediction_unit` syntax.

use crate::binarization::Binarization;
use crate::cabac::BinEncoder;
use crate::context::ctx;
use crate::error::{EntropyError, Result};
use crate::syntax::cursor::{FrameContext, TraversalState};
use crate::syntax::transform::{encode_transform_tree, zero_transform_tree};
use crate::types::{
    CodingUnit, InterPredIdc, IntraLumaMode, IntraPrediction, Mvd, PartMode, Prediction,
    PredictionUnit, SliceType,
};

/// `part_mode` bins `(value, length)` for inter CUs above the minimum
/// size, indexed by `[amp_enabled][part_mode]`. A zero length marks a
/// partition that cannot be signalled.
pub const INTER_PART_MODE_BINS: [[(u8, u8); 8]; 2] = [
    [(0b1, 1), (0b01, 2), (0b00, 2), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [
        (0b1, 1),
        (0b011, 3),
        (0b001, 3),
        (0, 0),
        (0b0100, 4),
        (0b0101, 4),
        (0b0000, 4),
        (0b0001, 4),
    ],
];

/// `part_mode` bins for inter CUs at the minimum size, indexed by
/// `[log2_size > 3][part_mode]`.
pub const INTER_PART_MODE_BINS_MIN_CU: [[(u8, u8); 8]; 2] = [
    [(0b1, 1), (0b01, 2), (0b00, 2), (0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(0b1, 1), (0b01, 2), (0b001, 3), (0b000, 3), (0, 0), (0, 0), (0, 0), (0, 0)],
];

/// Texture part of a coded CU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CuCost {
    /// Q12 cost of the transform tree minus its `split_transform_flag`s.
    pub texture_q12: u64,
}

/// Encode one coding unit and update the neighbour maps and QP state.
pub fn encode_coding_unit<E: BinEncoder + ?Sized>(
    enc: &mut E,
    frame: &FrameContext<'_>,
    state: &mut TraversalState,
    cu: &CodingUnit,
) -> Result<CuCost> {
    let config = frame.config;
    let slice = frame.slice;
    check_cu(frame, cu)?;

    if config.transquant_bypass_enabled {
        enc.encode_bin(cu.tq_bypass as u32, ctx::CU_TRANSQUANT_BYPASS)?;
    }

    if slice.slice_type != SliceType::I {
        let ctx_inc = state.maps.skip_ctx_inc(cu.x, cu.y);
        enc.encode_bin(cu.skip as u32, ctx::SKIP_FLAG + ctx_inc)?;
    }

    let mut cost = CuCost::default();
    if cu.skip {
        let pu = match &cu.prediction {
            Prediction::Inter(pus) if pus.len() == 1 && pus[0].merge_flag => pus[0],
            _ => return Err(EntropyError::syntax("skipped CU needs a single merge PU")),
        };
        encode_merge_idx(enc, frame, pu.merge_idx)?;
    } else {
        let intra = cu.is_intra();
        if slice.slice_type != SliceType::I {
            enc.encode_bin(intra as u32, ctx::PRED_MODE)?;
        }
        encode_part_mode(enc, frame, cu)?;

        match &cu.prediction {
            Prediction::Intra(pred) => encode_intra_prediction(enc, cu.part_mode, pred)?,
            Prediction::Inter(pus) => {
                if pus.len() != cu.part_mode.num_parts() {
                    return Err(EntropyError::syntax(format!(
                        "{:?} needs {} PUs, got {}",
                        cu.part_mode,
                        cu.part_mode.num_parts(),
                        pus.len()
                    )));
                }
                let size = 1u32 << cu.log2_size;
                let ct_depth = (config.log2_ctb_size - cu.log2_size) as usize;
                for (idx, pu) in pus.iter().enumerate() {
                    let (_, _, w, h) = cu.part_mode.partition(idx, size);
                    encode_prediction_unit(enc, frame, pu, w + h, ct_depth)?;
                }
            }
        }

        let has_residual = cu.has_residual();
        let code_tree = if intra || cu.is_merge_2nx2n() {
            // rqt_root_cbf is inferred set for a 2Nx2N merge CU
            true
        } else {
            enc.encode_bin(has_residual as u32, ctx::RQT_ROOT_CBF)?;
            has_residual
        };

        if code_tree {
            let zero_tree;
            let tree = match &cu.residual {
                Some(tree) => tree,
                None => {
                    zero_tree = zero_transform_tree(config, cu);
                    &zero_tree
                }
            };
            let before = enc.bits_estimated_q12();
            let split_q12 = encode_transform_tree(enc, config, &mut state.qp, cu, tree)?;
            cost.texture_q12 = enc.bits_estimated_q12() - before - split_q12;
        }
    }

    state.maps.record_cu(cu, config.log2_ctb_size);
    state.qp.finish_cu(cu.x, cu.y, cu.log2_size);
    Ok(cost)
}

fn check_cu(frame: &FrameContext<'_>, cu: &CodingUnit) -> Result<()> {
    let config = frame.config;
    if cu.log2_size < config.log2_min_cb_size || cu.log2_size > config.log2_ctb_size {
        return Err(EntropyError::syntax(format!(
            "CU size {} outside the configured range",
            1u32 << cu.log2_size
        )));
    }
    let mask = (1u32 << cu.log2_size) - 1;
    if cu.x & mask != 0 || cu.y & mask != 0 || cu.x >= config.ctb_size() || cu.y >= config.ctb_size() {
        return Err(EntropyError::syntax(format!(
            "CU at ({}, {}) is not aligned inside the CTB",
            cu.x, cu.y
        )));
    }
    if cu.tq_bypass && !config.transquant_bypass_enabled {
        return Err(EntropyError::syntax("cu_transquant_bypass_flag without PPS support"));
    }
    if frame.slice.slice_type == SliceType::I && !cu.is_intra() {
        return Err(EntropyError::syntax("inter CU in an I slice"));
    }
    if cu.skip && (cu.is_intra() || cu.part_mode != PartMode::Part2Nx2N || cu.has_residual()) {
        return Err(EntropyError::syntax("skipped CU must be a 2Nx2N merge without residual"));
    }
    Ok(())
}

fn encode_part_mode<E: BinEncoder + ?Sized>(
    enc: &mut E,
    frame: &FrameContext<'_>,
    cu: &CodingUnit,
) -> Result<()> {
    let config = frame.config;
    let min_cu = cu.log2_size == config.log2_min_cb_size;

    if cu.is_intra() {
        return match cu.part_mode {
            PartMode::Part2Nx2N if min_cu => enc.encode_bin(1, ctx::PART_MODE),
            PartMode::Part2Nx2N => Ok(()),
            PartMode::PartNxN if min_cu => enc.encode_bin(0, ctx::PART_MODE),
            other => Err(EntropyError::syntax(format!(
                "{:?} is not an intra partition at {}x{}",
                other,
                1 << cu.log2_size,
                1 << cu.log2_size
            ))),
        };
    }

    let part = cu.part_mode as usize;
    let (bins, len, ctx_incs) = if min_cu {
        let (bins, len) = INTER_PART_MODE_BINS_MIN_CU[(cu.log2_size > 3) as usize][part];
        (bins, len, [Some(0), Some(1), Some(2), None])
    } else {
        let (bins, len) = INTER_PART_MODE_BINS[config.amp_enabled as usize][part];
        (bins, len, [Some(0), Some(1), Some(3), None])
    };
    if len == 0 {
        return Err(EntropyError::syntax(format!(
            "{:?} not allowed for a {}x{} inter CU{}",
            cu.part_mode,
            1 << cu.log2_size,
            1 << cu.log2_size,
            if config.amp_enabled { "" } else { " without AMP" }
        )));
    }

    for i in 0..len {
        let bin = ((bins >> (len - 1 - i)) & 1) as u32;
        match ctx_incs[i as usize] {
            Some(inc) => enc.encode_bin(bin, ctx::PART_MODE + inc)?,
            None => enc.encode_bypass_bin(bin)?,
        }
    }
    Ok(())
}

fn encode_intra_prediction<E: BinEncoder + ?Sized>(
    enc: &mut E,
    part_mode: PartMode,
    pred: &IntraPrediction,
) -> Result<()> {
    let modes = &pred.luma[..part_mode.num_parts()];

    for mode in modes {
        enc.encode_bin(matches!(mode, IntraLumaMode::Mpm(_)) as u32, ctx::PREV_INTRA_LUMA_PRED)?;
    }
    for mode in modes {
        match *mode {
            IntraLumaMode::Mpm(idx) if idx <= 2 => enc.encode_tunary_bypass(idx as u32, 2)?,
            IntraLumaMode::Remaining(rem) if rem <= 31 => enc.encode_bypass_bins(rem as u32, 5)?,
            other => {
                return Err(EntropyError::syntax(format!("Invalid intra luma mode {:?}", other)));
            }
        }
    }

    match pred.chroma_pred_mode {
        4 => enc.encode_bin(0, ctx::CHROMA_PRED_MODE),
        mode @ 0..=3 => {
            enc.encode_bin(1, ctx::CHROMA_PRED_MODE)?;
            enc.encode_bypass_bins(mode as u32, 2)
        }
        mode => Err(EntropyError::syntax(format!("intra_chroma_pred_mode {} > 4", mode))),
    }
}

/// Encode `merge_idx`: one context bin, then truncated unary bypass bins.
pub fn encode_merge_idx<E: BinEncoder + ?Sized>(
    enc: &mut E,
    frame: &FrameContext<'_>,
    merge_idx: u8,
) -> Result<()> {
    let max = frame.slice.max_num_merge_cand;
    if merge_idx >= max {
        return Err(EntropyError::syntax(format!("merge_idx {} >= max {}", merge_idx, max)));
    }
    let c_max = (max - 1) as u32;
    if c_max == 0 {
        return Ok(());
    }

    let idx = merge_idx as u32;
    enc.encode_bin((idx > 0) as u32, ctx::MERGE_IDX)?;
    if idx > 0 && c_max > 1 {
        enc.encode_tunary_bypass(idx - 1, c_max - 1)?;
    }
    Ok(())
}

fn encode_prediction_unit<E: BinEncoder + ?Sized>(
    enc: &mut E,
    frame: &FrameContext<'_>,
    pu: &PredictionUnit,
    pb_sum: u32,
    ct_depth: usize,
) -> Result<()> {
    let slice = frame.slice;
    enc.encode_bin(pu.merge_flag as u32, ctx::MERGE_FLAG)?;
    if pu.merge_flag {
        return encode_merge_idx(enc, frame, pu.merge_idx);
    }

    if slice.slice_type.is_b() {
        encode_inter_pred_idc(enc, pu.inter_pred_idc, pb_sum, ct_depth)?;
    } else if pu.inter_pred_idc != InterPredIdc::L0 {
        return Err(EntropyError::syntax("P slices only predict from list 0"));
    }

    for list in 0..2 {
        if !pu.inter_pred_idc.uses_list(list) {
            continue;
        }
        encode_ref_idx(enc, pu.ref_idx[list], slice.num_ref_idx_active[list])?;

        if list == 1 && slice.mvd_l1_zero_flag && pu.inter_pred_idc == InterPredIdc::Bi {
            if pu.mvd[1] != Mvd::default() {
                return Err(EntropyError::syntax("L1 MVD must be zero with mvd_l1_zero_flag"));
            }
        } else {
            encode_mvd(enc, pu.mvd[list])?;
        }

        enc.encode_bin(pu.mvp_flag[list] as u32, ctx::MVP_FLAG)?;
    }
    Ok(())
}

fn encode_inter_pred_idc<E: BinEncoder + ?Sized>(
    enc: &mut E,
    idc: InterPredIdc,
    pb_sum: u32,
    ct_depth: usize,
) -> Result<()> {
    if pb_sum != 12 {
        let bi = idc == InterPredIdc::Bi;
        enc.encode_bin(bi as u32, ctx::INTER_PRED_IDC + ct_depth)?;
        if bi {
            return Ok(());
        }
    } else if idc == InterPredIdc::Bi {
        return Err(EntropyError::syntax("bi-prediction is not allowed for 8x4 and 4x8 PUs"));
    }
    enc.encode_bin((idc == InterPredIdc::L1) as u32, ctx::INTER_PRED_IDC + 4)
}

fn encode_ref_idx<E: BinEncoder + ?Sized>(enc: &mut E, ref_idx: u8, num_active: u8) -> Result<()> {
    if ref_idx >= num_active {
        return Err(EntropyError::syntax(format!(
            "ref_idx {} >= {} active references",
            ref_idx, num_active
        )));
    }
    if num_active <= 1 {
        return Ok(());
    }

    let c_max = (num_active - 1) as u32;
    let ref_idx = ref_idx as u32;
    let len = if ref_idx < c_max { ref_idx + 1 } else { c_max };
    for i in 0..len {
        let bin = (i < ref_idx) as u32;
        if i < 2 {
            enc.encode_bin(bin, ctx::REF_IDX + i as usize)?;
        } else {
            enc.encode_bypass_bin(bin)?;
        }
    }
    Ok(())
}

/// Encode `mvd_coding` for one motion vector difference.
pub fn encode_mvd<E: BinEncoder + ?Sized>(enc: &mut E, mvd: Mvd) -> Result<()> {
    let abs = [mvd.x.unsigned_abs(), mvd.y.unsigned_abs()];
    let negative = [mvd.x < 0, mvd.y < 0];
    if abs.iter().any(|&a| a > 1 << 15) {
        return Err(EntropyError::syntax(format!("MVD {:?} out of range", mvd)));
    }

    enc.encode_bin((abs[0] > 0) as u32, ctx::MVD_GREATER0)?;
    enc.encode_bin((abs[1] > 0) as u32, ctx::MVD_GREATER0)?;
    for &a in &abs {
        if a > 0 {
            enc.encode_bin((a > 1) as u32, ctx::MVD_GREATER1)?;
        }
    }
    for (a, neg) in abs.into_iter().zip(negative) {
        if a > 0 {
            if a > 1 {
                enc.encode_egk(a - 2, 1)?;
            }
            enc.encode_bypass_bin(neg as u32)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cabac::{BinKind, BinRecorder};
    use crate::config::{EntropyConfig, SliceParams};
    use crate::context::ContextTable;
    use crate::types::{ResidualBlock, TransformNode, TransformUnit};

    fn recorder() -> BinRecorder {
        BinRecorder::new(ContextTable::initial(1, 30))
    }

    fn bins(rec: &BinRecorder) -> Vec<u32> {
        rec.bins().iter().map(|b| b.bin).collect()
    }

    fn encode(config: &EntropyConfig, slice: &SliceParams, cu: &CodingUnit) -> Result<BinRecorder> {
        let frame = FrameContext::new(config, slice);
        let mut state = TraversalState::new(config, slice);
        state.maps.start_ctb(frame.ctb_neighbours(0));
        let mut rec = recorder();
        encode_coding_unit(&mut rec, &frame, &mut state, cu)?;
        Ok(rec)
    }

    fn luma_leaf(log2: u8) -> TransformNode {
        let mut coeffs = vec![0i16; 1 << (2 * log2)];
        coeffs[0] = 2;
        TransformNode::Leaf(TransformUnit {
            luma: Some(ResidualBlock::new(coeffs)),
            ..Default::default()
        })
    }

    #[test]
    fn test_skip_cu() {
        let config = EntropyConfig::new(64, 64);
        let slice = SliceParams::new(SliceType::P, 30);
        let rec = encode(&config, &slice, &CodingUnit::skip(0, 0, 6, 3, 30)).unwrap();
        // skip, merge_idx 3 of 5: 1 + 110
        assert_eq!(bins(&rec), vec![1, 1, 1, 1, 0]);
        assert_eq!(rec.bins()[0].kind, BinKind::Context(ctx::SKIP_FLAG));
        assert_eq!(rec.bins()[1].kind, BinKind::Context(ctx::MERGE_IDX));
        assert_eq!(rec.bypass_bins(), 3);

        let last = encode(&config, &slice, &CodingUnit::skip(0, 0, 6, 4, 30)).unwrap();
        assert_eq!(bins(&last), vec![1, 1, 1, 1, 1]);

        let single = SliceParams::new(SliceType::P, 30).with_max_num_merge_cand(1);
        let rec = encode(&config, &single, &CodingUnit::skip(0, 0, 6, 0, 30)).unwrap();
        assert_eq!(bins(&rec), vec![1]);
    }

    #[test]
    fn test_intra_cu_in_i_slice() {
        let config = EntropyConfig::new(64, 64);
        let slice = SliceParams::new(SliceType::I, 30);
        let pred = IntraPrediction {
            luma: [IntraLumaMode::Remaining(17); 4],
            chroma_pred_mode: 4,
        };
        let cu = CodingUnit::intra(0, 0, 3, PartMode::Part2Nx2N, pred, 30);
        let rec = encode(&config, &slice, &cu).unwrap();
        let head: Vec<_> = rec.bins().iter().take(8).map(|b| (b.kind, b.bin)).collect();
        assert_eq!(
            head,
            vec![
                (BinKind::Context(ctx::PART_MODE), 1),
                (BinKind::Context(ctx::PREV_INTRA_LUMA_PRED), 0),
                (BinKind::Bypass, 1),
                (BinKind::Bypass, 0),
                (BinKind::Bypass, 0),
                (BinKind::Bypass, 0),
                (BinKind::Bypass, 1),
                (BinKind::Context(ctx::CHROMA_PRED_MODE), 0),
            ]
        );
    }

    #[test]
    fn test_intra_nxn_flags_precede_indices() {
        let config = EntropyConfig::new(64, 64);
        let slice = SliceParams::new(SliceType::I, 30);
        let pred = IntraPrediction {
            luma: [
                IntraLumaMode::Mpm(0),
                IntraLumaMode::Mpm(2),
                IntraLumaMode::Remaining(0),
                IntraLumaMode::Mpm(1),
            ],
            chroma_pred_mode: 1,
        };
        let cu = CodingUnit::intra(0, 0, 3, PartMode::PartNxN, pred, 30);
        let rec = encode(&config, &slice, &cu).unwrap();
        // part_mode 0, flags 1 1 0 1, mpm 0: 0, mpm 2: 11, rem 0: 00000, mpm 1: 10, chroma 1 01
        assert_eq!(
            &bins(&rec)[..19],
            &[0, 1, 1, 0, 1, 0, 1, 1, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 0]
        );
    }

    #[test]
    fn test_inter_part_mode_binarization() {
        let slice = SliceParams::new(SliceType::P, 30);
        let pus = |n: usize| vec![PredictionUnit::merge(0); n];

        let amp = EntropyConfig::new(64, 64).with_amp(true);
        let cu = CodingUnit::inter(0, 0, 5, PartMode::PartnRx2N, pus(2), 30)
            .with_residual(luma_leaf(5));
        let rec = encode(&amp, &slice, &cu).unwrap();
        // skip 0, pred_mode 0, part_mode 0001
        let part: Vec<_> = rec.bins()[2..6].iter().map(|b| (b.kind, b.bin)).collect();
        assert_eq!(
            part,
            vec![
                (BinKind::Context(ctx::PART_MODE), 0),
                (BinKind::Context(ctx::PART_MODE + 1), 0),
                (BinKind::Context(ctx::PART_MODE + 3), 0),
                (BinKind::Bypass, 1),
            ]
        );

        let no_amp = EntropyConfig::new(64, 64);
        assert!(encode(&no_amp, &slice, &cu).is_err());

        // 8x8 inter NxN is never allowed
        let cu = CodingUnit::inter(0, 0, 3, PartMode::PartNxN, pus(4), 30);
        assert!(encode(&no_amp, &slice, &cu).is_err());

        // 16x16 minimum CU allows NxN: 000 with the third bin on ctx 2
        let config = EntropyConfig::new(64, 64).with_block_sizes(6, 4);
        let cu = CodingUnit::inter(0, 0, 4, PartMode::PartNxN, pus(4), 30).with_residual(luma_leaf(4));
        let rec = encode(&config, &slice, &cu).unwrap();
        assert_eq!(rec.bins()[4].kind, BinKind::Context(ctx::PART_MODE + 2));
        assert_eq!(&bins(&rec)[2..5], &[0, 0, 0]);
    }

    #[test]
    fn test_amvp_pu_in_b_slice() {
        let config = EntropyConfig::new(64, 64);
        let slice = SliceParams::new(SliceType::B, 30).with_num_ref_idx_active(3, 1);
        let pu = PredictionUnit {
            inter_pred_idc: InterPredIdc::L0,
            ref_idx: [2, 0],
            mvd: [Mvd::new(-3, 0), Mvd::default()],
            mvp_flag: [true, false],
            ..Default::default()
        };
        let cu = CodingUnit::inter(0, 0, 4, PartMode::Part2Nx2N, vec![pu], 30);
        let rec = encode(&config, &slice, &cu).unwrap();

        let expected = vec![
            (BinKind::Context(ctx::SKIP_FLAG), 0),
            (BinKind::Context(ctx::PRED_MODE), 0),
            (BinKind::Context(ctx::PART_MODE), 1),
            (BinKind::Context(ctx::MERGE_FLAG), 0),
            // inter_pred_idc at CU depth 2, then the L0/L1 bin
            (BinKind::Context(ctx::INTER_PRED_IDC + 2), 0),
            (BinKind::Context(ctx::INTER_PRED_IDC + 4), 0),
            // ref_idx 2 of cMax 2: 11
            (BinKind::Context(ctx::REF_IDX), 1),
            (BinKind::Context(ctx::REF_IDX + 1), 1),
            // mvd (-3, 0): gt0 1 0, gt1 1, EG1(1) 01, sign 1
            (BinKind::Context(ctx::MVD_GREATER0), 1),
            (BinKind::Context(ctx::MVD_GREATER0), 0),
            (BinKind::Context(ctx::MVD_GREATER1), 1),
            (BinKind::Bypass, 0),
            (BinKind::Bypass, 1),
            (BinKind::Bypass, 1),
            (BinKind::Context(ctx::MVP_FLAG), 1),
            (BinKind::Context(ctx::RQT_ROOT_CBF), 0),
        ];
        let actual: Vec<_> = rec.bins().iter().map(|b| (b.kind, b.bin)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_bi_prediction_rules() {
        let config = EntropyConfig::new(64, 64);
        let slice = SliceParams::new(SliceType::B, 30).with_mvd_l1_zero(true);
        let bi = PredictionUnit {
            inter_pred_idc: InterPredIdc::Bi,
            mvd: [Mvd::new(1, 0), Mvd::default()],
            ..Default::default()
        };

        // 8x8 2NxN gives 8x4 PUs where bi-prediction is forbidden
        let cu = CodingUnit::inter(0, 0, 3, PartMode::Part2NxN, vec![bi, bi], 30);
        assert!(encode(&config, &slice, &cu).is_err());

        // the L1 MVD is skipped
        let cu = CodingUnit::inter(0, 0, 3, PartMode::Part2Nx2N, vec![bi], 30);
        let rec = encode(&config, &slice, &cu).unwrap();
        let gt0 = rec
            .bins()
            .iter()
            .filter(|b| b.kind == BinKind::Context(ctx::MVD_GREATER0))
            .count();
        assert_eq!(gt0, 2);

        let mut bad = bi;
        bad.mvd[1] = Mvd::new(0, 1);
        let cu = CodingUnit::inter(0, 0, 3, PartMode::Part2Nx2N, vec![bad], 30);
        assert!(encode(&config, &slice, &cu).is_err());
    }

    #[test]
    fn test_merge_2nx2n_codes_transform_tree() {
        let config = EntropyConfig::new(64, 64);
        let slice = SliceParams::new(SliceType::P, 30);
        let cu = CodingUnit::inter(0, 0, 4, PartMode::Part2Nx2N, vec![PredictionUnit::merge(1)], 30);

        // an unsplit tree would need cbf_luma set
        assert!(encode(&config, &slice, &cu).is_err());

        // a split tree with every cbf clear is coded as is
        let empty = || TransformNode::Leaf(TransformUnit::default());
        let split = TransformNode::Split(Box::new([empty(), empty(), empty(), empty()]));
        let rec = encode(&config, &slice, &cu.clone().with_residual(split)).unwrap();
        let kinds: Vec<_> = rec.bins().iter().map(|b| (b.kind, b.bin)).collect();
        assert!(kinds.contains(&(BinKind::Context(ctx::SPLIT_TRANSFORM + 1), 1)));
        assert_eq!(
            kinds
                .iter()
                .filter(|&&k| k == (BinKind::Context(ctx::CBF_LUMA), 0))
                .count(),
            4
        );
        assert!(kinds.iter().all(|(k, _)| *k != BinKind::Context(ctx::RQT_ROOT_CBF)));

        let rec = encode(&config, &slice, &cu.clone().with_residual(luma_leaf(4))).unwrap();
        assert!(rec
            .bins()
            .iter()
            .all(|b| b.kind != BinKind::Context(ctx::RQT_ROOT_CBF)));
    }

    #[test]
    fn test_rejects_bad_descriptors() {
        let config = EntropyConfig::new(64, 64);
        let i_slice = SliceParams::new(SliceType::I, 30);
        assert!(encode(&config, &i_slice, &CodingUnit::skip(0, 0, 6, 0, 30)).is_err());

        let p_slice = SliceParams::new(SliceType::P, 30);
        let misaligned = CodingUnit::skip(8, 0, 4, 0, 30);
        assert!(encode(&config, &p_slice, &misaligned).is_err());

        let mut bypass = CodingUnit::skip(0, 0, 4, 0, 30);
        bypass.tq_bypass = true;
        assert!(encode(&config, &p_slice, &bypass).is_err());

        let too_big = CodingUnit::skip(0, 0, 4, 5, 30);
        assert!(encode(&config, &p_slice, &too_big).is_err());
    }

    #[test]
    fn test_maps_and_qp_are_updated() {
        let config = EntropyConfig::new(64, 64);
        let slice = SliceParams::new(SliceType::P, 30);
        let frame = FrameContext::new(&config, &slice);
        let mut state = TraversalState::new(&config, &slice);
        state.maps.start_ctb(frame.ctb_neighbours(0));

        let mut rec = recorder();
        encode_coding_unit(&mut rec, &frame, &mut state, &CodingUnit::skip(0, 0, 4, 0, 30)).unwrap();
        assert_eq!(state.maps.skip_ctx_inc(16, 0), 1);
        assert_eq!(state.maps.split_ctx_inc(16, 0, 1), 1);
        assert_eq!(state.qp.last_qp(), 30);
    }
}
