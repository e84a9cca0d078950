//! Residual quadtree: `transform_tree`, `transform_unit` and `cu_qp_delta`.

use crate::binarization::Binarization;
use crate::cabac::BinEncoder;
use crate::config::EntropyConfig;
use crate::context::ctx;
use crate::error::{EntropyError, Result};
use crate::syntax::cursor::QpState;
use crate::syntax::residual::{encode_residual, ResidualOptions};
use crate::types::{
    CodingUnit, Component, PartMode, ResidualBlock, ScanOrder, TransformNode, TransformUnit,
};

/// Prefix length of `cu_qp_delta_abs`.
const QP_DELTA_PREFIX_MAX: u32 = 5;

/// Tree-wide parameters derived from the CU.
#[derive(Debug, Clone, Copy)]
struct TreeParams<'a> {
    config: &'a EntropyConfig,
    intra: bool,
    intra_split: bool,
    inter_split: bool,
    max_depth: u8,
    tq_bypass: bool,
    cu_qp: i32,
}

impl<'a> TreeParams<'a> {
    fn new(config: &'a EntropyConfig, cu: &CodingUnit) -> Self {
        let intra = cu.is_intra();
        let intra_split = intra && cu.part_mode == PartMode::PartNxN;
        let max_depth = if intra {
            config.max_transform_hierarchy_depth_intra + intra_split as u8
        } else {
            config.max_transform_hierarchy_depth_inter
        };
        let inter_split = !intra
            && config.max_transform_hierarchy_depth_inter == 0
            && cu.part_mode != PartMode::Part2Nx2N;

        Self {
            config,
            intra,
            intra_split,
            inter_split,
            max_depth,
            tq_bypass: cu.tq_bypass,
            cu_qp: cu.qp,
        }
    }

    /// `Some(split)` when `split_transform_flag` is inferred, `None` when coded.
    fn inferred_split(&self, log2_size: u8, depth: u8) -> Option<bool> {
        let config = self.config;
        let coded = log2_size <= config.log2_max_tb_size
            && log2_size > config.log2_min_tb_size
            && depth < self.max_depth
            && !(self.intra_split && depth == 0);
        if coded {
            return None;
        }
        Some(
            log2_size > config.log2_max_tb_size
                || (self.intra_split && depth == 0)
                || (self.inter_split && depth == 0),
        )
    }
}

/// Transform tree with no coded block, following the inferred splits.
pub fn zero_transform_tree(config: &EntropyConfig, cu: &CodingUnit) -> TransformNode {
    let params = TreeParams::new(config, cu);
    zero_node(&params, cu.log2_size, 0)
}

fn zero_node(params: &TreeParams<'_>, log2_size: u8, depth: u8) -> TransformNode {
    if params.inferred_split(log2_size, depth) == Some(true) {
        let child = || zero_node(params, log2_size - 1, depth + 1);
        TransformNode::Split(Box::new([child(), child(), child(), child()]))
    } else {
        TransformNode::Leaf(TransformUnit::default())
    }
}

/// Encode the transform tree of `cu`.
///
/// Returns the Q12 cost of the `split_transform_flag` bins, which callers
/// subtract to obtain the texture cost of the tree.
pub fn encode_transform_tree<E: BinEncoder + ?Sized>(
    enc: &mut E,
    config: &EntropyConfig,
    qp: &mut QpState,
    cu: &CodingUnit,
    tree: &TransformNode,
) -> Result<u64> {
    let params = TreeParams::new(config, cu);
    let mut split_q12 = 0;
    transform_tree(
        enc,
        &params,
        qp,
        tree,
        cu.log2_size,
        0,
        3,
        [true, true],
        &mut split_q12,
    )?;
    Ok(split_q12)
}

#[allow(clippy::too_many_arguments)]
fn transform_tree<E: BinEncoder + ?Sized>(
    enc: &mut E,
    params: &TreeParams<'_>,
    qp: &mut QpState,
    node: &TransformNode,
    log2_size: u8,
    depth: u8,
    blk_idx: usize,
    parent_cbf_chroma: [bool; 2],
    split_q12: &mut u64,
) -> Result<()> {
    let is_split = matches!(node, TransformNode::Split(_));
    match params.inferred_split(log2_size, depth) {
        None => {
            let before = enc.bits_estimated_q12();
            enc.encode_bin(is_split as u32, ctx::SPLIT_TRANSFORM + (5 - log2_size as usize))?;
            *split_q12 += enc.bits_estimated_q12() - before;
        }
        Some(inferred) if inferred != is_split => {
            return Err(EntropyError::syntax(format!(
                "split_transform_flag is inferred {} at {}x{} depth {}",
                inferred as u8,
                1 << log2_size,
                1 << log2_size,
                depth
            )));
        }
        Some(_) => {}
    }

    // 4x4 luma blocks share the chroma flags of their 8x8 parent
    let cbf_chroma = if log2_size > 2 {
        let mut cbf = [false; 2];
        for (i, component) in [Component::Cb, Component::Cr].into_iter().enumerate() {
            cbf[i] = node.has_chroma(component);
            if depth == 0 || parent_cbf_chroma[i] {
                enc.encode_bin(cbf[i] as u32, ctx::CBF_CBCR + depth as usize)?;
            } else if cbf[i] {
                return Err(EntropyError::syntax("chroma block under a zero parent cbf"));
            }
        }
        cbf
    } else {
        parent_cbf_chroma
    };

    match node {
        TransformNode::Split(children) => {
            for (i, child) in children.iter().enumerate() {
                transform_tree(
                    enc,
                    params,
                    qp,
                    child,
                    log2_size - 1,
                    depth + 1,
                    i,
                    cbf_chroma,
                    split_q12,
                )?;
            }
            Ok(())
        }
        TransformNode::Leaf(tu) => {
            if log2_size == 2 && blk_idx != 3 && (tu.cb.is_some() || tu.cr.is_some()) {
                return Err(EntropyError::syntax(
                    "4x4 chroma blocks belong to the last 4x4 luma block",
                ));
            }

            let cbf_luma = tu.luma.is_some();
            if params.intra || depth != 0 || cbf_chroma[0] || cbf_chroma[1] {
                enc.encode_bin(cbf_luma as u32, ctx::CBF_LUMA + (depth == 0) as usize)?;
            } else if !cbf_luma {
                return Err(EntropyError::syntax("cbf_luma is inferred set but no luma block is coded"));
            }

            transform_unit(enc, params, qp, tu, log2_size, blk_idx, cbf_chroma)
        }
    }
}

fn transform_unit<E: BinEncoder + ?Sized>(
    enc: &mut E,
    params: &TreeParams<'_>,
    qp: &mut QpState,
    tu: &TransformUnit,
    log2_size: u8,
    blk_idx: usize,
    cbf_chroma: [bool; 2],
) -> Result<()> {
    let cbf_luma = tu.luma.is_some();
    if (cbf_luma || cbf_chroma[0] || cbf_chroma[1]) && qp.delta_pending() {
        let delta = qp.code_delta(params.cu_qp);
        encode_cu_qp_delta(enc, delta)?;
    }

    if let Some(luma) = &tu.luma {
        encode_block(enc, params, luma, log2_size, Component::Luma, tu.scan_luma)?;
    }

    let chroma_log2 = if log2_size > 2 {
        Some(log2_size - 1)
    } else if blk_idx == 3 {
        Some(2)
    } else {
        None
    };
    if let Some(log2) = chroma_log2 {
        if let Some(cb) = &tu.cb {
            encode_block(enc, params, cb, log2, Component::Cb, tu.scan_chroma)?;
        }
        if let Some(cr) = &tu.cr {
            encode_block(enc, params, cr, log2, Component::Cr, tu.scan_chroma)?;
        }
    }
    Ok(())
}

fn encode_block<E: BinEncoder + ?Sized>(
    enc: &mut E,
    params: &TreeParams<'_>,
    block: &ResidualBlock,
    log2_size: u8,
    component: Component,
    scan: ScanOrder,
) -> Result<()> {
    let opts = ResidualOptions {
        log2_size,
        component,
        scan,
        transform_skip: block.transform_skip,
        tq_bypass: params.tq_bypass,
    };
    encode_residual(enc, params.config, &block.coeffs, &opts)
}

/// Encode `cu_qp_delta_abs` and `cu_qp_delta_sign_flag`.
pub fn encode_cu_qp_delta<E: BinEncoder + ?Sized>(enc: &mut E, delta: i32) -> Result<()> {
    let abs = delta.unsigned_abs();
    enc.encode_tunary(abs.min(QP_DELTA_PREFIX_MAX), QP_DELTA_PREFIX_MAX, ctx::QP_DELTA_ABS, 0, 1)?;
    if abs >= QP_DELTA_PREFIX_MAX {
        enc.encode_egk(abs - QP_DELTA_PREFIX_MAX, 0)?;
    }
    if abs > 0 {
        enc.encode_bypass_bin((delta < 0) as u32)?;
    }
    Ok(())
}
