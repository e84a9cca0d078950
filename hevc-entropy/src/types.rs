//! Syntax descriptors consumed by the entropy coder.
//!
//! Mode decision, motion estimation and quantization produce these values;
//! the syntax encoders only read them.

use crate::error::{EntropyError, Result};

/// Slice type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceType {
    /// B-slice (bidirectional prediction).
    B = 0,
    /// P-slice (forward prediction).
    P = 1,
    /// I-slice (intra only).
    I = 2,
}

impl SliceType {
    /// Create from raw value.
    pub fn from_raw(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::B),
            1 => Ok(Self::P),
            2 => Ok(Self::I),
            _ => Err(EntropyError::config(format!("Invalid slice type: {}", value))),
        }
    }

    /// Check if this is an intra slice.
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::I)
    }

    /// Check if this slice allows bi-prediction.
    pub fn is_b(&self) -> bool {
        matches!(self, Self::B)
    }
}

/// Partition mode of a coding unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PartMode {
    /// One 2Nx2N partition.
    #[default]
    Part2Nx2N = 0,
    /// Two 2NxN partitions.
    Part2NxN = 1,
    /// Two Nx2N partitions.
    PartNx2N = 2,
    /// Four NxN partitions.
    PartNxN = 3,
    /// Asymmetric, upper quarter.
    Part2NxnU = 4,
    /// Asymmetric, lower quarter.
    Part2NxnD = 5,
    /// Asymmetric, left quarter.
    PartnLx2N = 6,
    /// Asymmetric, right quarter.
    PartnRx2N = 7,
}

impl PartMode {
    /// Number of prediction units.
    pub fn num_parts(&self) -> usize {
        match self {
            Self::Part2Nx2N => 1,
            Self::PartNxN => 4,
            _ => 2,
        }
    }

    /// Check for an asymmetric motion partition.
    pub fn is_amp(&self) -> bool {
        matches!(
            self,
            Self::Part2NxnU | Self::Part2NxnD | Self::PartnLx2N | Self::PartnRx2N
        )
    }

    /// Offset and size `(x, y, w, h)` of partition `idx` in a CU of `size`.
    pub fn partition(&self, idx: usize, size: u32) -> (u32, u32, u32, u32) {
        let half = size / 2;
        let quarter = size / 4;
        match (self, idx) {
            (Self::Part2Nx2N, _) => (0, 0, size, size),
            (Self::Part2NxN, 0) => (0, 0, size, half),
            (Self::Part2NxN, _) => (0, half, size, half),
            (Self::PartNx2N, 0) => (0, 0, half, size),
            (Self::PartNx2N, _) => (half, 0, half, size),
            (Self::PartNxN, i) => ((i as u32 & 1) * half, (i as u32 >> 1) * half, half, half),
            (Self::Part2NxnU, 0) => (0, 0, size, quarter),
            (Self::Part2NxnU, _) => (0, quarter, size, size - quarter),
            (Self::Part2NxnD, 0) => (0, 0, size, size - quarter),
            (Self::Part2NxnD, _) => (0, size - quarter, size, quarter),
            (Self::PartnLx2N, 0) => (0, 0, quarter, size),
            (Self::PartnLx2N, _) => (quarter, 0, size - quarter, size),
            (Self::PartnRx2N, 0) => (0, 0, size - quarter, size),
            (Self::PartnRx2N, _) => (size - quarter, 0, quarter, size),
        }
    }
}

/// Coefficient scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScanOrder {
    /// Up-right diagonal.
    #[default]
    Diagonal = 0,
    /// Horizontal (raster).
    Horizontal = 1,
    /// Vertical (column-major).
    Vertical = 2,
}

/// Colour component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Luma.
    Luma = 0,
    /// Blue-difference chroma.
    Cb = 1,
    /// Red-difference chroma.
    Cr = 2,
}

impl Component {
    /// Check for a chroma component.
    pub fn is_chroma(&self) -> bool {
        !matches!(self, Self::Luma)
    }
}

/// Luma intra mode of one partition, already resolved against the MPM list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntraLumaMode {
    /// Index into the three most probable modes.
    Mpm(u8),
    /// Remaining mode (0..=31) outside the MPM list.
    Remaining(u8),
}

impl Default for IntraLumaMode {
    fn default() -> Self {
        Self::Mpm(0)
    }
}

/// Intra prediction syntax of a coding unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntraPrediction {
    /// Luma modes; only the first entry is used for 2Nx2N.
    pub luma: [IntraLumaMode; 4],
    /// `intra_chroma_pred_mode`, 0..=4 where 4 derives from luma.
    pub chroma_pred_mode: u8,
}

/// Inter prediction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterPredIdc {
    /// List 0 only.
    #[default]
    L0 = 0,
    /// List 1 only.
    L1 = 1,
    /// Bi-prediction.
    Bi = 2,
}

impl InterPredIdc {
    /// Check whether list `list` (0 or 1) is used.
    pub fn uses_list(&self, list: usize) -> bool {
        match self {
            Self::L0 => list == 0,
            Self::L1 => list == 1,
            Self::Bi => true,
        }
    }
}

/// Motion vector difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Mvd {
    /// Horizontal component.
    pub x: i32,
    /// Vertical component.
    pub y: i32,
}

impl Mvd {
    /// Create a new motion vector difference.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Syntax of one inter prediction unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredictionUnit {
    /// Merge mode.
    pub merge_flag: bool,
    /// Merge candidate index.
    pub merge_idx: u8,
    /// Prediction direction (explicit mode only).
    pub inter_pred_idc: InterPredIdc,
    /// Reference indices per list.
    pub ref_idx: [u8; 2],
    /// Motion vector differences per list.
    pub mvd: [Mvd; 2],
    /// MVP candidate flags per list.
    pub mvp_flag: [bool; 2],
}

impl PredictionUnit {
    /// Merge-mode prediction unit.
    pub fn merge(merge_idx: u8) -> Self {
        Self {
            merge_flag: true,
            merge_idx,
            ..Default::default()
        }
    }

    /// Single-list AMVP prediction unit.
    pub fn amvp(list: usize, ref_idx: u8, mvd: Mvd, mvp_flag: bool) -> Self {
        let mut pu = Self {
            inter_pred_idc: if list == 0 { InterPredIdc::L0 } else { InterPredIdc::L1 },
            ..Default::default()
        };
        let l = list.min(1);
        pu.ref_idx[l] = ref_idx;
        pu.mvd[l] = mvd;
        pu.mvp_flag[l] = mvp_flag;
        pu
    }
}

/// Prediction syntax of a coding unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prediction {
    /// Intra prediction.
    Intra(IntraPrediction),
    /// Inter prediction, one entry per partition.
    Inter(Vec<PredictionUnit>),
}

impl Prediction {
    /// Check for intra prediction.
    pub fn is_intra(&self) -> bool {
        matches!(self, Self::Intra(_))
    }
}

/// Quantized coefficients of one transform block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResidualBlock {
    /// Levels in raster order, `(1 << log2_size)^2` entries.
    pub coeffs: Vec<i16>,
    /// `transform_skip_flag` for this block.
    pub transform_skip: bool,
}

impl ResidualBlock {
    /// Create a block from raster-order levels.
    pub fn new(coeffs: Vec<i16>) -> Self {
        Self {
            coeffs,
            transform_skip: false,
        }
    }

    /// Check whether any level is non-zero.
    pub fn has_nonzero(&self) -> bool {
        self.coeffs.iter().any(|&c| c != 0)
    }
}

/// Leaf of the transform tree. A present block means its cbf is set.
///
/// With 4:2:0 sampling an 8x8 luma node split into four 4x4 leaves carries
/// its 4x4 chroma blocks on the fourth leaf only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformUnit {
    /// Luma block.
    pub luma: Option<ResidualBlock>,
    /// Cb block.
    pub cb: Option<ResidualBlock>,
    /// Cr block.
    pub cr: Option<ResidualBlock>,
    /// Scan used for luma.
    pub scan_luma: ScanOrder,
    /// Scan used for chroma.
    pub scan_chroma: ScanOrder,
}

impl TransformUnit {
    /// Check whether any block is coded.
    pub fn has_residual(&self) -> bool {
        self.luma.is_some() || self.cb.is_some() || self.cr.is_some()
    }
}

/// Node of the residual quadtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformNode {
    /// Split into four children in Z order.
    Split(Box<[TransformNode; 4]>),
    /// Leaf transform unit.
    Leaf(TransformUnit),
}

impl TransformNode {
    /// Check whether any descendant carries a luma block.
    pub fn has_luma(&self) -> bool {
        match self {
            Self::Split(children) => children.iter().any(|c| c.has_luma()),
            Self::Leaf(tu) => tu.luma.is_some(),
        }
    }

    /// Check whether any descendant carries a block of `component`.
    pub fn has_chroma(&self, component: Component) -> bool {
        match self {
            Self::Split(children) => children.iter().any(|c| c.has_chroma(component)),
            Self::Leaf(tu) => match component {
                Component::Cb => tu.cb.is_some(),
                Component::Cr => tu.cr.is_some(),
                Component::Luma => tu.luma.is_some(),
            },
        }
    }

    /// Check whether any descendant carries a block.
    pub fn has_residual(&self) -> bool {
        match self {
            Self::Split(children) => children.iter().any(|c| c.has_residual()),
            Self::Leaf(tu) => tu.has_residual(),
        }
    }
}

/// SAO type of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaoType {
    /// Not applied.
    #[default]
    Off = 0,
    /// Band offset.
    Band = 1,
    /// Edge offset.
    Edge = 2,
}

/// SAO parameters of one colour component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaoComponent {
    /// Offset type. Cr always shares the type of Cb.
    pub type_idx: SaoType,
    /// Signed offsets. Edge offsets are coded by magnitude only.
    pub offsets: [i8; 4],
    /// Band position (band offset).
    pub band_position: u8,
    /// Edge class (edge offset). Cr shares the class of Cb.
    pub eo_class: u8,
}

/// SAO parameters of one CTB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaoParams {
    /// Copy parameters from the left CTB.
    pub merge_left: bool,
    /// Copy parameters from the CTB above.
    pub merge_up: bool,
    /// Per-component parameters, luma first.
    pub components: [SaoComponent; 3],
}

/// Leaf coding unit of a coding tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingUnit {
    /// Horizontal position inside the CTB in luma samples.
    pub x: u32,
    /// Vertical position inside the CTB in luma samples.
    pub y: u32,
    /// log2 of the CU size.
    pub log2_size: u8,
    /// `cu_transquant_bypass_flag`.
    pub tq_bypass: bool,
    /// `cu_skip_flag`.
    pub skip: bool,
    /// Partition mode.
    pub part_mode: PartMode,
    /// Luma QP chosen for this CU.
    pub qp: i32,
    /// Prediction syntax.
    pub prediction: Prediction,
    /// Residual quadtree; `None` codes no residual.
    pub residual: Option<TransformNode>,
}

impl CodingUnit {
    /// Skipped CU using merge candidate `merge_idx`.
    pub fn skip(x: u32, y: u32, log2_size: u8, merge_idx: u8, qp: i32) -> Self {
        Self {
            x,
            y,
            log2_size,
            tq_bypass: false,
            skip: true,
            part_mode: PartMode::Part2Nx2N,
            qp,
            prediction: Prediction::Inter(vec![PredictionUnit::merge(merge_idx)]),
            residual: None,
        }
    }

    /// Intra CU.
    pub fn intra(
        x: u32,
        y: u32,
        log2_size: u8,
        part_mode: PartMode,
        intra: IntraPrediction,
        qp: i32,
    ) -> Self {
        Self {
            x,
            y,
            log2_size,
            tq_bypass: false,
            skip: false,
            part_mode,
            qp,
            prediction: Prediction::Intra(intra),
            residual: None,
        }
    }

    /// Inter CU with explicit partitions.
    pub fn inter(
        x: u32,
        y: u32,
        log2_size: u8,
        part_mode: PartMode,
        pus: Vec<PredictionUnit>,
        qp: i32,
    ) -> Self {
        Self {
            x,
            y,
            log2_size,
            tq_bypass: false,
            skip: false,
            part_mode,
            qp,
            prediction: Prediction::Inter(pus),
            residual: None,
        }
    }

    /// Attach a residual quadtree.
    pub fn with_residual(mut self, residual: TransformNode) -> Self {
        self.residual = Some(residual);
        self
    }

    /// Check for intra prediction.
    pub fn is_intra(&self) -> bool {
        self.prediction.is_intra()
    }

    /// Check whether any transform block is coded.
    pub fn has_residual(&self) -> bool {
        self.residual.as_ref().is_some_and(|r| r.has_residual())
    }

    /// Check for a 2Nx2N merge CU.
    pub fn is_merge_2nx2n(&self) -> bool {
        match &self.prediction {
            Prediction::Inter(pus) => {
                self.part_mode == PartMode::Part2Nx2N && pus.first().is_some_and(|pu| pu.merge_flag)
            }
            Prediction::Intra(_) => false,
        }
    }
}

/// Decided syntax of one coding tree block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodingTreeBlock {
    /// SAO parameters, coded when SAO is enabled for the slice.
    pub sao: SaoParams,
    /// Leaf CUs in Z order.
    pub cus: Vec<CodingUnit>,
}

impl CodingTreeBlock {
    /// Create a coding tree block from its CUs.
    pub fn new(cus: Vec<CodingUnit>) -> Self {
        Self {
            sao: SaoParams::default(),
            cus,
        }
    }

    /// Set SAO parameters.
    pub fn with_sao(mut self, sao: SaoParams) -> Self {
        self.sao = sao;
        self
    }
}
