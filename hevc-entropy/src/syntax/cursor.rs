//! Traversal state shared by the coding-tree encoders.
//!
//! [`FrameContext`] is the read-only geometry of a slice. [`NeighbourMaps`]
//! holds the depth and skip of the last CU coded along each 8-sample
//! column of the picture and each 8-sample row of the current CTB, which is
//! all the split and skip context derivations need. [`QpState`] tracks
//! quantization groups and QP prediction.

use crate::config::{EntropyConfig, SliceParams};
use crate::types::CodingUnit;

/// Granularity of the neighbour maps and the QP grid (log2).
pub const MIN_BLOCK_LOG2: u8 = 3;

/// Maximum number of 8x8 rows or columns in a CTB.
const MAX_CTB_BLOCKS: usize = 8;

/// Read-only parameters of the slice being coded.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// Sequence and picture parameters.
    pub config: &'a EntropyConfig,
    /// Slice parameters.
    pub slice: &'a SliceParams,
}

impl<'a> FrameContext<'a> {
    /// Bundle configuration and slice parameters.
    pub fn new(config: &'a EntropyConfig, slice: &'a SliceParams) -> Self {
        Self { config, slice }
    }

    /// Availability of the left and upper CTBs of `ctb_addr`.
    ///
    /// A neighbour is available when it lies inside the picture and belongs
    /// to the same slice.
    pub fn ctb_neighbours(&self, ctb_addr: u32) -> CtbNeighbours {
        let width = self.config.pic_width_in_ctbs();
        let ctb_x = ctb_addr % width;
        let ctb_y = ctb_addr / width;
        let slice_addr = self.slice.slice_address;

        CtbNeighbours {
            ctb_addr,
            ctb_x,
            ctb_y,
            left_available: ctb_x > 0 && ctb_addr - 1 >= slice_addr,
            top_available: ctb_y > 0 && ctb_addr - width >= slice_addr,
        }
    }

    /// Check whether the CTB above and to the right of `ctb_addr` is
    /// available for wavefront synchronization.
    pub fn top_right_available(&self, ctb_addr: u32) -> bool {
        let width = self.config.pic_width_in_ctbs();
        let ctb_x = ctb_addr % width;
        ctb_addr >= width && ctb_x + 1 < width && ctb_addr + 1 - width >= self.slice.slice_address
    }
}

/// Position and neighbour availability of the current CTB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtbNeighbours {
    /// Raster address.
    pub ctb_addr: u32,
    /// Column in CTBs.
    pub ctb_x: u32,
    /// Row in CTBs.
    pub ctb_y: u32,
    /// Left CTB is in the same slice.
    pub left_available: bool,
    /// Upper CTB is in the same slice.
    pub top_available: bool,
}

impl CtbNeighbours {
    /// Picture position of the CTB origin.
    pub fn origin(&self, log2_ctb_size: u8) -> (u32, u32) {
        (self.ctb_x << log2_ctb_size, self.ctb_y << log2_ctb_size)
    }
}

/// Depth and skip flag of a coded CU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighbourCell {
    /// Coding-tree depth.
    pub depth: u8,
    /// `cu_skip_flag`.
    pub skip: bool,
}

/// Last coded CU along each column and row, used for context derivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourMaps {
    /// One cell per 8-sample column of the picture.
    top: Vec<NeighbourCell>,
    /// One cell per 8-sample row of the current CTB row.
    left: [NeighbourCell; MAX_CTB_BLOCKS],
    /// Current CTB.
    ctb: CtbNeighbours,
    log2_ctb_size: u8,
}

impl NeighbourMaps {
    /// Create maps for a picture.
    pub fn new(config: &EntropyConfig) -> Self {
        let columns = (config.pic_width_in_ctbs() << (config.log2_ctb_size - MIN_BLOCK_LOG2)) as usize;
        Self {
            top: vec![NeighbourCell::default(); columns],
            left: [NeighbourCell::default(); MAX_CTB_BLOCKS],
            ctb: CtbNeighbours::default(),
            log2_ctb_size: config.log2_ctb_size,
        }
    }

    /// Enter a new CTB.
    pub fn start_ctb(&mut self, ctb: CtbNeighbours) {
        self.ctb = ctb;
    }

    /// Current CTB.
    pub fn ctb(&self) -> &CtbNeighbours {
        &self.ctb
    }

    fn column(&self, x: u32) -> usize {
        ((self.ctb.ctb_x << self.log2_ctb_size) + x) as usize >> MIN_BLOCK_LOG2
    }

    /// Cell left of CTB-relative `(x, y)`, if available.
    pub fn left(&self, x: u32, y: u32) -> Option<NeighbourCell> {
        // at x == 0 the row entry still holds the right column of the left CTB
        if x > 0 || self.ctb.left_available {
            Some(self.left[(y >> MIN_BLOCK_LOG2) as usize])
        } else {
            None
        }
    }

    /// Cell above CTB-relative `(x, y)`, if available.
    pub fn top(&self, x: u32, y: u32) -> Option<NeighbourCell> {
        if y > 0 || self.ctb.top_available {
            self.top.get(self.column(x)).copied()
        } else {
            None
        }
    }

    /// `split_cu_flag` context increment at `(x, y)` and `depth`.
    pub fn split_ctx_inc(&self, x: u32, y: u32, depth: u8) -> usize {
        let left = self.left(x, y).is_some_and(|c| c.depth > depth) as usize;
        let top = self.top(x, y).is_some_and(|c| c.depth > depth) as usize;
        left + top
    }

    /// `cu_skip_flag` context increment at `(x, y)`.
    pub fn skip_ctx_inc(&self, x: u32, y: u32) -> usize {
        let left = self.left(x, y).is_some_and(|c| c.skip) as usize;
        let top = self.top(x, y).is_some_and(|c| c.skip) as usize;
        left + top
    }

    /// Record a coded CU covering the CTB-relative square at `(x, y)`.
    pub fn record(&mut self, x: u32, y: u32, log2_size: u8, depth: u8, skip: bool) {
        let cell = NeighbourCell { depth, skip };
        let blocks = 1usize << (log2_size - MIN_BLOCK_LOG2);

        let col = self.column(x);
        let end = (col + blocks).min(self.top.len());
        for c in &mut self.top[col..end] {
            *c = cell;
        }

        let row = (y >> MIN_BLOCK_LOG2) as usize;
        for c in &mut self.left[row..(row + blocks).min(MAX_CTB_BLOCKS)] {
            *c = cell;
        }
    }

    /// Record a CU descriptor.
    pub fn record_cu(&mut self, cu: &CodingUnit, log2_ctb_size: u8) {
        self.record(cu.x, cu.y, cu.log2_size, log2_ctb_size - cu.log2_size, cu.skip);
    }
}

/// Quantization group tracking and QP prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QpState {
    slice_qp: i32,
    qp_bd_offset: i32,
    log2_qg_size: u8,
    enabled: bool,
    /// QpY of the last coded CU.
    last_qp: i32,
    /// Predicted QP of the current quantization group.
    pred_qp: i32,
    /// `CuQpDeltaVal` of the current quantization group.
    delta: i32,
    /// `IsCuQpDeltaCoded == 0`.
    delta_pending: bool,
    /// QpY per 8x8 block of the current CTB.
    grid: [[i8; MAX_CTB_BLOCKS]; MAX_CTB_BLOCKS],
}

impl QpState {
    /// Create the QP state of a slice.
    pub fn new(config: &EntropyConfig, slice_qp: i32) -> Self {
        Self {
            slice_qp,
            qp_bd_offset: config.qp_bd_offset_luma(),
            log2_qg_size: config.log2_min_cu_qp_delta_size(),
            enabled: config.cu_qp_delta_enabled,
            last_qp: slice_qp,
            pred_qp: slice_qp,
            delta: 0,
            delta_pending: false,
            grid: [[slice_qp as i8; MAX_CTB_BLOCKS]; MAX_CTB_BLOCKS],
        }
    }

    /// Restart prediction from the slice QP (slice start, wavefront row start).
    pub fn reset_to_slice_qp(&mut self) {
        self.last_qp = self.slice_qp;
        self.pred_qp = self.slice_qp;
        self.delta = 0;
    }

    /// log2 of the quantization group size.
    pub fn log2_qg_size(&self) -> u8 {
        self.log2_qg_size
    }

    /// Check whether a coding-tree node at this size opens a quantization group.
    pub fn opens_group(&self, log2_size: u8) -> bool {
        self.enabled && log2_size >= self.log2_qg_size
    }

    /// Start a quantization group at CTB-relative `(x, y)`.
    pub fn start_quant_group(&mut self, x: u32, y: u32) {
        let prev = self.last_qp;
        let col = (x >> MIN_BLOCK_LOG2) as usize;
        let row = (y >> MIN_BLOCK_LOG2) as usize;

        let left = if col > 0 { self.grid[row][col - 1] as i32 } else { prev };
        let top = if row > 0 { self.grid[row - 1][col] as i32 } else { prev };

        self.pred_qp = (left + top + 1) >> 1;
        self.delta = 0;
        self.delta_pending = true;
    }

    /// Check whether `cu_qp_delta_abs` is still to be coded in this group.
    pub fn delta_pending(&self) -> bool {
        self.enabled && self.delta_pending
    }

    /// Predicted QP of the current group.
    pub fn predicted_qp(&self) -> i32 {
        self.pred_qp
    }

    /// Record that the delta towards `qp` is coded, returning `CuQpDeltaVal`.
    pub fn code_delta(&mut self, qp: i32) -> i32 {
        let modulus = 52 + self.qp_bd_offset;
        let min = -(26 + self.qp_bd_offset / 2);
        let max = 25 + self.qp_bd_offset / 2;

        let mut delta = qp - self.pred_qp;
        if delta > max {
            delta -= modulus;
        } else if delta < min {
            delta += modulus;
        }

        self.delta = delta;
        self.delta_pending = false;
        delta
    }

    /// QpY of a CU in the current group.
    pub fn current_qp(&self) -> i32 {
        if !self.enabled {
            return self.slice_qp;
        }
        let modulus = 52 + self.qp_bd_offset;
        ((self.pred_qp + self.delta + modulus + self.qp_bd_offset) % modulus) - self.qp_bd_offset
    }

    /// Finish a CU at CTB-relative `(x, y)`: store its QpY over its 8x8 blocks.
    pub fn finish_cu(&mut self, x: u32, y: u32, log2_size: u8) {
        let qp = self.current_qp();
        let blocks = 1usize << (log2_size - MIN_BLOCK_LOG2);
        let col = (x >> MIN_BLOCK_LOG2) as usize;
        let row = (y >> MIN_BLOCK_LOG2) as usize;

        for r in row..(row + blocks).min(MAX_CTB_BLOCKS) {
            for c in col..(col + blocks).min(MAX_CTB_BLOCKS) {
                self.grid[r][c] = qp as i8;
            }
        }
        self.last_qp = qp;
    }

    /// QpY of the last coded CU.
    pub fn last_qp(&self) -> i32 {
        self.last_qp
    }
}

/// Mutable state threaded through the coding-tree encoders.
#[derive(Debug, Clone)]
pub struct TraversalState {
    /// Neighbour depth and skip maps.
    pub maps: NeighbourMaps,
    /// QP prediction.
    pub qp: QpState,
}

impl TraversalState {
    /// Create the state of a slice.
    pub fn new(config: &EntropyConfig, slice: &SliceParams) -> Self {
        Self {
            maps: NeighbourMaps::new(config),
            qp: QpState::new(config, slice.slice_qp),
        }
    }
}
