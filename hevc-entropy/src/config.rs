//! Sequence, picture and slice parameters used by the entropy coder.

use crate::error::{EntropyError, Result};
use crate::types::SliceType;

/// Highest luma QP for 8-bit video.
pub const MAX_QP: i32 = 51;

/// Sequence and picture parameters consumed by the syntax encoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntropyConfig {
    /// Picture width in luma samples.
    pub width: u32,
    /// Picture height in luma samples.
    pub height: u32,
    /// log2 of the CTB size (4..=6).
    pub log2_ctb_size: u8,
    /// log2 of the minimum CU size.
    pub log2_min_cb_size: u8,
    /// log2 of the minimum transform size.
    pub log2_min_tb_size: u8,
    /// log2 of the maximum transform size.
    pub log2_max_tb_size: u8,
    /// `max_transform_hierarchy_depth_intra`.
    pub max_transform_hierarchy_depth_intra: u8,
    /// `max_transform_hierarchy_depth_inter`.
    pub max_transform_hierarchy_depth_inter: u8,
    /// Asymmetric motion partitions.
    pub amp_enabled: bool,
    /// `transquant_bypass_enabled_flag`.
    pub transquant_bypass_enabled: bool,
    /// `transform_skip_enabled_flag`.
    pub transform_skip_enabled: bool,
    /// `sign_data_hiding_enabled_flag`.
    pub sign_data_hiding_enabled: bool,
    /// `cu_qp_delta_enabled_flag`.
    pub cu_qp_delta_enabled: bool,
    /// `diff_cu_qp_delta_depth`.
    pub diff_cu_qp_delta_depth: u8,
    /// `entropy_coding_sync_enabled_flag` (wavefront).
    pub entropy_coding_sync_enabled: bool,
    /// `sample_adaptive_offset_enabled_flag`.
    pub sao_enabled: bool,
    /// Luma bit depth.
    pub bit_depth_luma: u8,
    /// Chroma bit depth.
    pub bit_depth_chroma: u8,
}

impl EntropyConfig {
    /// Create a configuration with 64x64 CTBs and common encoder defaults.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            log2_ctb_size: 6,
            log2_min_cb_size: 3,
            log2_min_tb_size: 2,
            log2_max_tb_size: 5,
            max_transform_hierarchy_depth_intra: 1,
            max_transform_hierarchy_depth_inter: 1,
            amp_enabled: false,
            transquant_bypass_enabled: false,
            transform_skip_enabled: false,
            sign_data_hiding_enabled: false,
            cu_qp_delta_enabled: false,
            diff_cu_qp_delta_depth: 0,
            entropy_coding_sync_enabled: false,
            sao_enabled: false,
            bit_depth_luma: 8,
            bit_depth_chroma: 8,
        }
    }

    /// Set CTB and minimum CU sizes (log2).
    pub fn with_block_sizes(mut self, log2_ctb_size: u8, log2_min_cb_size: u8) -> Self {
        self.log2_ctb_size = log2_ctb_size;
        self.log2_min_cb_size = log2_min_cb_size;
        self
    }

    /// Set transform size limits (log2).
    pub fn with_transform_sizes(mut self, log2_min_tb_size: u8, log2_max_tb_size: u8) -> Self {
        self.log2_min_tb_size = log2_min_tb_size;
        self.log2_max_tb_size = log2_max_tb_size;
        self
    }

    /// Set maximum transform hierarchy depths.
    pub fn with_transform_depths(mut self, intra: u8, inter: u8) -> Self {
        self.max_transform_hierarchy_depth_intra = intra;
        self.max_transform_hierarchy_depth_inter = inter;
        self
    }

    /// Enable asymmetric motion partitions.
    pub fn with_amp(mut self, enabled: bool) -> Self {
        self.amp_enabled = enabled;
        self
    }

    /// Enable `cu_transquant_bypass_flag` signalling.
    pub fn with_transquant_bypass(mut self, enabled: bool) -> Self {
        self.transquant_bypass_enabled = enabled;
        self
    }

    /// Enable transform skip for 4x4 blocks.
    pub fn with_transform_skip(mut self, enabled: bool) -> Self {
        self.transform_skip_enabled = enabled;
        self
    }

    /// Enable sign data hiding.
    pub fn with_sign_data_hiding(mut self, enabled: bool) -> Self {
        self.sign_data_hiding_enabled = enabled;
        self
    }

    /// Enable CU-level QP deltas with the given quantization group depth.
    pub fn with_cu_qp_delta(mut self, diff_cu_qp_delta_depth: u8) -> Self {
        self.cu_qp_delta_enabled = true;
        self.diff_cu_qp_delta_depth = diff_cu_qp_delta_depth;
        self
    }

    /// Enable wavefront entropy synchronization.
    pub fn with_wavefront(mut self, enabled: bool) -> Self {
        self.entropy_coding_sync_enabled = enabled;
        self
    }

    /// Enable SAO.
    pub fn with_sao(mut self, enabled: bool) -> Self {
        self.sao_enabled = enabled;
        self
    }

    /// Set luma and chroma bit depths.
    pub fn with_bit_depth(mut self, luma: u8, chroma: u8) -> Self {
        self.bit_depth_luma = luma;
        self.bit_depth_chroma = chroma;
        self
    }

    /// Check the parameter ranges the entropy coder relies on.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EntropyError::config("Invalid dimensions"));
        }
        if !(4..=6).contains(&self.log2_ctb_size) {
            return Err(EntropyError::config(format!(
                "log2_ctb_size {} outside 4..=6",
                self.log2_ctb_size
            )));
        }
        if self.log2_min_cb_size < 3 || self.log2_min_cb_size > self.log2_ctb_size {
            return Err(EntropyError::config(format!(
                "log2_min_cb_size {} outside 3..={}",
                self.log2_min_cb_size, self.log2_ctb_size
            )));
        }
        let min_cb = 1u32 << self.log2_min_cb_size;
        if self.width % min_cb != 0 || self.height % min_cb != 0 {
            return Err(EntropyError::config(format!(
                "{}x{} is not a multiple of the minimum CU size {}",
                self.width, self.height, min_cb
            )));
        }
        if self.log2_min_tb_size < 2 || self.log2_min_tb_size >= self.log2_min_cb_size {
            return Err(EntropyError::config("log2_min_tb_size must be >= 2 and below the minimum CU size"));
        }
        if self.log2_max_tb_size < self.log2_min_tb_size
            || self.log2_max_tb_size > self.log2_ctb_size.min(5)
        {
            return Err(EntropyError::config(format!(
                "log2_max_tb_size {} outside {}..={}",
                self.log2_max_tb_size,
                self.log2_min_tb_size,
                self.log2_ctb_size.min(5)
            )));
        }
        let max_depth = self.log2_ctb_size - self.log2_min_tb_size;
        if self.max_transform_hierarchy_depth_intra > max_depth
            || self.max_transform_hierarchy_depth_inter > max_depth
        {
            return Err(EntropyError::config("Transform hierarchy depth too large"));
        }
        if self.diff_cu_qp_delta_depth > self.log2_ctb_size - self.log2_min_cb_size {
            return Err(EntropyError::config("diff_cu_qp_delta_depth too large"));
        }
        if !(8..=12).contains(&self.bit_depth_luma) || !(8..=12).contains(&self.bit_depth_chroma) {
            return Err(EntropyError::config("Bit depth outside 8..=12"));
        }
        Ok(())
    }

    /// CTB size in luma samples.
    pub fn ctb_size(&self) -> u32 {
        1 << self.log2_ctb_size
    }

    /// Picture width in CTBs.
    pub fn pic_width_in_ctbs(&self) -> u32 {
        self.width.div_ceil(self.ctb_size())
    }

    /// Picture height in CTBs.
    pub fn pic_height_in_ctbs(&self) -> u32 {
        self.height.div_ceil(self.ctb_size())
    }

    /// Number of CTBs in the picture.
    pub fn pic_size_in_ctbs(&self) -> u32 {
        self.pic_width_in_ctbs() * self.pic_height_in_ctbs()
    }

    /// log2 of the quantization group size.
    pub fn log2_min_cu_qp_delta_size(&self) -> u8 {
        self.log2_ctb_size - self.diff_cu_qp_delta_depth
    }

    /// `QpBdOffsetY`.
    pub fn qp_bd_offset_luma(&self) -> i32 {
        6 * (self.bit_depth_luma as i32 - 8)
    }
}

/// Slice segment size control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentLimit {
    /// One segment for the whole slice.
    #[default]
    Unlimited,
    /// Close a segment after this many CTBs.
    Ctbs(u32),
    /// Close a segment before it exceeds this many bytes, header included.
    Bytes(usize),
}

/// Per-slice parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceParams {
    /// Slice type.
    pub slice_type: SliceType,
    /// `SliceQpY`.
    pub slice_qp: i32,
    /// `cabac_init_flag`.
    pub cabac_init_flag: bool,
    /// `slice_sao_luma_flag`.
    pub sao_luma: bool,
    /// `slice_sao_chroma_flag`.
    pub sao_chroma: bool,
    /// `MaxNumMergeCand` (1..=5).
    pub max_num_merge_cand: u8,
    /// `num_ref_idx_l0_active` and `num_ref_idx_l1_active`.
    pub num_ref_idx_active: [u8; 2],
    /// `mvd_l1_zero_flag`.
    pub mvd_l1_zero_flag: bool,
    /// Raster address of the first CTB of the slice.
    pub slice_address: u32,
    /// Raster address where the first segment starts.
    pub segment_address: u32,
    /// Segment size control.
    pub segment_limit: SegmentLimit,
}

impl SliceParams {
    /// Create slice parameters for a slice starting at CTB 0.
    pub fn new(slice_type: SliceType, slice_qp: i32) -> Self {
        Self {
            slice_type,
            slice_qp,
            cabac_init_flag: false,
            sao_luma: false,
            sao_chroma: false,
            max_num_merge_cand: 5,
            num_ref_idx_active: [1, 1],
            mvd_l1_zero_flag: false,
            slice_address: 0,
            segment_address: 0,
            segment_limit: SegmentLimit::Unlimited,
        }
    }

    /// Set `cabac_init_flag`.
    pub fn with_cabac_init_flag(mut self, flag: bool) -> Self {
        self.cabac_init_flag = flag;
        self
    }

    /// Set SAO slice flags.
    pub fn with_sao(mut self, luma: bool, chroma: bool) -> Self {
        self.sao_luma = luma;
        self.sao_chroma = chroma;
        self
    }

    /// Set the merge candidate count.
    pub fn with_max_num_merge_cand(mut self, count: u8) -> Self {
        self.max_num_merge_cand = count;
        self
    }

    /// Set active reference counts for both lists.
    pub fn with_num_ref_idx_active(mut self, l0: u8, l1: u8) -> Self {
        self.num_ref_idx_active = [l0, l1];
        self
    }

    /// Set `mvd_l1_zero_flag`.
    pub fn with_mvd_l1_zero(mut self, flag: bool) -> Self {
        self.mvd_l1_zero_flag = flag;
        self
    }

    /// Start the slice (and its first segment) at a CTB address.
    pub fn with_address(mut self, slice_address: u32) -> Self {
        self.slice_address = slice_address;
        self.segment_address = slice_address;
        self
    }

    /// Set segment size control.
    pub fn with_segment_limit(mut self, limit: SegmentLimit) -> Self {
        self.segment_limit = limit;
        self
    }

    /// Slice QP clipped to the valid range.
    pub fn clipped_qp(&self) -> i32 {
        self.slice_qp.clamp(0, MAX_QP)
    }

    /// Index into the initialization tables.
    pub fn cabac_init_idc(&self) -> usize {
        cabac_init_idc(self.slice_type, self.cabac_init_flag)
    }

    /// Check the slice against the sequence configuration.
    pub fn validate(&self, config: &EntropyConfig) -> Result<()> {
        let qp_min = -config.qp_bd_offset_luma();
        if self.slice_qp < qp_min || self.slice_qp > MAX_QP {
            return Err(EntropyError::config(format!(
                "slice_qp {} outside {}..={}",
                self.slice_qp, qp_min, MAX_QP
            )));
        }
        if !(1..=5).contains(&self.max_num_merge_cand) {
            return Err(EntropyError::config(format!(
                "max_num_merge_cand {} outside 1..=5",
                self.max_num_merge_cand
            )));
        }
        if self.num_ref_idx_active.iter().any(|&n| !(1..=15).contains(&n)) {
            return Err(EntropyError::config("num_ref_idx_active outside 1..=15"));
        }
        let total = config.pic_size_in_ctbs();
        if self.slice_address >= total || self.segment_address >= total {
            return Err(EntropyError::config(format!(
                "Slice address {} beyond {} CTBs",
                self.segment_address, total
            )));
        }
        if self.segment_address < self.slice_address {
            return Err(EntropyError::config("Segment starts before its slice"));
        }
        match self.segment_limit {
            SegmentLimit::Ctbs(0) => Err(EntropyError::config("Segment CTB limit must be non-zero")),
            SegmentLimit::Bytes(0) => Err(EntropyError::config("Segment byte limit must be non-zero")),
            _ => Ok(()),
        }
    }
}

/// Initialization table index for a slice type.
pub fn cabac_init_idc(slice_type: SliceType, cabac_init_flag: bool) -> usize {
    match slice_type {
        SliceType::I => 0,
        SliceType::P => {
            if cabac_init_flag {
                2
            } else {
                1
            }
        }
        SliceType::B => {
            if cabac_init_flag {
                1
            } else {
                2
            }
        }
    }
}
