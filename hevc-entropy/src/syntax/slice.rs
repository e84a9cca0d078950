//! `slice_segment_data`: the CTB loop with wavefront synchronization and
//! slice segment size control.
//!
//! A [`SliceDataEncoder`] owns the arithmetic coder of one slice. Each call
//! to [`SliceDataEncoder::encode_segment`] produces one slice segment; the
//! first is an independent segment, later ones continue with the context
//! state left by the previous segment (dependent slice segments).

use crate::bitstream::Bitstream;
use crate::cabac::{BinEncoder, BitEmittingCoder, CoderCheckpoint};
use crate::config::{EntropyConfig, SegmentLimit, SliceParams};
use crate::context::ContextTable;
use crate::error::{EntropyError, Result};
use crate::syntax::cursor::{FrameContext, TraversalState};
use crate::syntax::quadtree::encode_coding_quadtree;
use crate::syntax::sao::encode_sao;
use crate::types::CodingTreeBlock;

/// Outcome of the last CTB attempted in a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeculativeEncode {
    /// Every attempted CTB is part of the segment.
    #[default]
    Committed,
    /// The CTB at `ctb_addr` did not fit and was rewound; it starts the
    /// next segment.
    RolledBack {
        /// Address of the rewound CTB.
        ctb_addr: u32,
    },
}

/// One encoded slice segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSegment {
    /// Header prefix followed by the slice data, emulation prevention applied.
    pub data: Vec<u8>,
    /// Start of every wavefront substream after the first, relative to the
    /// start of the slice data.
    pub entry_points: Vec<usize>,
    /// Address of the first CTB in the segment.
    pub first_ctb_addr: u32,
    /// Number of CTBs in the segment.
    pub ctb_count: u32,
    /// Address where the next segment starts.
    pub next_ctb_addr: u32,
    /// The segment ends the slice.
    pub end_of_slice: bool,
    /// Whether a CTB was rewound to respect the byte limit.
    pub outcome: SpeculativeEncode,
}

/// State captured after a committed CTB, before its end-of-segment bin.
#[derive(Debug, Clone)]
struct CtbCheckpoint {
    coder: CoderCheckpoint,
    state: TraversalState,
    wpp_backup: Option<ContextTable>,
    entry_points: usize,
    ctb_count: u32,
}

/// Encoder of the slice data of one slice.
#[derive(Debug, Clone)]
pub struct SliceDataEncoder {
    config: EntropyConfig,
    slice: SliceParams,
    coder: BitEmittingCoder,
    state: TraversalState,
    /// Contexts stored after the second CTB of the last row.
    wpp_backup: Option<ContextTable>,
    next_ctb_addr: u32,
    started: bool,
    capacity: usize,
}

impl SliceDataEncoder {
    /// Create an encoder for one slice. `capacity` bounds every segment,
    /// header included.
    pub fn new(config: EntropyConfig, slice: SliceParams, capacity: usize) -> Result<Self> {
        config.validate()?;
        slice.validate(&config)?;

        let state = TraversalState::new(&config, &slice);
        Ok(Self {
            coder: BitEmittingCoder::new(Bitstream::new(capacity)),
            state,
            wpp_backup: None,
            next_ctb_addr: slice.segment_address,
            started: false,
            capacity,
            config,
            slice,
        })
    }

    /// Address of the next CTB to encode.
    pub fn next_ctb_addr(&self) -> u32 {
        self.next_ctb_addr
    }

    /// Current context table.
    pub fn contexts(&self) -> &ContextTable {
        self.coder.contexts()
    }

    /// Encode one slice segment.
    ///
    /// `ctbs` holds the remaining CTBs of the slice starting at
    /// [`next_ctb_addr`](Self::next_ctb_addr); the slice ends with its last
    /// entry or at the end of the picture. `header` is copied verbatim in
    /// front of the slice data.
    pub fn encode_segment(&mut self, ctbs: &[CodingTreeBlock], header: &[u8]) -> Result<SliceSegment> {
        let pic_size = self.config.pic_size_in_ctbs();
        let first_ctb_addr = self.next_ctb_addr;
        if first_ctb_addr >= pic_size {
            return Err(EntropyError::InvalidState("Slice already complete".into()));
        }
        if ctbs.is_empty() {
            return Err(EntropyError::syntax("Slice segment without CTBs"));
        }
        if ctbs.len() as u64 > (pic_size - first_ctb_addr) as u64 {
            return Err(EntropyError::syntax(format!(
                "{} CTBs given but only {} remain in the picture",
                ctbs.len(),
                pic_size - first_ctb_addr
            )));
        }

        self.coder.replace_bitstream(Bitstream::with_prefix(header, self.capacity)?);
        let data_start = header.len();
        if self.started {
            self.coder.reset();
        } else {
            self.coder.init(self.slice.cabac_init_idc(), self.slice.clipped_qp());
            self.state.qp.reset_to_slice_qp();
            self.started = true;
        }
        tracing::debug!(
            first_ctb_addr,
            dependent = first_ctb_addr != self.slice.segment_address,
            "slice segment start"
        );

        let mut entry_points = Vec::new();
        let mut ctb_count = 0u32;
        let mut outcome = SpeculativeEncode::Committed;
        let mut end_of_slice = false;
        let mut last_commit: Option<CtbCheckpoint> = None;

        for (idx, ctb) in ctbs.iter().enumerate() {
            let ctb_addr = first_ctb_addr + idx as u32;
            self.encode_ctb(ctb_addr, ctb)?;

            let is_last = idx + 1 == ctbs.len();

            if let SegmentLimit::Bytes(limit) = self.slice.segment_limit {
                if !self.fits_when_closed(limit)? {
                    match last_commit.take() {
                        Some(commit) => {
                            self.restore(&commit);
                            entry_points.truncate(commit.entry_points);
                            ctb_count = commit.ctb_count;
                            outcome = SpeculativeEncode::RolledBack { ctb_addr };
                            tracing::debug!(ctb_addr, ctb_count, "CTB rewound, closing segment");
                        }
                        None => {
                            tracing::warn!(
                                ctb_addr,
                                limit,
                                "single CTB exceeds the slice segment byte limit"
                            );
                            ctb_count += 1;
                            end_of_slice = is_last;
                        }
                    }
                    self.coder.encode_terminate(1)?;
                    break;
                }
                last_commit = Some(CtbCheckpoint {
                    coder: self.coder.checkpoint(),
                    state: self.state.clone(),
                    wpp_backup: self.wpp_backup,
                    entry_points: entry_points.len(),
                    ctb_count: ctb_count + 1,
                });
            }

            ctb_count += 1;
            let limit_reached = matches!(self.slice.segment_limit, SegmentLimit::Ctbs(n) if ctb_count >= n);
            if is_last || limit_reached {
                end_of_slice = is_last;
                self.coder.encode_terminate(1)?;
                break;
            }

            self.coder.encode_terminate(0)?;
            let width = self.config.pic_width_in_ctbs();
            if self.config.entropy_coding_sync_enabled && ctb_addr % width == width - 1 {
                // end_of_subset_one_bit, then byte alignment
                self.coder.encode_terminate(1)?;
                let offset = self.coder.bitstream().offset() - data_start;
                entry_points.push(offset);
                self.coder.reset();
                tracing::debug!(ctb_addr, offset, "wavefront substream end");
            }
        }

        self.next_ctb_addr = first_ctb_addr + ctb_count;
        let data = self
            .coder
            .replace_bitstream(Bitstream::new(0))
            .into_bytes();
        tracing::debug!(
            first_ctb_addr,
            ctb_count,
            bytes = data.len(),
            end_of_slice,
            "slice segment closed"
        );

        Ok(SliceSegment {
            data,
            entry_points,
            first_ctb_addr,
            ctb_count,
            next_ctb_addr: self.next_ctb_addr,
            end_of_slice,
            outcome,
        })
    }

    /// Encode SAO and the coding quadtree of one CTB, with the wavefront
    /// synchronization around it.
    fn encode_ctb(&mut self, ctb_addr: u32, ctb: &CodingTreeBlock) -> Result<()> {
        let frame = FrameContext::new(&self.config, &self.slice);
        let neighbours = frame.ctb_neighbours(ctb_addr);

        if self.config.entropy_coding_sync_enabled
            && neighbours.ctb_x == 0
            && ctb_addr > self.slice.slice_address
        {
            let contexts = match self.wpp_backup {
                Some(backup) if frame.top_right_available(ctb_addr) => backup,
                _ => ContextTable::initial(self.slice.cabac_init_idc(), self.slice.clipped_qp()),
            };
            *self.coder.contexts_mut() = contexts;
            self.state.qp.reset_to_slice_qp();
        }

        self.state.maps.start_ctb(neighbours);
        if self.config.sao_enabled && (self.slice.sao_luma || self.slice.sao_chroma) {
            encode_sao(&mut self.coder, &frame, &neighbours, &ctb.sao)?;
        }
        encode_coding_quadtree(&mut self.coder, &frame, &mut self.state, &ctb.cus)?;

        if self.config.entropy_coding_sync_enabled && neighbours.ctb_x == 1 {
            self.wpp_backup = Some(*self.coder.contexts());
        }
        tracing::trace!(ctb_addr, offset = self.coder.bitstream().offset(), "CTB coded");
        Ok(())
    }

    /// Check whether closing the segment now keeps it, header included,
    /// within `limit` bytes. The coder is left untouched.
    fn fits_when_closed(&mut self, limit: usize) -> Result<bool> {
        let checkpoint = self.coder.checkpoint();
        let trial = self.coder.encode_terminate(1);
        let size = self.coder.bitstream().offset();
        self.coder.rollback(&checkpoint);

        match trial {
            Ok(()) => Ok(size <= limit),
            Err(err) if err.is_buffer_overflow() => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn restore(&mut self, commit: &CtbCheckpoint) {
        self.coder.rollback(&commit.coder);
        self.state = commit.state.clone();
        self.wpp_backup = commit.wpp_backup;
    }
}

/// Encode a whole slice, splitting it into segments as `params` asks.
///
/// Every segment gets a copy of `header`.
pub fn encode_slice_data(
    config: &EntropyConfig,
    params: &SliceParams,
    ctbs: &[CodingTreeBlock],
    header: &[u8],
    capacity: usize,
) -> Result<Vec<SliceSegment>> {
    let mut encoder = SliceDataEncoder::new(config.clone(), params.clone(), capacity)?;
    let mut segments = Vec::new();
    let mut rest = ctbs;

    loop {
        let segment = encoder.encode_segment(rest, header)?;
        rest = &rest[segment.ctb_count as usize..];
        let done = segment.end_of_slice;
        segments.push(segment);
        if done {
            return Ok(segments);
        }
    }
}
