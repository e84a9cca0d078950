//! HEVC/H.265 CABAC entropy-coding backend.
//!
//! This crate turns decided coding-tree syntax (CUs, PUs, TUs, residual
//! coefficients and SAO parameters) into a conformant slice-data bitstream,
//! and estimates the bit cost of the same syntax without emitting bytes so a
//! mode-decision search can compare candidates.
//!
//! # Features
//!
//! - **Arithmetic coder**: bit-exact CABAC with carry propagation and
//!   emulation prevention into a bounded buffer
//! - **Dual-mode engine**: one [`BinEncoder`] contract implemented by a
//!   byte-emitting coder, a bit-counting coder and a bin recorder
//! - **Syntax encoders**: coding quadtree, CU/PU/TU syntax, residual coding
//!   with sign data hiding, and SAO
//! - **Slice loop**: wavefront context synchronization with entry points,
//!   and slice-segment size control with CTB rollback
//! - **RDO support**: per-candidate CU/TU/SAO bit costs and the
//!   sign-data-hiding level adjustment
//!
//! # Example
//!
//! ```rust,ignore
//! use hevc_entropy::{encode_slice_data, CodingTreeBlock, CodingUnit, EntropyConfig, SliceParams, SliceType};
//!
//! let config = EntropyConfig::new(1920, 1080).with_wavefront(true);
//! let slice = SliceParams::new(SliceType::P, 32);
//!
//! let ctbs: Vec<CodingTreeBlock> = (0..config.pic_size_in_ctbs())
//!     .map(|_| CodingTreeBlock::new(vec![CodingUnit::skip(0, 0, 6, 0, 32)]))
//!     .collect();
//!
//! let segments = encode_slice_data(&config, &slice, &ctbs, &[], 1 << 20)?;
//! for segment in &segments {
//!     println!("{} bytes, {} entry points", segment.data.len(), segment.entry_points.len());
//! }
//! ```

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod binarization;
pub mod bitstream;
pub mod cabac;
pub mod config;
pub mod context;
pub mod error;
pub mod rdo;
pub mod scan;
pub mod sdh;
pub mod syntax;
pub mod tables;
pub mod types;

// Re-export error types
pub use error::{EntropyError, Result};

// Re-export the engine
pub use binarization::Binarization;
pub use bitstream::{remove_emulation_prevention, Bitstream, BitstreamMark};
pub use cabac::{
    BinEncoder, BinKind, BinRecorder, BitCountingCoder, BitEmittingCoder, CoderCheckpoint,
    RecordedBin,
};
pub use context::{ctx, ContextTable};

// Re-export configuration and syntax descriptors
pub use config::{EntropyConfig, SegmentLimit, SliceParams};
pub use types::{
    CodingTreeBlock, CodingUnit, Component, InterPredIdc, IntraLumaMode, IntraPrediction, Mvd,
    PartMode, Prediction, PredictionUnit, ResidualBlock, SaoComponent, SaoParams, SaoType,
    ScanOrder, SliceType, TransformNode, TransformUnit,
};

// Re-export slice-level entry points
pub use rdo::{CuBitCost, RdoEntropyContext};
pub use sdh::{hide_signs, InverseQuantizer};
pub use syntax::{encode_slice_data, SliceDataEncoder, SliceSegment, SpeculativeEncode};
