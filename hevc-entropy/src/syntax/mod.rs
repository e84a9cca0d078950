//! Syntax element encoders.
//!
//! Every encoder is generic over [`BinEncoder`](crate::cabac::BinEncoder),
//! so the same code writes slice data and prices RDO candidates.

pub mod cu_pu;
pub mod cursor;
pub mod quadtree;
pub mod residual;
pub mod sao;
pub mod slice;
pub mod transform;

pub use cu_pu::{encode_coding_unit, encode_merge_idx, encode_mvd, CuCost};
pub use cursor::{CtbNeighbours, FrameContext, NeighbourMaps, QpState, TraversalState};
pub use quadtree::encode_coding_quadtree;
pub use residual::{encode_residual, ResidualOptions};
pub use sao::encode_sao;
pub use slice::{encode_slice_data, SliceDataEncoder, SliceSegment, SpeculativeEncode};
pub use transform::{encode_cu_qp_delta, encode_transform_tree, zero_transform_tree};
