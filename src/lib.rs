//!
//! Hierarchical sparse grid index engine.
//!
//! Grid points are multi-dimensional dyadic coordinates ([`grid_point::GridPoint`])
//! kept in a hash-keyed [`storage::GridStorage`]. The
//! [`algorithms::refinement::AdaptiveRefiner`] grows a grid step by step,
//! inserting the admissible candidates with the largest error indicator.
//!
pub mod algorithms;
pub mod candidate_storage;
pub mod errors;
pub mod grid_point;
pub mod refinement;
pub mod serialization;
pub mod storage;
