//! Read-only views over the interview knowledge graph.
//!
//! The extraction collaborator hands over the full node/edge listing every
//! turn as a `GraphSnapshot`. `GraphDepthComputer` derives chain depth from it
//! with bounded breadth-first traversals.

pub mod depth;
pub mod snapshot;

pub use depth::{DepthReport, GraphDepthComputer};
pub use snapshot::{Degree, GraphSnapshot};
