//! KubeBlocks CRD Definitions
//!
//! Typed views of the KubeBlocks custom resources the lifecycle tool reads
//! and patches, plus the label and annotation keys the platform stamps on
//! the objects it owns.

pub mod addon;
pub mod labels;

pub use addon::*;
