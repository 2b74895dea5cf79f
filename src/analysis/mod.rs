//! Report scoring helpers shared by every compute path.

pub mod confidence;
pub mod lineage;

pub use confidence::{ConfidenceCalculator, DegradationFlags};
pub use lineage::{build_lineage, merge_lineage};
