//! Event Normalizer: raw tracer output to canonical access sets.

pub mod access;
pub mod filter;
pub mod fs_usage;
pub mod lineage;
pub mod normalize;
pub mod read;
pub mod strace;
pub mod tracepoint;

pub use access::{AccessSet, Operation, TraceEvent};
pub use lineage::ProcessTree;
pub use normalize::{Backend, TraceNormalizer};
