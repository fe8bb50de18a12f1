//! Classification of observed accesses against declared patterns.

pub mod bookkeeping;
pub mod engine;

pub use engine::{Classification, ClassificationOutcome, Classifier, CrossProjectAccess, Verdict};
