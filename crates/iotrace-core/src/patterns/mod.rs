//! Declared pattern tokens, their resolution, and glob compilation.

pub mod glob;
pub mod resolve;
pub mod token;

pub use glob::Pattern;
pub use resolve::{PatternCache, PatternResolver, ResolvedPatternSet, TaskPatterns};
pub use token::{NamedGroupTable, RawToken};
