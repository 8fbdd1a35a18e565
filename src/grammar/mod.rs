//! TreeRePair grammar inference: the outer `build()` loop, digram
//! replacement, and the two-phase `optimize()` pruning pass.

mod engine;
mod stats;

pub use engine::Engine;
pub use stats::Stats;
