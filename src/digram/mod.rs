//! Digram interning, per-digram occurrence tracking, and the frequency
//! max-heap TreeRePair's outer loop consults to find the next rewrite.

mod heap;
mod index;

pub use index::{Digram, DigramIndex};

use crate::entity::entity_impl;

/// A handle to an interned (parent label, child index, child label)
/// triple. Two `DigramId`s compare equal iff the underlying triples were
/// interned from pointer-identical symbols at the same index.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DigramId(u32);
entity_impl!(DigramId, "d");
