//! A BinAST-style binary AST encoder core: TreeRePair grammar inference
//! over a ranked tree, plus the MRU-delta integer codec the binary
//! format uses for string-table and digram references.
//!
//! The pipeline, end to end: [`walker::walk`] lifts a parsed program
//! (the `{"type": ..., ...}` JSON convention) into a [`tree::Arena`];
//! [`grammar::Engine`] infers a straight-line tree grammar over it and
//! prunes it back down to the rules that actually pay for themselves;
//! [`format`] writes the resulting grammar, string table, and AST
//! stream out as the three-section binary file described in the format
//! module's own documentation, and reads it back.
//!
//! `entity` and `codec` are the two pieces of ambient machinery
//! everything else is built on: an arena/handle pattern borrowed from
//! `cranelift-entity` so the engine can rewrite a tree in place without
//! fighting the borrow checker, and the byte-stream/varint/MRU-delta
//! primitives the binary format's sections are framed in.

pub mod codec;
pub mod digram;
pub mod entity;
pub mod error;
pub mod format;
pub mod grammar;
pub mod tree;
pub mod walker;

pub use error::{Error, Result};
