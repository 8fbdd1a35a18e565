//! Ranked-tree node labels.
//!
//! A [`Symbol`] is identified by *reference*, not by structural equality:
//! two `Terminal("if")` symbols built independently are distinct labels
//! unless a caller explicitly shares one `Rc` between them (spec §3). This
//! is what lets the digram index use `Rc` pointer identity as the key
//! component instead of re-hashing label strings on every lookup, and it
//! is also what makes each `Nonterminal`'s formal `Parameter`s exclusively
//! its own: they're fresh `Rc`s minted only when that rule is created.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// What a [`Symbol`] stands for.
#[derive(Debug)]
pub enum SymbolKind {
    /// A user-defined opaque label with a fixed rank, e.g. an AST node
    /// kind or a primitive leaf kind.
    Terminal { label: String },

    /// A grammar production introduced by the engine. Carries its own
    /// ordered formals (always `rank` many, always [`SymbolKind::Parameter`]).
    Nonterminal {
        name: String,
        formals: Vec<SymbolRef>,
    },

    /// A rank-0 placeholder occupying a leaf position in exactly one
    /// production body: the `index`-th formal of `owner`.
    Parameter { owner: String, index: usize },
}

/// A tree-node label: a [`SymbolKind`] plus the fixed number of children
/// (`rank`) a node wearing this label must have.
#[derive(Debug)]
pub struct Symbol {
    pub rank: usize,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn terminal(label: impl Into<String>, rank: usize) -> SymbolRef {
        SymbolRef(Rc::new(Symbol {
            rank,
            kind: SymbolKind::Terminal {
                label: label.into(),
            },
        }))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, SymbolKind::Terminal { .. })
    }

    pub fn is_nonterminal(&self) -> bool {
        matches!(self.kind, SymbolKind::Nonterminal { .. })
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, SymbolKind::Parameter { .. })
    }

    pub fn formals(&self) -> &[SymbolRef] {
        match &self.kind {
            SymbolKind::Nonterminal { formals, .. } => formals,
            _ => &[],
        }
    }

    pub fn display_label(&self) -> &str {
        match &self.kind {
            SymbolKind::Terminal { label } => label,
            SymbolKind::Nonterminal { name, .. } => name,
            SymbolKind::Parameter { owner, .. } => owner,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            SymbolKind::Terminal { label } => write!(f, "{label}/{}", self.rank),
            SymbolKind::Nonterminal { name, .. } => write!(f, "{name}/{}", self.rank),
            SymbolKind::Parameter { owner, index } => write!(f, "{owner}${index}"),
        }
    }
}

/// A shared handle to a [`Symbol`], compared and hashed by pointer
/// identity rather than by the `Symbol`'s contents.
#[derive(Clone)]
pub struct SymbolRef(Rc<Symbol>);

impl SymbolRef {
    pub fn new(symbol: Symbol) -> Self {
        SymbolRef(Rc::new(symbol))
    }

    pub fn rank(&self) -> usize {
        self.0.rank
    }

    pub fn ptr_key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl From<Rc<Symbol>> for SymbolRef {
    fn from(rc: Rc<Symbol>) -> Self {
        SymbolRef(rc)
    }
}

impl std::ops::Deref for SymbolRef {
    type Target = Symbol;

    fn deref(&self) -> &Symbol {
        &self.0
    }
}

impl PartialEq for SymbolRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SymbolRef {}

impl Hash for SymbolRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr_key().hash(state);
    }
}

impl fmt::Debug for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Allocates a fresh [`Nonterminal`] symbol of the given `rank`, along with
/// its `rank` exclusively-owned [`SymbolKind::Parameter`] formals, in
/// canonical formal order.
pub fn new_nonterminal(name: impl Into<String>, rank: usize) -> SymbolRef {
    let name = name.into();
    let formals = (0..rank)
        .map(|index| {
            SymbolRef::new(Symbol {
                rank: 0,
                kind: SymbolKind::Parameter {
                    owner: name.clone(),
                    index,
                },
            })
        })
        .collect();
    SymbolRef::new(Symbol {
        rank,
        kind: SymbolKind::Nonterminal { name, formals },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_labels_are_distinct_symbols() {
        let a1 = Symbol::terminal("A", 1);
        let a2 = Symbol::terminal("A", 1);
        assert_ne!(a1, a2);
        assert_eq!(a1, a1.clone());
    }

    #[test]
    fn nonterminal_formals_are_exclusive() {
        let s = new_nonterminal("S0", 2);
        assert_eq!(s.formals().len(), 2);
        assert!(s.formals()[0].is_parameter());
        assert_ne!(s.formals()[0], s.formals()[1]);
    }
}
