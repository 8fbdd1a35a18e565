//! AST-stream tag assignment (spec §6): ten reserved tags, followed by one
//! slot per "grammar kind" — the compiled-in AST schema kinds, then the
//! grammar's own Nonterminal rules, in that order.

pub const MEMO_REPLAY: u64 = 0;
pub const MEMO_RECORD: u64 = 1;
pub const TAG_NULL: u64 = 2;
pub const TAG_UNDEFINED: u64 = 3;
pub const TAG_TRUE: u64 = 4;
pub const TAG_FALSE: u64 = 5;
pub const TAG_NUMBER: u64 = 6;
pub const TAG_STRING: u64 = 7;
pub const TAG_LIST: u64 = 8;
pub const FIRST_GRAMMAR_NODE: u64 = 9;

/// The combined, ordered table of "grammar kinds" a non-reserved tag can
/// name: every compiled-in schema kind (in `schema::SCHEMA` order) then
/// every grammar rule (in the same order they appear in the decoded rule
/// list, which the encoder also writes in ascending rule-index order).
pub struct GrammarTagTable<'a> {
    schema_len: usize,
    rule_names: &'a [String],
}

impl<'a> GrammarTagTable<'a> {
    pub fn new(rule_names: &'a [String]) -> Self {
        GrammarTagTable {
            schema_len: crate::walker::SCHEMA.len(),
            rule_names,
        }
    }

    /// The tag for the `i`-th compiled-in schema kind.
    pub fn schema_tag(&self, schema_index: usize) -> u64 {
        FIRST_GRAMMAR_NODE + schema_index as u64
    }

    /// The tag for the rule named `name`, if it is one of `rule_names`.
    pub fn rule_tag(&self, name: &str) -> Option<u64> {
        self.rule_names
            .iter()
            .position(|n| n == name)
            .map(|i| FIRST_GRAMMAR_NODE + self.schema_len as u64 + i as u64)
    }

    /// Resolves a tag back to either a schema-kind index or a rule name.
    pub fn resolve(&self, tag: u64) -> Option<GrammarTagTarget<'a>> {
        if tag < FIRST_GRAMMAR_NODE {
            return None;
        }
        let offset = (tag - FIRST_GRAMMAR_NODE) as usize;
        if offset < self.schema_len {
            Some(GrammarTagTarget::Schema(offset))
        } else {
            self.rule_names
                .get(offset - self.schema_len)
                .map(|n| GrammarTagTarget::Rule(n.as_str()))
        }
    }
}

pub enum GrammarTagTarget<'a> {
    Schema(usize),
    Rule(&'a str),
}
