//! The mutation table: one grammar production per mutation index.
//!
//! Productions come from a rules file. Each non-comment, non-empty line is
//! one quoted production; `[...]` segments become expandable slots (their
//! contents render as default text until the slot is expanded away), every
//! other segment becomes frozen literal text. `\[` and `\]` escape literal
//! brackets inside fixed text.
//!
//! From the engine's point of view the table is a black-box dispatch:
//! `mutate(root, leaf, i)` either expands `leaf` by production `i` or
//! returns the root unchanged.

use crate::node::{replace, Node, NodeRef};
use std::rc::Rc;
use thiserror::Error;

/// Errors from parsing a rules file.
#[derive(Error, Debug)]
pub enum RulesError {
    #[error("line {line}: production is not quoted")]
    Unquoted { line: usize },

    #[error("line {line}: unterminated slot")]
    UnterminatedSlot { line: usize },

    #[error("rules file contains no productions")]
    Empty,
}

/// One piece of a production: either frozen text or an expandable slot.
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    fixed: bool,
}

/// The table of grammar productions, indexed by mutation number.
#[derive(Debug, Clone)]
pub struct MutationTable {
    productions: Vec<Vec<Piece>>,
}

impl MutationTable {
    /// Parse a rules file.
    pub fn parse(src: &str) -> Result<Self, RulesError> {
        let mut productions = Vec::new();

        for (i, raw) in src.lines().enumerate() {
            let line = i + 1;
            if raw.is_empty() || raw.starts_with('#') {
                continue;
            }

            let body = raw
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .ok_or(RulesError::Unquoted { line })?;

            productions.push(split_pieces(body, line)?);
        }

        if productions.is_empty() {
            return Err(RulesError::Empty);
        }

        Ok(MutationTable { productions })
    }

    /// The built-in C++ production set.
    pub fn cxx() -> Self {
        Self::parse(CXX_RULES).expect("built-in rules are well-formed")
    }

    /// Number of mutations in the table.
    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    /// Expand `leaf` by production `mutation`.
    ///
    /// Returns a new root with the leaf replaced by the production's
    /// pieces, or the original root unchanged when the mutation index is
    /// out of range or `leaf` does not occur under `root` — the caller
    /// treats an identity-equal result as a no-op cycle.
    pub fn mutate(&self, root: &NodeRef, leaf: &NodeRef, mutation: usize) -> NodeRef {
        let Some(pieces) = self.productions.get(mutation) else {
            return Rc::clone(root);
        };

        let children = pieces
            .iter()
            .map(|p| {
                if p.fixed {
                    Node::fixed(p.text.clone())
                } else {
                    Node::slot(p.text.clone())
                }
            })
            .collect();

        replace(root, leaf, &Node::seq(children))
    }
}

fn split_pieces(body: &str, line: usize) -> Result<Vec<Piece>, RulesError> {
    let mut pieces = Vec::new();
    let mut cur = String::new();
    let mut in_slot = false;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('[') | Some(']')) => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            '[' if !in_slot => {
                if !cur.is_empty() {
                    pieces.push(Piece { text: std::mem::take(&mut cur), fixed: true });
                }
                in_slot = true;
            }
            ']' if in_slot => {
                pieces.push(Piece { text: std::mem::take(&mut cur), fixed: false });
                in_slot = false;
            }
            _ => cur.push(c),
        }
    }

    if in_slot {
        return Err(RulesError::UnterminatedSlot { line });
    }
    if !cur.is_empty() {
        pieces.push(Piece { text: cur, fixed: true });
    }

    Ok(pieces)
}

/// Default productions for fuzzing a C++ front end. Slots carry default
/// text so every intermediate tree stays close to compilable; duplicate
/// identifiers and type mismatches are tolerated — rejected programs cost
/// one execution and nothing else.
const CXX_RULES: &str = r#"# icehunt built-in C++ productions
# declarations
"int [x] = [0];[]"
"static const long [x] = [1];[]"
"volatile char [x] = [0];[]"
"int [a]\[[4]\] = { [0] };[]"
"int *[p] = nullptr;[]"
"typedef [int] [t];[]"
"using [t] = [int];[]"
# aggregates
"struct [S] { [int] [m]; };[]"
"struct [S] : [S] { [int] [m]; };[]"
"class [C] { public: [int] [m]; void [f]() { [] } };[]"
"union [U] { [int] [m]; [char] [n]; };[]"
"enum [E] { [e] = [0], [g] };[]"
"namespace [ns] { [] }[]"
# functions
"[int] [f]([int] [p]) { [] return [p]; }[]"
"[int] [f]() { [] return [0]; }[]"
"template<typename [T]> [T] [f]([T] [v]) { [] return [v]; }[]"
"template<int [N]> int [f]() { return [N]; }[]"
"inline [int] [f]([int] [p]) noexcept { return [p]; }[]"
"auto [f]([int] [p]) -> [int] { return [p]; }[]"
"constexpr [int] [f]([int] [p]) { return [p]; }[]"
# statements
"if ([0]) { [] } else { [] }"
"for (int [i] = [0]; [i] < [8]; ++[i]) { [] }"
"while ([0]) { [] }"
"do { [] } while ([0]);"
"switch ([0]) { case [1]: [] break; default: [] break; }"
"{ [] }"
"return [0];"
"[x] = [0];"
";"
# expressions
"([0] + [1])"
"([1] * [1])"
"([0] ? [1] : [2])"
"static_cast<[int]>([0])"
"(([int])[0])"
"sizeof([int])"
"\[&\]([int] [p]) { return [p]; }([0])"
"[f]([0])"
"*[p]"
"[a]\[[0]\]"
"~[0]"
"!([0])"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::find_leaves;
    use std::rc::Rc;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let table = MutationTable::parse("# comment\n\n\"a[b]c\"\n").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn parse_rejects_unquoted_lines() {
        let err = MutationTable::parse("a[b]c\n").unwrap_err();
        assert!(matches!(err, RulesError::Unquoted { line: 1 }));
    }

    #[test]
    fn parse_rejects_unterminated_slot() {
        let err = MutationTable::parse("\"a[b\"\n").unwrap_err();
        assert!(matches!(err, RulesError::UnterminatedSlot { line: 1 }));
    }

    #[test]
    fn parse_rejects_empty_table() {
        assert!(matches!(
            MutationTable::parse("# nothing\n"),
            Err(RulesError::Empty)
        ));
    }

    #[test]
    fn escaped_brackets_are_literal_text() {
        let table = MutationTable::parse("\"a\\[x\\]b\"\n").unwrap();
        let root = Node::empty();
        let out = table.mutate(&root, &root, 0);
        assert_eq!(out.render(), "a[x]b");
        // The whole production is fixed text; nothing left to expand.
        assert!(find_leaves(&out).is_empty());
    }

    #[test]
    fn mutate_expands_a_leaf_into_pieces() {
        let table = MutationTable::parse("\"if ([0]) { [] }\"\n").unwrap();
        let root = Node::empty();
        let out = table.mutate(&root, &root, 0);

        assert_eq!(out.render(), "if (0) {  }");
        // Two slots opened, fixed punctuation frozen.
        assert_eq!(find_leaves(&out).len(), 2);
    }

    #[test]
    fn mutate_out_of_range_is_identity() {
        let table = MutationTable::parse("\"x\"\n").unwrap();
        let root = Node::empty();
        let out = table.mutate(&root, &root, 99);
        assert!(Rc::ptr_eq(&out, &root));
    }

    #[test]
    fn mutate_with_foreign_leaf_is_identity() {
        let table = MutationTable::parse("\"x\"\n").unwrap();
        let root = Node::empty();
        let foreign = Node::empty();
        let out = table.mutate(&root, &foreign, 0);
        assert!(Rc::ptr_eq(&out, &root));
    }

    #[test]
    fn render_changes_only_through_expandable_leaves() {
        let table = MutationTable::parse("\"int [x] = [0];\"\n").unwrap();
        let root = Node::empty();
        let grown = table.mutate(&root, &root, 0);

        // Mutating each discovered leaf changes the rendering; fixed nodes
        // are never offered.
        for leaf in find_leaves(&grown) {
            let out = table.mutate(&grown, &leaf, 0);
            assert_ne!(out.render(), grown.render());
        }
    }

    #[test]
    fn builtin_cxx_table_parses() {
        let table = MutationTable::cxx();
        assert!(table.len() > 30);
    }

    #[test]
    fn builtin_cxx_first_expansion_renders_default_text() {
        let table = MutationTable::cxx();
        let root = Node::empty();
        let out = table.mutate(&root, &root, 0);
        assert_eq!(out.render(), "int x = 0;");
    }
}
