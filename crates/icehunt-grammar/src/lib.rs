//! Grammar-driven program representation for the icehunt fuzzer.
//!
//! A program is a tree of [`Node`]s: each node carries either a literal text
//! fragment or an ordered list of children. Rendering is the in-order
//! concatenation of every fragment. Mutation grows the tree by replacing an
//! expandable leaf with the pieces of one grammar production drawn from a
//! [`MutationTable`].
//!
//! Trees are persistent: a mutation clones only the spine from the root to
//! the rewritten node and shares every other subtree with its predecessor,
//! so a test case retained in the queue is never disturbed by later
//! mutations of its descendants.
//!
//! Node equality is by identity, not structure — two leaves that render the
//! same text are still distinct mutation targets.

pub mod node;
pub mod rules;

pub use node::{find_leaves, replace, Node, NodeRef};
pub use rules::{MutationTable, RulesError};
