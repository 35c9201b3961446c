//! Typed program model for the semantics-preserving icehunt engine.
//!
//! A [`Program`](program::Program) is a C compilation unit built around one
//! top-level function returning a fixed integer. Every transformation in
//! [`transform`] rewrites the tree so that the compiled program still
//! prints exactly that integer; a compiler that makes it print anything
//! else has miscompiled the program.
//!
//! Nodes carry a *generation* stamp — the program generation at the time
//! the node was created. Target selection is biased towards high
//! generations, so mutations keep drilling into recently grown subtrees
//! instead of spreading thin across the whole unit.
//!
//! Reachability is a property of traversal, not of the tree: the
//! `Unreachable*` wrappers render transparently but raise a visitor-side
//! counter while their subtree is walked, which is how dead-code-only
//! transformations find the branches a condition can never take.

pub mod expr;
pub mod program;
pub mod transform;
pub mod visitor;

pub use expr::{CType, Expr, ExprKind};
pub use program::{Function, IdentAllocator, Program};
