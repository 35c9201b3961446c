//! Tree traversal: site discovery and in-place rewriting.
//!
//! The C++ ancestor of this engine handed each visitor a mutable reference
//! to the owning slot of every shared node. Under Rust's borrow rules the
//! equivalent is a two-pass protocol over a deterministic walk order:
//!
//! 1. a *collect* pass enumerates candidate sites, each identified by its
//!    ordinal position in the walk;
//! 2. a *rewrite* pass repeats the same walk, counts down to the chosen
//!    ordinal, and applies a closure to that node.
//!
//! Both passes run on the transformation's private clone, so ordinals
//! cannot go stale in between.
//!
//! Reachability is visitor-local state: the `Unreachable*` wrapper
//! variants raise a counter around their subtree, and every node visited
//! while the counter is positive reports an unreachable context.

use crate::expr::{Expr, ExprKind};
use crate::program::Program;

/// Which function a site lives in. Sites outside any function (top-level
/// declaration initializers) are never candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// The top-level function.
    Toplevel,
    /// `toplevel_fns[i]`.
    Fn(usize),
}

/// An integer literal available for rewriting.
#[derive(Debug, Clone, Copy)]
pub struct LiteralSite {
    /// Ordinal among literal sites in walk order.
    pub index: usize,
    pub generation: u32,
    pub value: i32,
    pub owner: Owner,
}

/// A block statement available for insertion.
#[derive(Debug, Clone, Copy)]
pub struct BlockSite {
    /// Ordinal among block sites in walk order.
    pub index: usize,
    pub generation: u32,
    /// Number of statements currently in the block.
    pub len: usize,
    pub owner: Owner,
    /// Whether the walk reached this block inside an unreachable subtree.
    pub unreachable: bool,
}

struct WalkState {
    unreachable: u32,
}

/// Visit every expression node of `p` in deterministic order, parents
/// before children. The callback returns `false` to stop the walk.
///
/// Walk order: top-level declarations (no owner), helper functions in
/// insertion order, then the top-level function. Asm operands are not
/// descended into — operands are opaque to mutation, as in the original
/// engine. The cached top-level call is not walked at all.
pub fn walk_program(p: &mut Program, f: &mut dyn FnMut(&mut Expr, Option<Owner>, bool) -> bool) {
    let mut st = WalkState { unreachable: 0 };

    for decl in &mut p.toplevel_decls {
        if !walk_expr(decl, None, &mut st, f) {
            return;
        }
    }
    for i in 0..p.toplevel_fns.len() {
        if !walk_expr(&mut p.toplevel_fns[i].body, Some(Owner::Fn(i)), &mut st, f) {
            return;
        }
    }
    walk_expr(&mut p.toplevel_fn.body, Some(Owner::Toplevel), &mut st, f);
}

fn walk_expr(
    e: &mut Expr,
    owner: Option<Owner>,
    st: &mut WalkState,
    f: &mut dyn FnMut(&mut Expr, Option<Owner>, bool) -> bool,
) -> bool {
    if matches!(
        e.kind,
        ExprKind::UnreachableExpr(_) | ExprKind::UnreachableStmt(_)
    ) {
        st.unreachable += 1;
        let mut cont = f(e, owner, st.unreachable > 0);
        if cont {
            if let ExprKind::UnreachableExpr(inner) | ExprKind::UnreachableStmt(inner) =
                &mut e.kind
            {
                cont = walk_expr(inner, owner, st, f);
            }
        }
        st.unreachable -= 1;
        return cont;
    }

    if !f(e, owner, st.unreachable > 0) {
        return false;
    }

    match &mut e.kind {
        ExprKind::IntLiteral(_) | ExprKind::Variable(_) => true,
        ExprKind::Cast { expr, .. }
        | ExprKind::PreOp { arg: expr, .. }
        | ExprKind::Return(expr)
        | ExprKind::ExprStmt(expr) => walk_expr(expr, owner, st, f),
        ExprKind::Call { target, args } => {
            walk_expr(target, owner, st, f)
                && args.iter_mut().all(|a| walk_expr(a, owner, st, f))
        }
        ExprKind::BinOp { lhs, rhs, .. } => {
            walk_expr(lhs, owner, st, f) && walk_expr(rhs, owner, st, f)
        }
        ExprKind::Conditional {
            cond,
            then,
            otherwise,
        } => {
            walk_expr(cond, owner, st, f)
                && walk_expr(then, owner, st, f)
                && walk_expr(otherwise, owner, st, f)
        }
        ExprKind::Block(stmts) => stmts.iter_mut().all(|s| walk_expr(s, owner, st, f)),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            walk_expr(cond, owner, st, f)
                && walk_expr(then_branch, owner, st, f)
                && else_branch
                    .as_mut()
                    .map_or(true, |e| walk_expr(e, owner, st, f))
        }
        ExprKind::Declaration { value, .. } => walk_expr(value, owner, st, f),
        ExprKind::StmtExpr { block, last } => {
            walk_expr(block, owner, st, f) && walk_expr(last, owner, st, f)
        }
        ExprKind::AsmOperand { expr, .. } => walk_expr(expr, owner, st, f),
        // Operands are opaque: literals inside asm constraints are never
        // mutation targets.
        ExprKind::Asm { .. } => true,
        ExprKind::UnreachableExpr(_) | ExprKind::UnreachableStmt(_) => unreachable!(),
    }
}

/// Every integer literal inside a function, in walk order.
pub fn int_literal_sites(p: &mut Program) -> Vec<LiteralSite> {
    let mut sites = Vec::new();
    let mut n = 0;
    walk_program(p, &mut |e, owner, _| {
        if let (ExprKind::IntLiteral(value), Some(owner)) = (&e.kind, owner) {
            sites.push(LiteralSite {
                index: n,
                generation: e.generation,
                value: *value,
                owner,
            });
            n += 1;
        }
        true
    });
    sites
}

/// Every block statement inside a function, in walk order.
pub fn block_sites(p: &mut Program) -> Vec<BlockSite> {
    let mut sites = Vec::new();
    let mut n = 0;
    walk_program(p, &mut |e, owner, unreachable| {
        if let (ExprKind::Block(stmts), Some(owner)) = (&e.kind, owner) {
            sites.push(BlockSite {
                index: n,
                generation: e.generation,
                len: stmts.len(),
                owner,
                unreachable,
            });
            n += 1;
        }
        true
    });
    sites
}

/// Apply `rewrite` to the literal at ordinal `index`. Returns whether the
/// site was found.
pub fn rewrite_literal(p: &mut Program, index: usize, rewrite: impl FnOnce(&mut Expr)) -> bool {
    let mut rewrite = Some(rewrite);
    let mut n = 0;
    let mut hit = false;
    walk_program(p, &mut |e, owner, _| {
        if matches!(e.kind, ExprKind::IntLiteral(_)) && owner.is_some() {
            if n == index {
                if let Some(rewrite) = rewrite.take() {
                    rewrite(e);
                }
                hit = true;
                return false;
            }
            n += 1;
        }
        true
    });
    hit
}

/// Apply `rewrite` to the block at ordinal `index`. Returns whether the
/// site was found.
pub fn rewrite_block(p: &mut Program, index: usize, rewrite: impl FnOnce(&mut Expr)) -> bool {
    let mut rewrite = Some(rewrite);
    let mut n = 0;
    let mut hit = false;
    walk_program(p, &mut |e, owner, _| {
        if matches!(e.kind, ExprKind::Block(_)) && owner.is_some() {
            if n == index {
                if let Some(rewrite) = rewrite.take() {
                    rewrite(e);
                }
                hit = true;
                return false;
            }
            n += 1;
        }
        true
    });
    hit
}
