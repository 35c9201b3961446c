//! The catalog of value-preserving transformations.
//!
//! Every transformation clones the program (bumping its generation), picks
//! one target site, and rewrites it so the printed result is unchanged.
//! `None` means the program had no applicable target — the caller keeps
//! the original and treats the cycle as a no-op. The engine never loops to
//! force a change.
//!
//! Target selection is generation-biased: candidates are sorted by
//! descending generation and the pick index is drawn from a geometric
//! distribution, so mutations concentrate on recently grown subtrees.

use crate::expr::{CType, Expr, ExprKind};
use crate::program::{Function, Program};
use crate::visitor::{self, BlockSite, LiteralSite, Owner};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Parameter of the geometric distribution used for target selection.
pub const FIND_P: f64 = 0.1;

/// A transformation: `program -> program`, or `None` when no applicable
/// target exists.
pub type Transform = fn(&Program, &mut ChaCha8Rng) -> Option<Program>;

/// The closed transformation catalog, in dispatch order.
pub const CATALOG: &[(&str, Transform)] = &[
    ("to-statement-expression", to_statement_expression),
    ("to-sum", to_sum),
    ("to-product", to_product),
    ("to-negation", to_negation),
    ("to-conjunction", to_conjunction),
    ("to-disjunction", to_disjunction),
    ("to-xor", to_xor),
    ("to-equals", to_equals),
    ("to-not-equals", to_not_equals),
    ("to-variable", to_variable),
    ("to-global-variable", to_global_variable),
    ("to-function", to_function),
    ("to-builtin-constant-p", to_builtin_constant_p),
    ("insert-builtin-expect", insert_builtin_expect),
    ("insert-builtin-prefetch", insert_builtin_prefetch),
    ("insert-if", insert_if),
    ("insert-asm", insert_asm),
    ("insert-builtin-unreachable", insert_builtin_unreachable),
    ("insert-builtin-trap", insert_builtin_trap),
    ("insert-div-by-0", insert_div_by_0),
    ("to-variable-and-asm", to_variable_and_asm),
];

/// Apply one uniformly chosen transformation; identity when it has no
/// target.
pub fn apply_random(p: &Program, rng: &mut ChaCha8Rng) -> Program {
    let i = rng.gen_range(0..CATALOG.len());
    match (CATALOG[i].1)(p, rng) {
        Some(next) => next,
        None => p.clone(),
    }
}

/// Draw an index from Geometric(`FIND_P`) by inverse CDF, clamped to the
/// candidate array.
fn geometric_index(rng: &mut ChaCha8Rng, len: usize) -> usize {
    debug_assert!(len > 0);
    let u: f64 = rng.gen();
    let k = ((1.0 - u).ln() / (1.0 - FIND_P).ln()).floor() as usize;
    k.min(len - 1)
}

/// Pick one literal site, biased towards recent generations.
fn pick_literal(p: &mut Program, rng: &mut ChaCha8Rng) -> Option<LiteralSite> {
    let mut sites = visitor::int_literal_sites(p);
    if sites.is_empty() {
        return None;
    }
    sites.sort_by(|a, b| b.generation.cmp(&a.generation));
    Some(sites[geometric_index(rng, sites.len())])
}

/// Pick one block site, biased towards recent generations, optionally
/// restricted to blocks in unreachable context.
fn pick_block(p: &mut Program, rng: &mut ChaCha8Rng, only_unreachable: bool) -> Option<BlockSite> {
    let mut sites = visitor::block_sites(p);
    if only_unreachable {
        sites.retain(|s| s.unreachable);
    }
    if sites.is_empty() {
        return None;
    }
    sites.sort_by(|a, b| b.generation.cmp(&a.generation));
    Some(sites[geometric_index(rng, sites.len())])
}

fn body_stmts(p: &mut Program, owner: Owner) -> &mut Vec<Expr> {
    match owner {
        Owner::Toplevel => p.toplevel_fn.body_stmts_mut(),
        Owner::Fn(i) => p.toplevel_fns[i].body_stmts_mut(),
    }
}

/// Insert `stmt` into the block at `site` at a uniformly random position.
fn insert_into_block(p: &mut Program, site: &BlockSite, rng: &mut ChaCha8Rng, stmt: Expr) {
    let pos = rng.gen_range(0..=site.len);
    visitor::rewrite_block(p, site.index, |e| {
        if let ExprKind::Block(stmts) = &mut e.kind {
            stmts.insert(pos, stmt);
        }
    });
}

/// `n` → `({ {} n; })`
fn to_statement_expression(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::new(
            g,
            ExprKind::StmtExpr {
                block: Box::new(Expr::block(g, Vec::new())),
                last: Box::new(Expr::expr_stmt(g, Expr::int(site.generation, site.value))),
            },
        );
    });
    Some(next)
}

/// `n` → `a + b` with `a + b = n` and neither addend out of range.
fn to_sum(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    // Asymmetric bounds keep both the split and the generated program free
    // of signed overflow.
    let v = i64::from(site.value);
    let (min, max) = if v < 0 {
        (i64::from(i32::MIN), v - i64::from(i32::MIN))
    } else {
        (v - i64::from(i32::MAX), i64::from(i32::MAX))
    };
    let a = rng.gen_range(min..=max);
    let b = v - a;

    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::binop(g, "+", Expr::int(g, a as i32), Expr::int(g, b as i32));
    });
    Some(next)
}

fn gcd(mut a: i32, mut b: i32) -> i32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// `n` → `a * b` where `a = gcd(|n|, r)` for random `r`, so `a * b = n`
/// exactly. Requires `|n| > 1`.
fn to_product(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    if site.value == i32::MIN {
        // |n| is not representable.
        return None;
    }
    let a = site.value.abs();
    if a <= 1 {
        return None;
    }
    let r = rng.gen_range(1..a);
    let value_a = gcd(a, r);
    let value_b = site.value / value_a;

    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::binop(g, "*", Expr::int(g, value_a), Expr::int(g, value_b));
    });
    Some(next)
}

/// `n` → `~(~n)`
fn to_negation(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::new(
            g,
            ExprKind::PreOp {
                op: "~",
                arg: Box::new(Expr::int(g, !site.value)),
            },
        );
    });
    Some(next)
}

/// `n` → `(n|r) & (n|~r)` — the lattice absorption identity.
fn to_conjunction(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let r: i32 = rng.gen();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::binop(
            g,
            "&",
            Expr::int(g, site.value | r),
            Expr::int(g, site.value | !r),
        );
    });
    Some(next)
}

/// `n` → `(n&r) | (n&~r)`
fn to_disjunction(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let r: i32 = rng.gen();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::binop(
            g,
            "|",
            Expr::int(g, site.value & r),
            Expr::int(g, site.value & !r),
        );
    });
    Some(next)
}

/// `n` → `(~r) ^ (r ^ ~n)`
fn to_xor(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let r: i32 = rng.gen();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::binop(g, "^", Expr::int(g, !r), Expr::int(g, r ^ !site.value));
    });
    Some(next)
}

/// `1` → `(r == r)`
fn to_equals(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    if site.value != 1 {
        return None;
    }
    let r: i32 = rng.gen();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::binop(g, "==", Expr::int(g, r), Expr::int(g, r));
    });
    Some(next)
}

/// `1` → `(r1 != r2)` with `r1 != r2`
fn to_not_equals(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    if site.value != 1 {
        return None;
    }
    let r1: i32 = rng.gen();
    let mut r2: i32 = rng.gen();
    while r2 == r1 {
        r2 = rng.gen();
    }
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::binop(g, "!=", Expr::int(g, r1), Expr::int(g, r2));
    });
    Some(next)
}

fn declaration(g: u32, name: &str, site: &LiteralSite) -> Expr {
    Expr::new(
        g,
        ExprKind::Declaration {
            ty: CType::Int,
            name: name.to_string(),
            value: Box::new(Expr::int(site.generation, site.value)),
        },
    )
}

/// `n` → fresh local `int idN = n;` at the top of the enclosing body.
fn to_variable(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let name = next.ids.fresh();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::var(g, name.clone());
    });
    let decl = declaration(g, &name, &site);
    body_stmts(&mut next, site.owner).insert(0, decl);
    Some(next)
}

/// `n` → fresh global `int idN = n;` at the top of the unit.
fn to_global_variable(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let name = next.ids.fresh();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::var(g, name.clone());
    });
    let decl = declaration(g, &name, &site);
    next.toplevel_decls.insert(0, decl);
    Some(next)
}

/// `n` → fresh `int idN() { return n; }`, literal replaced by `idN()`.
fn to_function(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let name = next.ids.fresh();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::call(g, Expr::var(g, name.clone()), Vec::new());
    });

    let body = Expr::block(
        g,
        vec![Expr::new(
            g,
            ExprKind::Return(Box::new(Expr::int(site.generation, site.value))),
        )],
    );
    next.toplevel_fns.insert(
        0,
        Function {
            name,
            return_type: CType::Int,
            arg_types: Vec::new(),
            body,
        },
    );
    Some(next)
}

/// `n` → `(__builtin_constant_p(n)) ? (n) : (n)` — both arms carry the
/// value, so the predicate's verdict cannot matter.
fn to_builtin_constant_p(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::new(
            g,
            ExprKind::Conditional {
                cond: Box::new(Expr::call(
                    g,
                    Expr::var(g, "__builtin_constant_p"),
                    vec![Expr::int(g, site.value)],
                )),
                then: Box::new(Expr::int(g, site.value)),
                otherwise: Box::new(Expr::int(g, site.value)),
            },
        );
    });
    Some(next)
}

/// `n` → `__builtin_expect(n, hint)`; the hint is the true value a quarter
/// of the time and random otherwise — it is advisory either way.
fn insert_builtin_expect(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let hint = if rng.gen_range(0..4) == 0 {
        site.value
    } else {
        rng.gen()
    };
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::call(
            g,
            Expr::var(g, "__builtin_expect"),
            vec![Expr::int(g, site.value), Expr::int(g, hint)],
        );
    });
    Some(next)
}

/// Insert `__builtin_prefetch((void *) (r));` at a random block position.
fn insert_builtin_prefetch(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_block(&mut next, rng, false)?;

    let r: i32 = rng.gen();
    let stmt = Expr::expr_stmt(
        g,
        Expr::call(
            g,
            Expr::var(g, "__builtin_prefetch"),
            vec![Expr::new(
                g,
                ExprKind::Cast {
                    ty: CType::VoidPtr,
                    expr: Box::new(Expr::int(g, r)),
                },
            )],
        ),
    );
    insert_into_block(&mut next, &site, rng, stmt);
    Some(next)
}

/// Insert `if (c) {} else {}` with a constant condition; the branch the
/// condition rules out is wrapped in an unreachable marker so later
/// transformations can plant dead code there.
fn insert_if(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_block(&mut next, rng, false)?;

    let cond = rng.gen_range(0..=1);
    let mut then_branch = Expr::block(g, Vec::new());
    let mut else_branch = Expr::block(g, Vec::new());
    if cond != 0 {
        else_branch = Expr::new(g, ExprKind::UnreachableStmt(Box::new(else_branch)));
    } else {
        then_branch = Expr::new(g, ExprKind::UnreachableStmt(Box::new(then_branch)));
    }

    let stmt = Expr::new(
        g,
        ExprKind::If {
            cond: Box::new(Expr::int(g, cond)),
            then_branch: Box::new(then_branch),
            else_branch: Some(Box::new(else_branch)),
        },
    );
    insert_into_block(&mut next, &site, rng, stmt);
    Some(next)
}

/// Insert an empty `asm ("")` or `asm volatile ("")` statement.
fn insert_asm(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_block(&mut next, rng, false)?;

    let stmt = Expr::new(
        g,
        ExprKind::Asm {
            is_volatile: rng.gen_bool(0.5),
            outputs: Vec::new(),
            inputs: Vec::new(),
        },
    );
    insert_into_block(&mut next, &site, rng, stmt);
    Some(next)
}

fn insert_dead_call(p: &Program, rng: &mut ChaCha8Rng, callee: &'static str) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_block(&mut next, rng, true)?;

    let stmt = Expr::expr_stmt(g, Expr::call(g, Expr::var(g, callee), Vec::new()));
    insert_into_block(&mut next, &site, rng, stmt);
    Some(next)
}

/// Insert `__builtin_unreachable();` into a block the control flow can
/// never reach.
fn insert_builtin_unreachable(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    insert_dead_call(p, rng, "__builtin_unreachable")
}

/// Insert `__builtin_trap();` into an unreachable block.
fn insert_builtin_trap(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    insert_dead_call(p, rng, "__builtin_trap")
}

/// Insert `(1) / (0);` into an unreachable block.
fn insert_div_by_0(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_block(&mut next, rng, true)?;

    let stmt = Expr::expr_stmt(g, Expr::binop(g, "/", Expr::int(g, 1), Expr::int(g, 0)));
    insert_into_block(&mut next, &site, rng, stmt);
    Some(next)
}

/// `n` → local `int idN = n;` pinned by an `asm ("" : "+r" (idN))` that
/// the compiler must treat as an opaque identity on the variable.
fn to_variable_and_asm(p: &Program, rng: &mut ChaCha8Rng) -> Option<Program> {
    let mut next = p.next_generation();
    let g = next.generation;
    let site = pick_literal(&mut next, rng)?;

    let name = next.ids.fresh();
    visitor::rewrite_literal(&mut next, site.index, |e| {
        *e = Expr::var(g, name.clone());
    });

    let decl = declaration(g, &name, &site);
    let asm = Expr::new(
        g,
        ExprKind::Asm {
            is_volatile: rng.gen_bool(0.5),
            outputs: vec![Expr::new(
                g,
                ExprKind::AsmOperand {
                    constraint: "+r".to_string(),
                    expr: Box::new(Expr::var(g, name.clone())),
                },
            )],
            inputs: Vec::new(),
        },
    );
    let stmts = body_stmts(&mut next, site.owner);
    stmts.insert(0, decl);
    stmts.insert(1, asm);
    Some(next)
}
