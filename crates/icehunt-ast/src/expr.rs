//! Expression and statement nodes.
//!
//! Statements are expressions here, as in C's grammar they nearly are; the
//! statement-only variants simply render with indentation and a trailing
//! semicolon or newline. Child nodes are held by owning handles, so
//! `Clone` is a deep copy and a cloned program shares nothing with its
//! predecessor.

use std::fmt;

/// The few C types the generated programs use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CType {
    Int,
    VoidPtr,
}

impl fmt::Display for CType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CType::Int => f.write_str("int"),
            CType::VoidPtr => f.write_str("void *"),
        }
    }
}

/// One AST node: a generation stamp plus the variant payload.
#[derive(Debug, Clone)]
pub struct Expr {
    /// Program generation at the time this node was created. Survives
    /// cloning; only newly built nodes get the current generation.
    pub generation: u32,
    pub kind: ExprKind,
}

/// The variant payload of an [`Expr`].
#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral(i32),
    Variable(String),
    Cast {
        ty: CType,
        expr: Box<Expr>,
    },
    Call {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Prefix unary operator, e.g. `~(x)`.
    PreOp {
        op: &'static str,
        arg: Box<Expr>,
    },
    /// Fully parenthesized binary operator: `(lhs) op (rhs)`.
    BinOp {
        op: &'static str,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Ternary conditional: `(cond) ? (then) : (otherwise)`.
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `{ ... }` — also serves as a function body.
    Block(Vec<Expr>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    /// `ty name = value;`
    Declaration {
        ty: CType,
        name: String,
        value: Box<Expr>,
    },
    Return(Box<Expr>),
    /// An expression in statement position: `expr;`
    ExprStmt(Box<Expr>),
    /// One `"constraint" (expr)` operand of an asm statement.
    AsmOperand {
        constraint: String,
        expr: Box<Expr>,
    },
    /// `asm [volatile] ("" : outputs : inputs);` with an empty template.
    Asm {
        is_volatile: bool,
        outputs: Vec<Expr>,
        inputs: Vec<Expr>,
    },
    /// GNU statement expression `({ block last })`.
    StmtExpr {
        block: Box<Expr>,
        last: Box<Expr>,
    },
    /// Transparent wrapper marking its subtree as unreachable at run time.
    /// Renders as its child; traversal raises the visitor's counter.
    UnreachableExpr(Box<Expr>),
    /// Statement-position sibling of [`ExprKind::UnreachableExpr`].
    UnreachableStmt(Box<Expr>),
}

impl Expr {
    pub fn new(generation: u32, kind: ExprKind) -> Self {
        Expr { generation, kind }
    }

    pub fn int(generation: u32, value: i32) -> Self {
        Expr::new(generation, ExprKind::IntLiteral(value))
    }

    pub fn var(generation: u32, name: impl Into<String>) -> Self {
        Expr::new(generation, ExprKind::Variable(name.into()))
    }

    pub fn call(generation: u32, target: Expr, args: Vec<Expr>) -> Self {
        Expr::new(
            generation,
            ExprKind::Call {
                target: Box::new(target),
                args,
            },
        )
    }

    pub fn binop(generation: u32, op: &'static str, lhs: Expr, rhs: Expr) -> Self {
        Expr::new(
            generation,
            ExprKind::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        )
    }

    pub fn expr_stmt(generation: u32, expr: Expr) -> Self {
        Expr::new(generation, ExprKind::ExprStmt(Box::new(expr)))
    }

    pub fn block(generation: u32, stmts: Vec<Expr>) -> Self {
        Expr::new(generation, ExprKind::Block(stmts))
    }

    /// Render this node as C source into `out`.
    ///
    /// `indent` is the statement nesting depth; expression variants ignore
    /// it except to forward it.
    pub fn render(&self, out: &mut String, indent: usize) {
        match &self.kind {
            ExprKind::IntLiteral(v) => {
                out.push_str(&v.to_string());
            }
            ExprKind::Variable(name) => {
                out.push_str(name);
            }
            ExprKind::Cast { ty, expr } => {
                out.push('(');
                out.push_str(&ty.to_string());
                out.push_str(") (");
                expr.render(out, indent);
                out.push(')');
            }
            ExprKind::Call { target, args } => {
                target.render(out, indent);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.render(out, indent);
                }
                out.push(')');
            }
            ExprKind::PreOp { op, arg } => {
                out.push_str(op);
                out.push('(');
                arg.render(out, indent);
                out.push(')');
            }
            ExprKind::BinOp { op, lhs, rhs } => {
                out.push('(');
                lhs.render(out, indent);
                out.push_str(") ");
                out.push_str(op);
                out.push_str(" (");
                rhs.render(out, indent);
                out.push(')');
            }
            ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                out.push('(');
                cond.render(out, indent);
                out.push_str(") ? (");
                then.render(out, indent);
                out.push_str(") : (");
                otherwise.render(out, indent);
                out.push(')');
            }
            ExprKind::Block(stmts) => {
                out.push_str("{\n");
                for stmt in stmts {
                    stmt.render(out, indent + 1);
                }
                push_indent(out, indent.saturating_sub(1));
                out.push_str("}\n");
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                push_indent(out, indent);
                out.push_str("if (");
                cond.render(out, indent);
                out.push_str(") ");
                then_branch.render(out, indent + 1);
                if let Some(else_branch) = else_branch {
                    push_indent(out, indent);
                    out.push_str("else ");
                    else_branch.render(out, indent + 1);
                }
            }
            ExprKind::Declaration { ty, name, value } => {
                push_indent(out, indent);
                out.push_str(&ty.to_string());
                out.push(' ');
                out.push_str(name);
                out.push_str(" = ");
                value.render(out, indent);
                out.push_str(";\n");
            }
            ExprKind::Return(expr) => {
                push_indent(out, indent);
                out.push_str("return ");
                expr.render(out, indent);
                out.push_str(";\n");
            }
            ExprKind::ExprStmt(expr) => {
                push_indent(out, indent);
                expr.render(out, indent);
                out.push_str(";\n");
            }
            ExprKind::AsmOperand { constraint, expr } => {
                out.push('"');
                out.push_str(constraint);
                out.push_str("\" (");
                expr.render(out, indent);
                out.push(')');
            }
            ExprKind::Asm {
                is_volatile,
                outputs,
                inputs,
            } => {
                push_indent(out, indent);
                out.push_str("asm ");
                if *is_volatile {
                    out.push_str("volatile ");
                }
                out.push_str("(\"\"");
                if !outputs.is_empty() || !inputs.is_empty() {
                    out.push_str(" : ");
                    for (i, output) in outputs.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        output.render(out, indent);
                    }
                }
                if !inputs.is_empty() {
                    out.push_str(" : ");
                    for (i, input) in inputs.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        input.render(out, indent);
                    }
                }
                out.push_str(");\n");
            }
            ExprKind::StmtExpr { block, last } => {
                out.push_str("({ ");
                block.render(out, 0);
                last.render(out, 0);
                out.push_str("})");
            }
            ExprKind::UnreachableExpr(inner) | ExprKind::UnreachableStmt(inner) => {
                inner.render(out, indent);
            }
        }
    }
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("  ");
    }
}
