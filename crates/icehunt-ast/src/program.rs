//! The program container: top-level declarations, helper functions, the
//! top-level function, and the cached call that `main` prints.

use crate::expr::{CType, Expr, ExprKind};

/// Name of the top-level function. Fixed, so the identifier allocator's
/// `id0, id1, …` are free for lifted variables and functions.
pub const TOPLEVEL_FN_NAME: &str = "f";

/// Allocator for fresh identifiers `id0, id1, …`.
#[derive(Debug, Clone, Default)]
pub struct IdentAllocator {
    next: u32,
}

impl IdentAllocator {
    pub fn fresh(&mut self) -> String {
        let name = format!("id{}", self.next);
        self.next += 1;
        name
    }
}

/// One function definition.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub return_type: CType,
    pub arg_types: Vec<CType>,
    /// Always an [`ExprKind::Block`].
    pub body: Expr,
}

impl Function {
    pub fn render(&self, out: &mut String) {
        out.push_str(&self.return_type.to_string());
        out.push(' ');
        out.push_str(&self.name);
        out.push('(');
        for (i, ty) in self.arg_types.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&ty.to_string());
        }
        out.push_str(")\n");
        self.body.render(out, 1);
        out.push('\n');
    }

    /// The body's statement list. The body is a block by construction.
    pub fn body_stmts_mut(&mut self) -> &mut Vec<Expr> {
        match &mut self.body.kind {
            ExprKind::Block(stmts) => stmts,
            _ => unreachable!("function body is always a block"),
        }
    }
}

/// A whole compilation unit under mutation.
///
/// The top-level function returns `target_value`; `main` prints the result
/// of calling it. Every value-preserving transformation must keep the
/// printed output equal to `target_value` — that is the oracle the valid
/// engine checks after each successful compile.
#[derive(Debug, Clone)]
pub struct Program {
    /// Bumped once per surviving mutation; node stamps are compared
    /// against this to find recently grown subtrees.
    pub generation: u32,
    /// The immutable integer the program must print.
    pub target_value: i32,
    pub ids: IdentAllocator,
    pub toplevel_decls: Vec<Expr>,
    pub toplevel_fns: Vec<Function>,
    pub toplevel_fn: Function,
    /// Cached call expression printed by `main`. Never traversed, never a
    /// mutation target.
    call: Expr,
}

impl Program {
    /// Seed a program with the trivial body `return target_value;`.
    pub fn new(target_value: i32) -> Self {
        let generation = 0;
        let body = Expr::block(
            generation,
            vec![Expr::new(
                generation,
                ExprKind::Return(Box::new(Expr::int(generation, target_value))),
            )],
        );
        let toplevel_fn = Function {
            name: TOPLEVEL_FN_NAME.to_string(),
            return_type: CType::Int,
            arg_types: Vec::new(),
            body,
        };
        let call = Expr::call(generation, Expr::var(generation, TOPLEVEL_FN_NAME), Vec::new());

        Program {
            generation,
            target_value,
            ids: IdentAllocator::default(),
            toplevel_decls: Vec::new(),
            toplevel_fns: Vec::new(),
            toplevel_fn,
            call,
        }
    }

    /// Deep copy with the generation bumped by one — the starting point of
    /// every transformation. Existing node stamps are preserved; only
    /// nodes the transformation builds carry the new generation.
    pub fn next_generation(&self) -> Program {
        let mut p = self.clone();
        p.generation += 1;
        p
    }

    /// Render the full compilation unit.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("extern \"C\" {\n");
        out.push_str("extern int printf (const char *__restrict __format, ...);\n");
        out.push_str("}\n\n");

        for decl in &self.toplevel_decls {
            decl.render(&mut out, 0);
        }
        for f in &self.toplevel_fns {
            f.render(&mut out);
        }
        self.toplevel_fn.render(&mut out);

        out.push_str("int main(int argc, char *argv[])\n{\n  printf(\"%d\\n\", ");
        self.call.render(&mut out, 0);
        out.push_str(");\n}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_program_shape() {
        let p = Program::new(42);
        let src = p.render();

        assert!(src.starts_with("extern \"C\" {\n"));
        assert!(src.contains("int f()"));
        assert!(src.contains("return 42;"));
        assert!(src.contains("printf(\"%d\\n\", f());"));
        assert_eq!(p.generation, 0);
    }

    #[test]
    fn seed_program_handles_extreme_values() {
        let src = Program::new(i32::MIN).render();
        assert!(src.contains("return -2147483648;"));
    }

    #[test]
    fn next_generation_bumps_without_touching_nodes() {
        let p = Program::new(7);
        let q = p.next_generation();

        assert_eq!(q.generation, 1);
        assert_eq!(q.target_value, 7);
        // The seed nodes keep their original stamp.
        assert_eq!(q.toplevel_fn.body.generation, 0);
        assert_eq!(p.render(), q.render());
    }

    #[test]
    fn ident_allocator_is_sequential() {
        let mut ids = IdentAllocator::default();
        assert_eq!(ids.fresh(), "id0");
        assert_eq!(ids.fresh(), "id1");
        assert_eq!(ids.fresh(), "id2");
    }

    #[test]
    fn toplevel_items_render_in_insertion_order() {
        let mut p = Program::new(1);
        let g = p.generation;
        p.toplevel_decls.push(Expr::new(
            g,
            ExprKind::Declaration {
                ty: CType::Int,
                name: "id0".to_string(),
                value: Box::new(Expr::int(g, 5)),
            },
        ));
        p.toplevel_fns.push(Function {
            name: "id1".to_string(),
            return_type: CType::Int,
            arg_types: Vec::new(),
            body: Expr::block(
                g,
                vec![Expr::new(g, ExprKind::Return(Box::new(Expr::int(g, 5))))],
            ),
        });

        let src = p.render();
        let decl_at = src.find("int id0 = 5;").unwrap();
        let fn_at = src.find("int id1()").unwrap();
        let top_at = src.find("int f()").unwrap();
        assert!(decl_at < fn_at && fn_at < top_at);
    }
}
