//! Variable allocator (spec §4.6): remaps the provisional declaration-order
//! ordinals [`super::analyse`] assigned to real [`LocalSlot`] numbers,
//! reserving two adjacent slots for every ref-scalar local/parameter (the
//! second is an anonymous `<void>`-typed filler, spec §3.2 invariants) and
//! writes the finished variable table back onto [`crate::AinFile`]'s
//! [`Function`] entry.

use crate::jaf::ast::*;
use crate::types::{AinType, Function, LocalSlot, Variable};
use crate::{AinFile, Result};

fn collect_decls(params: &[VarDecl], body: &Option<Block>) -> Vec<(crate::Str, AinType)> {
    let mut out = Vec::new();
    for p in params {
        out.push((p.name.clone(), p.ty.clone()));
    }
    if let Some(b) = body {
        walk_block(b, &mut out);
    }
    out
}

fn walk_block(b: &Block, out: &mut Vec<(crate::Str, AinType)>) {
    for s in &b.stmts {
        walk_stmt(s, out);
    }
}

fn walk_stmt(s: &Stmt, out: &mut Vec<(crate::Str, AinType)>) {
    match s {
        Stmt::VarDecl(decls) => {
            for d in decls {
                out.push((d.name.clone(), d.ty.clone()));
            }
        }
        Stmt::Block(b) => walk_block(b, out),
        Stmt::If { then, else_, .. } => {
            walk_stmt(then, out);
            if let Some(e) = else_ {
                walk_stmt(e, out);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => walk_stmt(body, out),
        Stmt::For { init, body, .. } => {
            walk_stmt(init, out);
            walk_stmt(body, out);
        }
        Stmt::Switch { body, .. } => walk_stmt(body, out),
        Stmt::Label(_, inner) => walk_stmt(inner, out),
        _ => {}
    }
}

/// A provisional-ordinal -> real-slot table, plus the finished variable pool.
struct SlotMap {
    real_of: Vec<u16>,
    variables: Vec<Variable>,
    /// Number of leading `variables` entries (including ref-scalar filler
    /// slots) that belong to parameters.
    param_slots: usize,
}

fn build_slot_map(params: &[VarDecl], body: &Option<Block>) -> SlotMap {
    let decls = collect_decls(params, body);
    let mut real_of = Vec::with_capacity(decls.len());
    let mut variables = Vec::new();
    let mut next_slot: u16 = 0;
    let mut param_slots = 0usize;
    for (ord, (name, ty)) in decls.into_iter().enumerate() {
        real_of.push(next_slot);
        let is_ref_scalar = ty.is_ref_scalar();
        variables.push(Variable::new(name, ty));
        next_slot += 1;
        if is_ref_scalar {
            variables.push(Variable::new("<void>", AinType::void()));
            next_slot += 1;
        }
        if ord < params.len() {
            param_slots = variables.len();
        }
    }
    SlotMap { real_of, variables, param_slots }
}

fn remap_expr(e: &mut Expr, map: &[u16]) {
    match &mut e.kind {
        ExprKind::Ident { kind: IdentKind::Local(slot), .. } => {
            slot.0 = map[slot.0 as usize];
        }
        ExprKind::Unary { operand, .. } => remap_expr(operand, map),
        ExprKind::Binary { lhs, rhs, .. } => {
            remap_expr(lhs, map);
            remap_expr(rhs, map);
        }
        ExprKind::Ternary { cond, then, else_ } => {
            remap_expr(cond, map);
            remap_expr(then, map);
            remap_expr(else_, map);
        }
        ExprKind::Cast { inner, .. } => remap_expr(inner, map),
        ExprKind::Call { receiver, args, .. } => {
            if let Some(r) = receiver {
                remap_expr(r, map);
            }
            for a in args {
                remap_expr(a, map);
            }
        }
        ExprKind::Member { receiver, .. } => remap_expr(receiver, map),
        ExprKind::Sequence(items) => {
            for it in items {
                remap_expr(it, map);
            }
        }
        ExprKind::Subscript { array, index } => {
            remap_expr(array, map);
            remap_expr(index, map);
        }
        ExprKind::DummyRef { slot, init } => {
            slot.0 = map[slot.0 as usize];
            remap_expr(init, map);
        }
        _ => {}
    }
}

fn remap_stmt(s: &mut Stmt, map: &[u16]) {
    match s {
        Stmt::Expr(e) => remap_expr(e, map),
        Stmt::VarDecl(decls) => {
            for d in decls {
                if let Some(slot) = &mut d.slot {
                    slot.0 = map[slot.0 as usize];
                }
                if let Some(init) = &mut d.init {
                    remap_expr(init, map);
                }
            }
        }
        Stmt::Block(b) => {
            for s in &mut b.stmts {
                remap_stmt(s, map);
            }
        }
        Stmt::If { cond, then, else_ } => {
            remap_expr(cond, map);
            remap_stmt(then, map);
            if let Some(e) = else_ {
                remap_stmt(e, map);
            }
        }
        Stmt::While { cond, body } | Stmt::DoWhile { cond, body } => {
            remap_expr(cond, map);
            remap_stmt(body, map);
        }
        Stmt::For { init, cond, step, body } => {
            remap_stmt(init, map);
            if let Some(c) = cond {
                remap_expr(c, map);
            }
            if let Some(st) = step {
                remap_expr(st, map);
            }
            remap_stmt(body, map);
        }
        Stmt::Switch { subject, body } => {
            remap_expr(subject, map);
            remap_stmt(body, map);
        }
        Stmt::Return(Some(e)) => remap_expr(e, map),
        Stmt::RAssign { lhs, rhs } => {
            remap_expr(lhs, map);
            remap_expr(rhs, map);
        }
        Stmt::Assert { cond, .. } => remap_expr(cond, map),
        Stmt::Message { call: Some(c), .. } => remap_expr(c, map),
        Stmt::Label(_, inner) => remap_stmt(inner, map),
        _ => {}
    }
}

/// Resolve scoped-destruction lists (spec §4.5/§9): every ref-typed local
/// declared directly in a block must be destroyed, in reverse declaration
/// order, on every exit from that block.
fn fill_delete_vars(b: &mut Block, map: &[u16]) {
    let mut here = Vec::new();
    for s in &mut b.stmts {
        if let Stmt::VarDecl(decls) = s {
            for d in decls {
                if d.ty.is_ref() || d.ty.is_ref_scalar() {
                    if let Some(slot) = d.slot {
                        here.push(LocalSlot(map[slot.0 as usize]));
                    }
                }
            }
        }
    }
    here.reverse();
    b.delete_vars = here;
    for s in &mut b.stmts {
        fill_inner_blocks(s, map);
    }
}

fn fill_inner_blocks(s: &mut Stmt, map: &[u16]) {
    match s {
        Stmt::Block(b) => fill_delete_vars(b, map),
        Stmt::If { then, else_, .. } => {
            fill_inner_blocks(then, map);
            if let Some(e) = else_ {
                fill_inner_blocks(e, map);
            }
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => fill_inner_blocks(body, map),
        Stmt::For { init, body, .. } => {
            fill_inner_blocks(init, map);
            fill_inner_blocks(body, map);
        }
        Stmt::Switch { body, .. } => fill_inner_blocks(body, map),
        Stmt::Label(_, inner) => fill_inner_blocks(inner, map),
        _ => {}
    }
}

fn remap_block(b: &mut Block, map: &[u16]) {
    for s in &mut b.stmts {
        remap_stmt(s, map);
    }
}

fn allocate_function(ain: &mut AinFile, findex: crate::types::RefFunction, params: &mut [VarDecl], body: &mut Option<Block>) {
    let map_table = build_slot_map(params, body);
    for (i, p) in params.iter_mut().enumerate() {
        p.slot = Some(LocalSlot(map_table.real_of[i]));
    }
    if let Some(b) = body {
        remap_block(b, &map_table.real_of);
        fill_delete_vars(b, &map_table.real_of);
    }

    let f: &mut Function = &mut ain.functions[findex.0];
    f.variables = map_table.variables;
    f.nr_args = map_table.param_slots;
}

/// Run the allocator over every function and method body in the program.
pub fn allocate(ain: &mut AinFile, prog: &mut Program) -> Result<()> {
    for decl in &mut prog.decls {
        match decl {
            TopLevel::Function { findex, params, body, .. } => {
                allocate_function(ain, *findex, params, body);
            }
            TopLevel::Struct { methods, .. } => {
                for m in methods.iter_mut() {
                    allocate_function(ain, m.findex, &mut m.params, &mut m.body);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jaf::analyse::analyse;
    use crate::jaf::declare::declare;
    use crate::jaf::parser::Parser;
    use crate::jaf::resolve::resolve_types;
    use crate::AinFile;

    #[test]
    fn reserves_two_slots_for_ref_scalar_locals() {
        let mut ain = AinFile::new(11, 0);
        let src = "int f() { ref int r; int plain; return 0; }";
        let mut p = Parser::new(src, "t.jaf", &mut ain).unwrap();
        let mut prog = p.parse_program().unwrap();
        resolve_types(&mut ain, &mut prog).unwrap();
        declare(&mut ain, &mut prog).unwrap();
        analyse(&mut ain, &mut prog).unwrap();
        allocate(&mut ain, &mut prog).unwrap();
        let f = ain.function_by_name("f").unwrap();
        // ref int r (2 slots) + plain (1 slot) = 3 variable entries.
        assert_eq!(f.variables.len(), 3);
        assert_eq!(f.variables[1].ty.tag, crate::types::AinTypeTag::Void);
        assert_eq!(f.variables[1].name.as_str(), "<void>");
    }
}
