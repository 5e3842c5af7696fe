//! Type resolution (spec §4.4 pass 1, "Resolve types"): every [`AinType`]
//! the parser produced with an [`AinTypeTag::Named`] placeholder is looked
//! up against the struct/interface/functype/delegate/enum tables that
//! parsing has already populated and rewritten to a concrete tag. Runs
//! before the declaration pass so that later passes never see `Named`.

use crate::error::Span;
use crate::jaf::ast::*;
use crate::types::{AinType, AinTypeTag};
use crate::{AinFile, Error, Result};

fn resolve_tag(ain: &AinFile, at: &Span, tag: &AinTypeTag) -> Result<AinTypeTag> {
    match tag {
        AinTypeTag::Named(name) => {
            if let Some(r) = ain.struct_index_by_name(name.as_str()) {
                return Ok(if ain.structs[r.0].is_interface {
                    AinTypeTag::Iface(r)
                } else {
                    AinTypeTag::Struct(r)
                });
            }
            if let Some(&r) = ain.index.functypes.get(name.as_str()) {
                return Ok(AinTypeTag::FuncType(r));
            }
            if let Some(&r) = ain.index.delegates.get(name.as_str()) {
                return Ok(AinTypeTag::Delegate(r));
            }
            if let Some(&r) = ain.index.enums.get(name.as_str()) {
                return Ok(AinTypeTag::Enum(r));
            }
            Err(Error::unresolved(at.clone(), "type", name.as_str()))
        }
        AinTypeTag::Ref(inner) => Ok(AinTypeTag::Ref(Box::new(resolve_tag(ain, at, inner)?))),
        other => Ok(other.clone()),
    }
}

fn resolve_type(ain: &AinFile, at: &Span, ty: &AinType) -> Result<AinType> {
    let tag = resolve_tag(ain, at, &ty.tag)?;
    let element = match &ty.element {
        Some(e) => Some(Box::new(resolve_type(ain, at, e)?)),
        None => None,
    };
    Ok(AinType {
        tag,
        rank: ty.rank,
        element,
    })
}

fn resolve_expr(ain: &AinFile, at: &Span, e: &mut Expr) -> Result<()> {
    match &mut e.kind {
        ExprKind::Cast { to, inner } => {
            *to = resolve_type(ain, at, to)?;
            resolve_expr(ain, at, inner)?;
        }
        ExprKind::Unary { operand, .. } => resolve_expr(ain, at, operand)?,
        ExprKind::Binary { lhs, rhs, .. } => {
            resolve_expr(ain, at, lhs)?;
            resolve_expr(ain, at, rhs)?;
        }
        ExprKind::Ternary { cond, then, else_ } => {
            resolve_expr(ain, at, cond)?;
            resolve_expr(ain, at, then)?;
            resolve_expr(ain, at, else_)?;
        }
        ExprKind::Call { receiver, args, .. } => {
            if let Some(r) = receiver {
                resolve_expr(ain, at, r)?;
            }
            for a in args {
                resolve_expr(ain, at, a)?;
            }
        }
        ExprKind::Member { receiver, .. } => resolve_expr(ain, at, receiver)?,
        ExprKind::Sequence(items) => {
            for it in items {
                resolve_expr(ain, at, it)?;
            }
        }
        ExprKind::Subscript { array, index } => {
            resolve_expr(ain, at, array)?;
            resolve_expr(ain, at, index)?;
        }
        ExprKind::DummyRef { init, .. } => resolve_expr(ain, at, init)?,
        _ => {}
    }
    Ok(())
}

fn resolve_var_decl(ain: &AinFile, at: &Span, v: &mut VarDecl) -> Result<()> {
    v.ty = resolve_type(ain, at, &v.ty)?;
    if let Some(init) = &mut v.init {
        resolve_expr(ain, at, init)?;
    }
    Ok(())
}

fn resolve_stmt(ain: &AinFile, at: &Span, s: &mut Stmt) -> Result<()> {
    match s {
        Stmt::Expr(e) => resolve_expr(ain, at, e)?,
        Stmt::VarDecl(decls) => {
            for d in decls {
                resolve_var_decl(ain, at, d)?;
            }
        }
        Stmt::Block(b) => resolve_block(ain, at, b)?,
        Stmt::If { cond, then, else_ } => {
            resolve_expr(ain, at, cond)?;
            resolve_stmt(ain, at, then)?;
            if let Some(e) = else_ {
                resolve_stmt(ain, at, e)?;
            }
        }
        Stmt::While { cond, body } | Stmt::DoWhile { cond, body } => {
            resolve_expr(ain, at, cond)?;
            resolve_stmt(ain, at, body)?;
        }
        Stmt::For { init, cond, step, body } => {
            resolve_stmt(ain, at, init)?;
            if let Some(c) = cond {
                resolve_expr(ain, at, c)?;
            }
            if let Some(st) = step {
                resolve_expr(ain, at, st)?;
            }
            resolve_stmt(ain, at, body)?;
        }
        Stmt::Switch { subject, body } => {
            resolve_expr(ain, at, subject)?;
            resolve_stmt(ain, at, body)?;
        }
        Stmt::Return(Some(e)) => resolve_expr(ain, at, e)?,
        Stmt::RAssign { lhs, rhs } => {
            resolve_expr(ain, at, lhs)?;
            resolve_expr(ain, at, rhs)?;
        }
        Stmt::Assert { cond, .. } => resolve_expr(ain, at, cond)?,
        Stmt::Message { call: Some(c), .. } => resolve_expr(ain, at, c)?,
        Stmt::Label(_, inner) => resolve_stmt(ain, at, inner)?,
        _ => {}
    }
    Ok(())
}

fn resolve_block(ain: &AinFile, at: &Span, b: &mut Block) -> Result<()> {
    for s in &mut b.stmts {
        resolve_stmt(ain, at, s)?;
    }
    Ok(())
}

/// Resolve every `Named` placeholder reachable from the file's pools (struct
/// members, functypes, delegates, interface method signatures) and from the
/// parsed AST (locals, parameters, casts).
pub fn resolve_types(ain: &mut AinFile, prog: &mut Program) -> Result<()> {
    let at = Span::default();

    for i in 0..ain.structs.len() {
        for j in 0..ain.structs[i].members.len() {
            let resolved = resolve_type(ain, &at, &ain.structs[i].members[j].ty)?;
            ain.structs[i].members[j].ty = resolved;
        }
        for j in 0..ain.structs[i].iface_methods.len() {
            let resolved = resolve_type(ain, &at, &ain.structs[i].iface_methods[j].return_type)?;
            ain.structs[i].iface_methods[j].return_type = resolved;
            for k in 0..ain.structs[i].iface_methods[j].variables.len() {
                let resolved = resolve_type(ain, &at, &ain.structs[i].iface_methods[j].variables[k].ty)?;
                ain.structs[i].iface_methods[j].variables[k].ty = resolved;
            }
        }
    }
    for i in 0..ain.function_types.len() {
        let resolved = resolve_type(ain, &at, &ain.function_types[i].return_type)?;
        ain.function_types[i].return_type = resolved;
        for k in 0..ain.function_types[i].variables.len() {
            let resolved = resolve_type(ain, &at, &ain.function_types[i].variables[k].ty)?;
            ain.function_types[i].variables[k].ty = resolved;
        }
    }
    for i in 0..ain.delegates.len() {
        let resolved = resolve_type(ain, &at, &ain.delegates[i].return_type)?;
        ain.delegates[i].return_type = resolved;
        for k in 0..ain.delegates[i].variables.len() {
            let resolved = resolve_type(ain, &at, &ain.delegates[i].variables[k].ty)?;
            ain.delegates[i].variables[k].ty = resolved;
        }
    }

    for decl in &mut prog.decls {
        match decl {
            TopLevel::GlobalVar(v) => resolve_var_decl(ain, &at, v)?,
            TopLevel::Function { params, body, return_type, .. } => {
                *return_type = resolve_type(ain, &at, return_type)?;
                for p in params.iter_mut() {
                    resolve_var_decl(ain, &at, p)?;
                }
                if let Some(b) = body {
                    resolve_block(ain, &at, b)?;
                }
            }
            TopLevel::Struct { methods, .. } => {
                for m in methods.iter_mut() {
                    m.return_type = resolve_type(ain, &at, &m.return_type)?;
                    for p in m.params.iter_mut() {
                        resolve_var_decl(ain, &at, p)?;
                    }
                    if let Some(b) = &mut m.body {
                        resolve_block(ain, &at, b)?;
                    }
                }
            }
            TopLevel::FuncTypeDecl(_) | TopLevel::DelegateDecl(_) | TopLevel::EnumDecl(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jaf::parser::Parser;
    use crate::AinFile;

    #[test]
    fn resolves_struct_member_of_forward_type() {
        let mut ain = AinFile::new(11, 0);
        let src = "struct Node { ref Node next; int value; };";
        let mut p = Parser::new(src, "t.jaf", &mut ain).unwrap();
        let mut prog = p.parse_program().unwrap();
        resolve_types(&mut ain, &mut prog).unwrap();
        let node = ain.struct_by_name("Node").unwrap();
        match &node.members[0].ty.tag {
            AinTypeTag::Ref(inner) => assert!(matches!(**inner, AinTypeTag::Struct(_))),
            other => panic!("unexpected tag {other:?}"),
        }
    }

    #[test]
    fn unknown_type_name_errors() {
        let mut ain = AinFile::new(11, 0);
        let src = "void f() { Bogus x; }";
        let mut p = Parser::new(src, "t.jaf", &mut ain).unwrap();
        let mut prog = p.parse_program().unwrap();
        assert!(resolve_types(&mut ain, &mut prog).is_err());
    }
}
