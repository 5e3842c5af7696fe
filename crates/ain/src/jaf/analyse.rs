//! Static analyser (spec §4.4 pass 3): resolves every identifier/member/call
//! left `Unresolved` by the parser, type-checks expressions, and folds
//! constant expressions. Locals are given a *provisional* ordinal slot here
//! (declaration order, ignoring the two-slot reservation that ref-scalar
//! locals need); [`super::alloc::allocate`] remaps ordinals to real
//! [`crate::types::LocalSlot`] numbers afterward.

use crate::error::Span;
use crate::jaf::ast::*;
use crate::types::{AinType, AinTypeTag, LocalSlot, RefFunction};
use crate::{AinFile, Error, Result, Warning};

struct Env<'a> {
    ain: &'a AinFile,
    /// Stack of scopes; each maps a local name to its provisional ordinal and type.
    scopes: Vec<Vec<(crate::Str, u16, AinType)>>,
    next_ordinal: u16,
    return_type: AinType,
    warnings: Vec<Warning>,
}

impl<'a> Env<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }
    fn pop_scope(&mut self) {
        self.scopes.pop();
    }
    fn declare_local(&mut self, name: crate::Str, ty: AinType) -> u16 {
        let ord = self.next_ordinal;
        self.next_ordinal += 1;
        self.scopes.last_mut().unwrap().push((name, ord, ty));
        ord
    }
    fn lookup_local(&self, name: &str) -> Option<(u16, AinType)> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, ord, ty)) = scope.iter().rev().find(|(n, _, _)| n.as_str() == name) {
                return Some((*ord, ty.clone()));
            }
        }
        None
    }
}

fn at() -> Span {
    Span::default()
}

/// Numeric widening rank used to pick the common type of a binary operator's
/// operands: `int` and `bool` promote to `int`, anything with a `float`
/// operand promotes to `float` (spec §4.5 "numeric widening").
fn numeric_join(a: &AinType, b: &AinType) -> AinType {
    if matches!(a.tag, AinTypeTag::Float) || matches!(b.tag, AinTypeTag::Float) {
        AinType::float()
    } else if matches!(a.tag, AinTypeTag::LongInt) || matches!(b.tag, AinTypeTag::LongInt) {
        AinType::simple(AinTypeTag::LongInt)
    } else {
        AinType::int()
    }
}

fn analyse_expr(env: &mut Env, e: &mut Expr) -> Result<()> {
    match &mut e.kind {
        ExprKind::IntLit(_) => e.ty = AinType::int(),
        ExprKind::LongLit(_) => e.ty = AinType::simple(AinTypeTag::LongInt),
        ExprKind::FloatLit(_) => e.ty = AinType::float(),
        ExprKind::BoolLit(_) => e.ty = AinType::bool_(),
        ExprKind::StringLit(_) => e.ty = AinType::string(),
        ExprKind::Null => e.ty = AinType::simple(AinTypeTag::NullType),
        ExprKind::This => e.ty = AinType::simple(AinTypeTag::IMainSystem),
        ExprKind::Super => e.ty = AinType::simple(AinTypeTag::Super),

        ExprKind::Ident { name, kind } => {
            if let Some((ord, ty)) = env.lookup_local(name.as_str()) {
                *kind = IdentKind::Local(LocalSlot(ord));
                e.ty = ty;
            } else if let Some(g) = env.ain.global_by_name(name.as_str()) {
                let idx = env
                    .ain
                    .globals
                    .iter()
                    .position(|v| v.name.as_str() == name.as_str())
                    .unwrap();
                *kind = IdentKind::Global(crate::types::RefGlobal(idx));
                e.ty = g.ty.clone();
            } else {
                return Err(Error::unresolved(at(), "identifier", name.as_str()));
            }
        }

        ExprKind::Unary { op, operand } => {
            analyse_expr(env, operand)?;
            e.ty = match op {
                UnOp::Not => AinType::bool_(),
                UnOp::AddrOf => AinType::simple(AinTypeTag::Function),
                _ => operand.ty.clone(),
            };
        }

        ExprKind::Binary { op, lhs, rhs } => {
            analyse_expr(env, lhs)?;
            analyse_expr(env, rhs)?;
            e.ty = match op {
                BinOp::Eq | BinOp::NotEq | BinOp::RefEq | BinOp::RefNotEq | BinOp::Lt | BinOp::Gt | BinOp::Lte | BinOp::Gte | BinOp::LAnd | BinOp::LOr => {
                    AinType::bool_()
                }
                BinOp::Assign => {
                    rhs_assignability_check(&lhs.ty, &rhs.ty)?;
                    lhs.ty.clone()
                }
                BinOp::Mod_ if matches!(lhs.ty.tag, AinTypeTag::String) => AinType::string(),
                BinOp::Add if matches!(lhs.ty.tag, AinTypeTag::String) || matches!(rhs.ty.tag, AinTypeTag::String) => AinType::string(),
                // `d += &S::m` / `d -= &S::m` (spec §4.5): the delegate lvalue's
                // own type is the result, not a numeric join of lhs/rhs.
                BinOp::PlusA | BinOp::MinusA if matches!(lhs.ty.tag, AinTypeTag::Delegate(_)) => lhs.ty.clone(),
                _ => numeric_join(&lhs.ty, &rhs.ty),
            };
            fold_binary(e);
        }

        ExprKind::Ternary { cond, then, else_ } => {
            analyse_expr(env, cond)?;
            analyse_expr(env, then)?;
            analyse_expr(env, else_)?;
            e.ty = then.ty.clone();
            fold_ternary(e);
        }

        ExprKind::Cast { to, inner } => {
            analyse_expr(env, inner)?;
            e.ty = to.clone();
            fold_cast(e);
        }

        ExprKind::Call { target, receiver, args } => {
            if let Some(r) = receiver {
                analyse_expr(env, r)?;
            }
            for a in args.iter_mut() {
                analyse_expr(env, a)?;
            }
            resolve_call(env, target, receiver, args, &mut e.ty)?;
        }

        ExprKind::Member { receiver, name, kind } => {
            analyse_expr(env, receiver)?;
            resolve_member(env, &receiver.ty, name, kind, &mut e.ty)?;
        }

        ExprKind::Sequence(items) => {
            for it in items.iter_mut() {
                analyse_expr(env, it)?;
            }
            if let Some(last) = items.last() {
                e.ty = last.ty.clone();
            }
        }

        ExprKind::Subscript { array, index } => {
            analyse_expr(env, array)?;
            analyse_expr(env, index)?;
            e.ty = match &array.ty.element {
                Some(elem) if array.ty.rank > 1 => AinType {
                    tag: AinTypeTag::Array,
                    rank: array.ty.rank - 1,
                    element: Some(elem.clone()),
                },
                Some(elem) => (**elem).clone(),
                None => AinType::void(),
            };
        }

        ExprKind::DummyRef { init, .. } => {
            analyse_expr(env, init)?;
            e.ty = init.ty.clone();
        }

        // `&Struct::method` (spec §4.5): the struct's methods are only
        // registered as `Struct@method`-qualified functions by the
        // declaration pass, so resolution is deferred to here.
        ExprKind::MethodRef { struct_name, method_name, target } => {
            let strct = env
                .ain
                .struct_index_by_name(struct_name.as_str())
                .ok_or_else(|| Error::unresolved(at(), "struct", struct_name.as_str()))?;
            let qualified = format!("{}@{method_name}", env.ain.structs[strct.0].name);
            if env.ain.function_by_name(&qualified).is_none() {
                return Err(Error::unresolved(at(), "method", qualified.as_str()));
            }
            let findex = RefFunction(env.ain.functions.iter().position(|x| x.name.as_str() == qualified).unwrap());
            *target = Some(findex);
            e.ty = AinType::simple(AinTypeTag::Method);
        }
    }
    Ok(())
}

fn rhs_assignability_check(lhs: &AinType, rhs: &AinType) -> Result<()> {
    if lhs.is_numeric() && rhs.is_numeric() {
        return Ok(());
    }
    if matches!(lhs.tag, AinTypeTag::String) && !matches!(rhs.tag, AinTypeTag::String) {
        return Err(Error::type_error(at(), "cannot assign non-string to string"));
    }
    Ok(())
}

/// Constant folding for arithmetic/comparison on literal operands (spec §9
/// "Constant folding").
fn fold_binary(e: &mut Expr) {
    let ExprKind::Binary { op, lhs, rhs } = &e.kind else { return };
    let (Some(a), Some(b)) = (as_const_int(lhs), as_const_int(rhs)) else {
        return;
    };
    let folded = match op {
        BinOp::Add => Some(a.wrapping_add(b)),
        BinOp::Sub => Some(a.wrapping_sub(b)),
        BinOp::Mul => Some(a.wrapping_mul(b)),
        BinOp::Div if b != 0 => Some(a.wrapping_div(b)),
        BinOp::Mod if b != 0 => Some(a.wrapping_rem(b)),
        BinOp::BAnd => Some(a & b),
        BinOp::BOr => Some(a | b),
        BinOp::BXor => Some(a ^ b),
        _ => None,
    };
    if let Some(v) = folded {
        e.kind = ExprKind::IntLit(v);
    }
}

fn as_const_int(e: &Expr) -> Option<i32> {
    match &e.kind {
        ExprKind::IntLit(v) => Some(*v),
        ExprKind::BoolLit(b) => Some(*b as i32),
        _ => None,
    }
}

fn fold_cast(e: &mut Expr) {
    let ExprKind::Cast { to, inner } = &e.kind else { return };
    match (&to.tag, &inner.kind) {
        (AinTypeTag::Int, ExprKind::FloatLit(f)) => e.kind = ExprKind::IntLit(*f as i32),
        (AinTypeTag::Float, ExprKind::IntLit(i)) => e.kind = ExprKind::FloatLit(*i as f32),
        (AinTypeTag::Bool, ExprKind::IntLit(i)) => e.kind = ExprKind::BoolLit(*i != 0),
        _ => {}
    }
}

/// Fold `cond ? then : else_` when `cond` is a literal. The original
/// compiler freed the discarded arm before reading the survivor's value,
/// corrupting it when both arms shared a subexpression; here the surviving
/// node is moved out and the other is simply dropped, never read after the
/// decision is made.
fn fold_ternary(e: &mut Expr) {
    let take_then = match &e.kind {
        ExprKind::Ternary { cond, .. } => match &cond.kind {
            ExprKind::IntLit(v) => Some(*v != 0),
            ExprKind::BoolLit(v) => Some(*v),
            _ => None,
        },
        _ => unreachable!(),
    };
    let Some(take_then) = take_then else { return };
    let ExprKind::Ternary { then, else_, .. } = std::mem::replace(&mut e.kind, ExprKind::Null) else {
        unreachable!()
    };
    let chosen = if take_then { *then } else { *else_ };
    *e = chosen;
}

fn resolve_call(env: &mut Env, target: &mut CallTarget, receiver: &Option<Box<Expr>>, args: &[Expr], out_ty: &mut AinType) -> Result<()> {
    let CallTarget::Unresolved(name) = target else {
        return Ok(());
    };
    if receiver.is_none() {
        if let Some(f) = env.ain.function_by_name(name.as_str()) {
            *out_ty = f.return_type.clone();
            *target = CallTarget::Function(RefFunction(
                env.ain.functions.iter().position(|x| x.name.as_str() == name.as_str()).unwrap(),
            ));
            return Ok(());
        }
        return Err(Error::unresolved(at(), "function", name.as_str()));
    }
    let recv_ty = &receiver.as_ref().unwrap().ty;
    let struct_ref = match &recv_ty.tag {
        AinTypeTag::Struct(r) | AinTypeTag::Iface(r) => Some(*r),
        _ => None,
    };
    if let Some(r) = struct_ref {
        let strct = &env.ain.structs[r.0];
        let qualified = format!("{}@{name}", strct.name);
        if let Some(f) = env.ain.function_by_name(&qualified) {
            *out_ty = f.return_type.clone();
            let fidx = RefFunction(env.ain.functions.iter().position(|x| x.name.as_str() == qualified).unwrap());
            *target = CallTarget::Method(fidx);
            return Ok(());
        }
    }
    let _ = args;
    Err(Error::unresolved(at(), "method", name.as_str()))
}

fn resolve_member(env: &mut Env, recv_ty: &AinType, name: &crate::Str, kind: &mut MemberKind, out_ty: &mut AinType) -> Result<()> {
    let struct_ref = match &recv_ty.tag {
        AinTypeTag::Struct(r) | AinTypeTag::Iface(r) => *r,
        _ => return Err(Error::type_error(at(), format!("'{name}' requires a struct or interface receiver"))),
    };
    let strct = &env.ain.structs[struct_ref.0];
    if let Some(member_idx) = strct.member_index(name.as_str()) {
        *kind = MemberKind::Field(member_idx);
        *out_ty = strct.members[member_idx.0].ty.clone();
        return Ok(());
    }
    let getter_name = format!("{}@{name}::get", strct.name);
    let setter_name = format!("{}@{name}::set", strct.name);
    if let Some(getter) = env.ain.function_by_name(&getter_name) {
        let getter_idx = RefFunction(env.ain.functions.iter().position(|f| f.name.as_str() == getter_name).unwrap());
        let setter_idx = env
            .ain
            .function_by_name(&setter_name)
            .and_then(|_| env.ain.functions.iter().position(|f| f.name.as_str() == setter_name))
            .map(RefFunction);
        *out_ty = getter.return_type.clone();
        *kind = MemberKind::Property { getter: getter_idx, setter: setter_idx };
        return Ok(());
    }
    Err(Error::unresolved(at(), "member", name.as_str()))
}

fn analyse_stmt(env: &mut Env, s: &mut Stmt) -> Result<()> {
    match s {
        Stmt::Expr(e) => analyse_expr(env, e)?,
        Stmt::VarDecl(decls) => {
            for d in decls.iter_mut() {
                if let Some(init) = &mut d.init {
                    analyse_expr(env, init)?;
                }
                let ord = env.declare_local(d.name.clone(), d.ty.clone());
                d.slot = Some(LocalSlot(ord));
            }
        }
        Stmt::Block(b) => analyse_block(env, b)?,
        Stmt::If { cond, then, else_ } => {
            analyse_expr(env, cond)?;
            analyse_stmt(env, then)?;
            if let Some(e) = else_ {
                analyse_stmt(env, e)?;
            }
        }
        Stmt::While { cond, body } | Stmt::DoWhile { cond, body } => {
            analyse_expr(env, cond)?;
            analyse_stmt(env, body)?;
        }
        Stmt::For { init, cond, step, body } => {
            env.push_scope();
            analyse_stmt(env, init)?;
            if let Some(c) = cond {
                analyse_expr(env, c)?;
            }
            if let Some(st) = step {
                analyse_expr(env, st)?;
            }
            analyse_stmt(env, body)?;
            env.pop_scope();
        }
        Stmt::Switch { subject, body } => {
            analyse_expr(env, subject)?;
            analyse_stmt(env, body)?;
        }
        Stmt::Return(Some(e)) => {
            analyse_expr(env, e)?;
        }
        Stmt::RAssign { lhs, rhs } => {
            analyse_expr(env, lhs)?;
            analyse_expr(env, rhs)?;
        }
        Stmt::Assert { cond, .. } => analyse_expr(env, cond)?,
        Stmt::Message { call: Some(c), .. } => analyse_expr(env, c)?,
        Stmt::Label(_, inner) => analyse_stmt(env, inner)?,
        _ => {}
    }
    Ok(())
}

fn analyse_block(env: &mut Env, b: &mut Block) -> Result<()> {
    env.push_scope();
    for s in &mut b.stmts {
        analyse_stmt(env, s)?;
    }
    env.pop_scope();
    Ok(())
}

fn analyse_global_init(ain: &AinFile, init: &mut Expr) -> Result<()> {
    let mut env = Env {
        ain,
        scopes: vec![Vec::new()],
        next_ordinal: 0,
        return_type: AinType::void(),
        warnings: Vec::new(),
    };
    analyse_expr(&mut env, init)
}

fn analyse_function(ain: &AinFile, params: &[VarDecl], body: &mut Option<Block>, return_type: &AinType) -> Result<Vec<Warning>> {
    let mut env = Env {
        ain,
        scopes: Vec::new(),
        next_ordinal: 0,
        return_type: return_type.clone(),
        warnings: Vec::new(),
    };
    env.push_scope();
    for p in params {
        env.declare_local(p.name.clone(), p.ty.clone());
    }
    if let Some(b) = body {
        analyse_block(&mut env, b)?;
    }
    env.pop_scope();
    Ok(env.warnings)
}

/// Run the static analyser over every function body and global initializer
/// in the program (spec §4.4 pass 3).
pub fn analyse(ain: &mut AinFile, prog: &mut Program) -> Result<Vec<Warning>> {
    let mut warnings = Vec::new();

    for decl in &mut prog.decls {
        match decl {
            TopLevel::GlobalVar(v) => {
                if let Some(init) = &mut v.init {
                    analyse_global_init(ain, init)?;
                }
            }
            TopLevel::Function { params, body, return_type, .. } => {
                warnings.extend(analyse_function(ain, params, body, return_type)?);
            }
            TopLevel::Struct { methods, .. } => {
                for m in methods.iter_mut() {
                    warnings.extend(analyse_function(ain, &m.params, &mut m.body, &m.return_type)?);
                }
            }
            TopLevel::FuncTypeDecl(_) | TopLevel::DelegateDecl(_) | TopLevel::EnumDecl(_) => {}
        }
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jaf::declare::declare;
    use crate::jaf::parser::Parser;
    use crate::jaf::resolve::resolve_types;
    use crate::AinFile;

    fn run(src: &str, major: u8) -> (AinFile, Program) {
        let mut ain = AinFile::new(major, 0);
        let mut p = Parser::new(src, "t.jaf", &mut ain).unwrap();
        let mut prog = p.parse_program().unwrap();
        resolve_types(&mut ain, &mut prog).unwrap();
        declare(&mut ain, &mut prog).unwrap();
        (ain, prog)
    }

    #[test]
    fn folds_constant_arithmetic() {
        let (mut ain, mut prog) = run("int f() { return 2 + 3 * 4; }", 6);
        analyse(&mut ain, &mut prog).unwrap();
        let TopLevel::Function { body: Some(b), .. } = &prog.decls[0] else { panic!() };
        match &b.stmts[0] {
            Stmt::Return(Some(Expr { kind: ExprKind::IntLit(v), .. })) => assert_eq!(*v, 14),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }

    #[test]
    fn folds_ternary_on_literal_condition() {
        let (mut ain, mut prog) = run("int f() { return 1 ? 10 : 20; }", 6);
        analyse(&mut ain, &mut prog).unwrap();
        let TopLevel::Function { body: Some(b), .. } = &prog.decls[0] else { panic!() };
        match &b.stmts[0] {
            Stmt::Return(Some(Expr { kind: ExprKind::IntLit(v), .. })) => assert_eq!(*v, 10),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }

    #[test]
    fn resolves_local_and_call() {
        let (mut ain, mut prog) = run("int helper(int x) { return x; } int f() { int y = 1; return helper(y); }", 6);
        analyse(&mut ain, &mut prog).unwrap();
    }
}
