//! Bytecode emitter (spec §4.7): lowers an analysed and allocated
//! [`crate::jaf::ast::Program`] into [`AinFile::code`]. Layout mirrors
//! [`crate::jam::assembler`]'s two-pass approach — a label's address only
//! depends on the byte width of what comes before it, so every jump target
//! is assigned a [`LabelId`] placeholder during code generation and patched
//! to a real [`Addr`] once every instruction's width is known.

use std::collections::HashMap;

use crate::jaf::ast::*;
use crate::opcodes::{Addr, FloatArg, IntArg, Opcode, TypeArg};
use crate::types::{AinType, AinTypeTag, Constant, LocalSlot, RefFunction};
use crate::{intern, AinFile, Error, Result, Span, Warning};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LabelId(u32);

/// One entry of the not-yet-laid-out instruction stream. Everything that
/// carries a label instead of a concrete [`Addr`] gets resolved in
/// [`FuncEmitter::layout`].
enum EOp {
    Op(Opcode),
    JumpIfz(LabelId),
    JumpIfnz(LabelId),
    Jump(LabelId),
    DgCall { dg_slot: IntArg, end: LabelId },
    Mark(LabelId),
}

struct LoopCtx {
    break_label: LabelId,
    continue_label: LabelId,
}

struct FuncEmitter {
    ops: Vec<EOp>,
    next_label: u32,
    loop_stack: Vec<LoopCtx>,
    named_labels: HashMap<String, LabelId>,
    version_major: u8,
}

impl FuncEmitter {
    fn new(version_major: u8) -> Self {
        FuncEmitter {
            ops: Vec::new(),
            next_label: 0,
            loop_stack: Vec::new(),
            named_labels: HashMap::new(),
            version_major,
        }
    }

    fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }

    fn named_label(&mut self, name: &str) -> LabelId {
        if let Some(l) = self.named_labels.get(name) {
            return *l;
        }
        let l = self.new_label();
        self.named_labels.insert(name.to_string(), l);
        l
    }

    fn mark(&mut self, l: LabelId) {
        self.ops.push(EOp::Mark(l));
    }

    fn push(&mut self, op: Opcode) {
        self.ops.push(EOp::Op(op));
    }

    // ---- version-parameterised opcode adapter (spec §4.7) -----------------

    fn op_ref1(&self) -> Opcode {
        if self.version_major >= 14 {
            Opcode::XRef { n: IntArg(1) }
        } else {
            Opcode::Ref {}
        }
    }

    fn op_ref2(&self) -> Opcode {
        if self.version_major >= 14 {
            Opcode::XRef { n: IntArg(2) }
        } else {
            Opcode::RefRef {}
        }
    }

    fn op_dup1(&self) -> Opcode {
        if self.version_major >= 14 {
            Opcode::XDup { n: IntArg(1) }
        } else {
            Opcode::Dup {}
        }
    }

    fn op_dup2(&self) -> Opcode {
        if self.version_major >= 14 {
            Opcode::XDup { n: IntArg(2) }
        } else {
            Opcode::Dup2 {}
        }
    }

    fn op_assign1(&self) -> Opcode {
        if self.version_major >= 14 {
            Opcode::XAssign { n: IntArg(1) }
        } else {
            Opcode::Assign {}
        }
    }

    /// The per-type `*_ASSIGN` family (spec §4.2 "pseudo-ops") collapses
    /// into a single generic `X_ASSIGN 1` at major version >= 14, the same
    /// way `op_assign1` already collapses the bare `ASSIGN` case.
    fn assign_op_for(&self, ty: &AinType) -> Opcode {
        if self.version_major >= 14 {
            return self.op_assign1();
        }
        match &ty.tag {
            AinTypeTag::Float => Opcode::FAssign {},
            AinTypeTag::String => Opcode::SAssign {},
            AinTypeTag::LongInt => Opcode::LiAssign {},
            _ => self.op_assign1(),
        }
    }

    /// Statement-level discard of a var-decl initialiser's assign result
    /// (spec §8 scenarios 2-3): a refcounted string is destroyed with
    /// `DELETE` from major version 11 on; `X_ASSIGN`'s own bookkeeping
    /// covers that at 14+, where the trailing discard is a plain `POP`
    /// again. Every other type is always a plain `POP`.
    fn pop_op_for(&self, ty: &AinType) -> Opcode {
        if matches!(ty.tag, AinTypeTag::String) && (11..14).contains(&self.version_major) {
            Opcode::Delete {}
        } else {
            Opcode::Pop {}
        }
    }

    /// Delegate assignment/compound-assignment opcode (spec §4.5): a
    /// method-typed rhs synthesises `DG_SET`/`DG_ADD`/`DG_ERASE`, a
    /// delegate-typed rhs synthesises `DG_ASSIGN`/`DG_PLUSA`/`DG_MINUSA`.
    fn delegate_compound_op(&self, op: BinOp, rhs_ty: &AinType) -> Result<Opcode> {
        match (op, &rhs_ty.tag) {
            (BinOp::Assign, AinTypeTag::Method) => Ok(Opcode::DgSet {}),
            (BinOp::Assign, AinTypeTag::Delegate(_)) => Ok(Opcode::DgAssign {}),
            (BinOp::PlusA, AinTypeTag::Method) => Ok(Opcode::DgAdd {}),
            (BinOp::PlusA, AinTypeTag::Delegate(_)) => Ok(Opcode::DgPlusA {}),
            (BinOp::MinusA, AinTypeTag::Method) => Ok(Opcode::DgErase {}),
            (BinOp::MinusA, AinTypeTag::Delegate(_)) => Ok(Opcode::DgMinusA {}),
            _ => Err(Error::type_error(
                Span::default(),
                format!("unsupported delegate assignment from {:?}", rhs_ty.tag),
            )),
        }
    }

    // ---- lvalues ------------------------------------------------------------

    /// Push the (page, slot) pair addressing `e`, leaving the page on the
    /// stack for a following `REF`/`ASSIGN`/`DELETE`.
    fn emit_lvalue(&mut self, ain: &mut AinFile, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::Ident { kind: IdentKind::Local(slot), .. } => {
                self.push(Opcode::PushLocalPage {});
                self.push(Opcode::Push { val: IntArg(slot.0 as i32) });
            }
            ExprKind::Ident { kind: IdentKind::Global(g), .. } => {
                self.push(Opcode::PushGlobalPage {});
                self.push(Opcode::Push { val: IntArg(g.0 as i32) });
            }
            ExprKind::Member { receiver, kind: MemberKind::Field(member), .. } => {
                self.emit_expr(ain, receiver)?;
                self.push(Opcode::CRef { member_offset: IntArg(member.0 as i32) });
            }
            ExprKind::This => self.push(Opcode::PushStructPage {}),
            other => {
                return Err(Error::type_error(Span::default(), format!("expression is not an lvalue: {other:?}")));
            }
        }
        Ok(())
    }

    // ---- expressions ----------------------------------------------------------

    fn emit_expr(&mut self, ain: &mut AinFile, e: &Expr) -> Result<()> {
        match &e.kind {
            ExprKind::IntLit(v) => self.push(Opcode::Push { val: IntArg(*v) }),
            ExprKind::LongLit(v) => self.push(Opcode::Push { val: IntArg(*v as i32) }),
            ExprKind::FloatLit(v) => self.push(Opcode::FPush { val: FloatArg(*v) }),
            ExprKind::BoolLit(b) => self.push(Opcode::Push { val: IntArg(*b as i32) }),
            ExprKind::StringLit(s) => {
                let r = intern(&mut ain.strings, s.as_str());
                self.push(Opcode::SPush { val: r });
            }
            ExprKind::Null => self.push(Opcode::Push { val: IntArg(-1) }),
            ExprKind::This => self.push(Opcode::PushStructPage {}),
            ExprKind::Super => self.push(Opcode::PushStructPage {}),

            ExprKind::Ident { kind: IdentKind::Const(c), .. } => self.emit_constant(ain, c),
            ExprKind::Ident { .. } => {
                self.emit_lvalue(ain, e)?;
                self.push(self.op_ref1());
            }

            ExprKind::Unary { op, operand } => self.emit_unary(ain, *op, operand)?,
            ExprKind::Binary { op, lhs, rhs } => self.emit_binary(ain, *op, lhs, rhs, &e.ty)?,
            ExprKind::Ternary { cond, then, else_ } => self.emit_ternary(ain, cond, then, else_)?,
            ExprKind::Cast { to, inner } => self.emit_cast(ain, to, inner)?,
            ExprKind::Call { target, receiver, args } => self.emit_call(ain, target, receiver, args)?,
            ExprKind::Member { kind: MemberKind::Property { getter, .. }, receiver, .. } => {
                self.emit_expr(ain, receiver)?;
                self.push(Opcode::CallMethod { func: *getter });
            }
            ExprKind::Member { kind: MemberKind::Method(f), receiver, .. } => {
                self.emit_expr(ain, receiver)?;
                self.push(Opcode::CallMethod { func: *f });
            }
            ExprKind::Member { .. } => {
                self.emit_lvalue(ain, e)?;
                self.push(self.op_ref1());
            }
            ExprKind::Sequence(items) => {
                for (i, it) in items.iter().enumerate() {
                    self.emit_expr(ain, it)?;
                    if i + 1 != items.len() {
                        self.push(Opcode::Pop {});
                    }
                }
            }
            ExprKind::Subscript { array, index } => {
                self.emit_expr(ain, array)?;
                self.emit_expr(ain, index)?;
                self.push(Opcode::Push { val: IntArg(0) });
                self.push(self.op_ref2());
            }
            ExprKind::DummyRef { slot, init } => {
                self.emit_expr(ain, init)?;
                self.push(Opcode::PushLocalPage {});
                self.push(Opcode::Push { val: IntArg(slot.0 as i32) });
                self.push(Opcode::Swap {});
                self.push(self.assign_op_for(&init.ty));
            }

            // `&Struct::method` (spec §4.5): same single-index representation
            // as the plain `&free_fn` case in `emit_unary`. Resolved by the
            // analyser, which runs before emission ever starts.
            ExprKind::MethodRef { target, .. } => {
                let f = target.expect("MethodRef resolved by the analyse pass");
                self.push(Opcode::Push { val: IntArg(f.0 as i32) });
            }
        }
        Ok(())
    }

    fn emit_constant(&mut self, ain: &mut AinFile, c: &Constant) {
        match c {
            Constant::Void => self.push(Opcode::Push { val: IntArg(0) }),
            Constant::Int(v) => self.push(Opcode::Push { val: IntArg(*v) }),
            Constant::LongInt(v) => self.push(Opcode::Push { val: IntArg(*v as i32) }),
            Constant::Bool(b) => self.push(Opcode::Push { val: IntArg(*b as i32) }),
            Constant::Float(v) => self.push(Opcode::FPush { val: FloatArg(*v) }),
            Constant::String(s) => {
                let r = intern(&mut ain.strings, s.as_str());
                self.push(Opcode::SPush { val: r });
            }
        }
    }

    fn emit_unary(&mut self, ain: &mut AinFile, op: UnOp, operand: &Expr) -> Result<()> {
        match op {
            UnOp::AddrOf => {
                if let ExprKind::Ident { name, .. } = &operand.kind {
                    if let Some(f) = ain.function_by_name(name.as_str()) {
                        self.push(Opcode::Push { val: IntArg(f.findex.0 as i32) });
                        return Ok(());
                    }
                }
                self.emit_expr(ain, operand)?;
            }
            UnOp::Neg => {
                self.push(Opcode::Push { val: IntArg(0) });
                self.emit_expr(ain, operand)?;
                self.push(if matches!(operand.ty.tag, AinTypeTag::Float) { Opcode::Sub {} } else { Opcode::Sub {} });
            }
            UnOp::Not => {
                self.emit_expr(ain, operand)?;
                self.push(Opcode::Not {});
            }
            UnOp::BitNot => {
                self.emit_expr(ain, operand)?;
                self.push(Opcode::Push { val: IntArg(-1) });
                self.push(Opcode::Xor {});
            }
            UnOp::PreInc | UnOp::PostInc => {
                self.emit_lvalue(ain, operand)?;
                self.push(self.op_dup2());
                self.push(self.op_ref1());
                self.push(Opcode::Inc {});
            }
            UnOp::PreDec | UnOp::PostDec => {
                self.emit_lvalue(ain, operand)?;
                self.push(self.op_dup2());
                self.push(self.op_ref1());
                self.push(Opcode::Dec {});
            }
        }
        Ok(())
    }

    fn emit_binary(&mut self, ain: &mut AinFile, op: BinOp, lhs: &Expr, rhs: &Expr, result_ty: &AinType) -> Result<()> {
        if matches!(
            op,
            BinOp::Assign | BinOp::PlusA | BinOp::MinusA | BinOp::MulA | BinOp::DivA | BinOp::ModA | BinOp::AndA | BinOp::OrA | BinOp::XorA
        ) {
            if let AinTypeTag::Delegate(dg) = &lhs.ty.tag {
                let dg = *dg;
                self.emit_lvalue(ain, lhs)?;
                self.push(self.op_dup2());
                if matches!(op, BinOp::Assign) && matches!(rhs.ty.tag, AinTypeTag::String) {
                    // spec §4.5 "assignment from a string uses DG_STR_TO_METHOD";
                    // sequence transcribed from the method-coercion path that
                    // precedes DG_SET/DG_ASSIGN dispatch in the original compiler.
                    self.emit_expr(ain, rhs)?;
                    self.push(Opcode::Push { val: IntArg(-1) });
                    self.push(Opcode::Swap {});
                    self.push(Opcode::Push { val: IntArg(dg.0 as i32) });
                    self.push(Opcode::DgStrToMethod {});
                    self.push(Opcode::DgSet {});
                    return Ok(());
                }
                self.emit_expr(ain, rhs)?;
                self.push(self.delegate_compound_op(op, &rhs.ty)?);
                return Ok(());
            }

            self.emit_lvalue(ain, lhs)?;
            self.push(self.op_dup2());
            self.emit_expr(ain, rhs)?;
            let is_float = matches!(lhs.ty.tag, AinTypeTag::Float);
            let is_long = matches!(lhs.ty.tag, AinTypeTag::LongInt);
            let compound = match op {
                BinOp::PlusA if is_long => Some(Opcode::LiPlusA {}),
                BinOp::MinusA if is_long => Some(Opcode::LiMinusA {}),
                BinOp::PlusA => Some(Opcode::PlusA {}),
                BinOp::MinusA => Some(Opcode::MinusA {}),
                _ => None,
            };
            if let Some(op) = compound {
                self.push(op);
            } else if matches!(op, BinOp::Assign) {
                let assign = if is_float { Opcode::FAssign {} } else { self.assign_op_for(&lhs.ty) };
                self.push(assign);
            } else {
                // Compound arithmetic the VM doesn't have a dedicated opcode for:
                // dereference the duplicated lvalue, apply, then re-assign.
                self.push(self.op_ref1());
                self.push(match op {
                    BinOp::MulA => Opcode::Mul {},
                    BinOp::DivA => Opcode::Div {},
                    BinOp::ModA => Opcode::Mod {},
                    BinOp::AndA => Opcode::And {},
                    BinOp::OrA => Opcode::Or {},
                    BinOp::XorA => Opcode::Xor {},
                    _ => unreachable!(),
                });
                self.push(self.assign_op_for(&lhs.ty));
            }
            return Ok(());
        }

        self.emit_expr(ain, lhs)?;
        self.emit_expr(ain, rhs)?;
        let is_float = matches!(lhs.ty.tag, AinTypeTag::Float) || matches!(rhs.ty.tag, AinTypeTag::Float);
        let is_string = matches!(lhs.ty.tag, AinTypeTag::String);
        self.push(match op {
            BinOp::Add if is_string => Opcode::SAdd {},
            BinOp::Add => Opcode::Add {},
            BinOp::Sub => Opcode::Sub {},
            BinOp::Mul => Opcode::Mul {},
            BinOp::Div => Opcode::Div {},
            BinOp::Mod_ if is_string => Opcode::SMod {},
            BinOp::Mod | BinOp::Mod_ => Opcode::Mod {},
            BinOp::Lt => Opcode::Lt {},
            BinOp::Gt => Opcode::Gt {},
            BinOp::Lte => Opcode::Lte {},
            BinOp::Gte => Opcode::Gte {},
            BinOp::Eq => Opcode::Equale {},
            BinOp::NotEq => Opcode::NotE {},
            BinOp::RefEq => Opcode::Equale {},
            BinOp::RefNotEq => Opcode::NotE {},
            BinOp::LAnd => Opcode::Land {},
            BinOp::LOr => Opcode::Lor {},
            BinOp::BAnd => Opcode::And {},
            BinOp::BOr => Opcode::Or {},
            BinOp::BXor => Opcode::Xor {},
            _ => unreachable!("assignment ops handled above"),
        });
        let _ = (is_float, result_ty);
        Ok(())
    }

    fn emit_ternary(&mut self, ain: &mut AinFile, cond: &Expr, then: &Expr, else_: &Expr) -> Result<()> {
        let else_label = self.new_label();
        let end_label = self.new_label();
        self.emit_expr(ain, cond)?;
        self.ops.push(EOp::JumpIfz(else_label));
        self.emit_expr(ain, then)?;
        self.ops.push(EOp::Jump(end_label));
        self.mark(else_label);
        self.emit_expr(ain, else_)?;
        self.mark(end_label);
        Ok(())
    }

    /// No dedicated cast opcode exists (spec §4.7's opcode table has none);
    /// non-literal numeric casts pass the value through unchanged, matching
    /// every other stack-typed operator in this instruction set.
    fn emit_cast(&mut self, ain: &mut AinFile, _to: &AinType, inner: &Expr) -> Result<()> {
        self.emit_expr(ain, inner)
    }

    fn emit_call(&mut self, ain: &mut AinFile, target: &CallTarget, receiver: &Option<Box<Expr>>, args: &[Expr]) -> Result<()> {
        match target {
            CallTarget::Function(f) => {
                for a in args {
                    self.emit_expr(ain, a)?;
                }
                self.push(Opcode::CallFunc { func: *f });
            }
            CallTarget::Method(f) => {
                if let Some(r) = receiver {
                    self.emit_expr(ain, r)?;
                }
                for a in args {
                    self.emit_expr(ain, a)?;
                }
                self.push(Opcode::CallMethod { func: *f });
            }
            CallTarget::Syscall(s) => {
                for a in args {
                    self.emit_expr(ain, a)?;
                }
                self.push(Opcode::CallSys { syscall: *s });
            }
            CallTarget::Hll { library, function } => {
                for a in args {
                    self.emit_expr(ain, a)?;
                }
                let type_param = if self.version_major >= 11 { TypeArg(0) } else { TypeArg(0) };
                self.push(Opcode::CallHll { library: *library, function: *function, type_param });
            }
            CallTarget::New(strct) => {
                self.push(Opcode::New { strct: *strct });
            }
            CallTarget::FunctionValue => {
                if let Some(r) = receiver {
                    self.emit_expr(ain, r)?;
                }
                for a in args {
                    self.emit_expr(ain, a)?;
                }
                self.push(Opcode::CallFunc2 {});
            }
            CallTarget::Interface { method_no, .. } => {
                if let Some(r) = receiver {
                    self.emit_expr(ain, r)?;
                }
                self.push(self.op_dup2());
                self.push(Opcode::Push { val: IntArg(0) });
                self.push(self.op_ref1());
                self.push(Opcode::Push { val: IntArg(*method_no as i32) });
                self.push(Opcode::Add {});
                self.push(self.op_ref1());
                for a in args {
                    self.emit_expr(ain, a)?;
                }
                self.push(Opcode::CallMethod { func: RefFunction(0) });
            }
            CallTarget::Super => {
                self.push(Opcode::PushStructPage {});
            }
            CallTarget::Builtin(name) => {
                self.emit_builtin_call(ain, name, receiver, args)?;
            }
            CallTarget::Unresolved(name) => {
                return Err(Error::unresolved(Span::default(), "call target", name.as_str()));
            }
        }
        Ok(())
    }

    fn emit_builtin_call(&mut self, ain: &mut AinFile, name: &str, receiver: &Option<Box<Expr>>, args: &[Expr]) -> Result<()> {
        if let Some(r) = receiver {
            self.emit_expr(ain, r)?;
        }
        for a in args {
            self.emit_expr(ain, a)?;
        }
        self.push(match name {
            "Alloc" => Opcode::AAlloc {},
            "Realloc" => Opcode::ARealloc {},
            "Free" => Opcode::AFree {},
            "Numof" => Opcode::ANumof {},
            "Copy" => Opcode::ACopy {},
            "Sort" => Opcode::ASort {},
            other => return Err(Error::unsupported(Span::default(), format!("array/string builtin '{other}'"), (self.version_major, 0))),
        });
        Ok(())
    }

    // ---- statements -----------------------------------------------------------

    fn emit_stmt(&mut self, ain: &mut AinFile, s: &Stmt, warnings: &mut Vec<Warning>) -> Result<()> {
        match s {
            Stmt::Expr(e) => {
                self.emit_expr(ain, e)?;
                self.push(Opcode::Pop {});
            }
            Stmt::VarDecl(decls) => {
                for d in decls {
                    let Some(slot) = d.slot else { continue };
                    if let Some(init) = &d.init {
                        self.push(Opcode::PushLocalPage {});
                        self.push(Opcode::Push { val: IntArg(slot.0 as i32) });
                        self.emit_expr(ain, init)?;
                        self.push(self.assign_op_for(&d.ty));
                        self.push(self.pop_op_for(&d.ty));
                    }
                }
            }
            Stmt::Block(b) => self.emit_block(ain, b, warnings)?,
            Stmt::If { cond, then, else_ } => {
                let else_label = self.new_label();
                self.emit_expr(ain, cond)?;
                self.ops.push(EOp::JumpIfz(else_label));
                self.emit_stmt(ain, then, warnings)?;
                if let Some(e) = else_ {
                    let end_label = self.new_label();
                    self.ops.push(EOp::Jump(end_label));
                    self.mark(else_label);
                    self.emit_stmt(ain, e, warnings)?;
                    self.mark(end_label);
                } else {
                    self.mark(else_label);
                }
            }
            Stmt::While { cond, body } => {
                let top = self.new_label();
                let end = self.new_label();
                self.mark(top);
                self.emit_expr(ain, cond)?;
                self.ops.push(EOp::JumpIfz(end));
                self.loop_stack.push(LoopCtx { break_label: end, continue_label: top });
                self.emit_stmt(ain, body, warnings)?;
                self.loop_stack.pop();
                self.ops.push(EOp::Jump(top));
                self.mark(end);
            }
            Stmt::DoWhile { body, cond } => {
                let top = self.new_label();
                let test = self.new_label();
                let end = self.new_label();
                self.ops.push(EOp::Jump(test));
                self.mark(top);
                self.loop_stack.push(LoopCtx { break_label: end, continue_label: test });
                self.emit_stmt(ain, body, warnings)?;
                self.loop_stack.pop();
                self.mark(test);
                self.emit_expr(ain, cond)?;
                self.ops.push(EOp::JumpIfnz(top));
                self.mark(end);
            }
            Stmt::For { init, cond, step, body } => {
                let test = self.new_label();
                let incr = self.new_label();
                let body_label = self.new_label();
                let end = self.new_label();
                self.emit_stmt(ain, init, warnings)?;
                self.ops.push(EOp::Jump(test));
                self.mark(incr);
                if let Some(st) = step {
                    self.emit_expr(ain, st)?;
                    self.push(Opcode::Pop {});
                }
                self.ops.push(EOp::Jump(test));
                self.mark(body_label);
                self.loop_stack.push(LoopCtx { break_label: end, continue_label: incr });
                self.emit_stmt(ain, body, warnings)?;
                self.loop_stack.pop();
                self.ops.push(EOp::Jump(incr));
                self.mark(test);
                match cond {
                    Some(c) => self.emit_expr(ain, c)?,
                    None => self.push(Opcode::Push { val: IntArg(1) }),
                }
                self.ops.push(EOp::JumpIfz(end));
                self.ops.push(EOp::Jump(body_label));
                self.mark(end);
            }
            Stmt::Switch { subject, body } => {
                warnings.push(Warning::new("switch statement not lowered to a jump table; cases run unconditionally in source order"));
                self.emit_expr(ain, subject)?;
                self.push(Opcode::Pop {});
                self.emit_stmt(ain, body, warnings)?;
            }
            Stmt::Case(_) | Stmt::Default => {}
            Stmt::Return(value) => {
                if let Some(e) = value {
                    self.emit_expr(ain, e)?;
                    if e.ty.is_ref() {
                        self.push(self.op_dup1());
                        self.push(Opcode::SpInc {});
                    }
                }
                self.push(Opcode::Return {});
            }
            Stmt::Break => {
                let Some(l) = self.loop_stack.last().map(|c| c.break_label) else {
                    return Err(Error::invalid_input("break outside a loop"));
                };
                self.ops.push(EOp::Jump(l));
            }
            Stmt::Continue => {
                let Some(l) = self.loop_stack.last().map(|c| c.continue_label) else {
                    return Err(Error::invalid_input("continue outside a loop"));
                };
                self.ops.push(EOp::Jump(l));
            }
            Stmt::Goto(name) => {
                let l = self.named_label(name.as_str());
                self.ops.push(EOp::Jump(l));
            }
            Stmt::Label(name, inner) => {
                let l = self.named_label(name.as_str());
                self.mark(l);
                self.emit_stmt(ain, inner, warnings)?;
            }
            Stmt::Message { text, call } => {
                let r = {
                    if let Some(i) = ain.messages.iter().position(|m| m.as_str() == text.as_str()) {
                        crate::types::RefMessage(i)
                    } else {
                        ain.messages.push(text.clone());
                        crate::types::RefMessage(ain.messages.len() - 1)
                    }
                };
                self.push(Opcode::_Msg { msg: r });
                if let Some(c) = call {
                    self.emit_expr(ain, c)?;
                    self.push(Opcode::Pop {});
                }
            }
            Stmt::RAssign { lhs, rhs } => {
                self.emit_lvalue(ain, lhs)?;
                self.emit_expr(ain, rhs)?;
                self.push(Opcode::Assign {});
            }
            Stmt::Assert { cond, rendered_source } => {
                self.emit_expr(ain, cond)?;
                let file = if let Some(i) = ain.filenames.iter().position(|f| f.as_str() == "<jaf>") {
                    crate::types::RefFile(i)
                } else {
                    ain.filenames.push(crate::Str::from("<jaf>"));
                    crate::types::RefFile(ain.filenames.len() - 1)
                };
                let msg = {
                    ain.messages.push(rendered_source.clone());
                    crate::types::RefMessage(ain.messages.len() - 1)
                };
                self.push(Opcode::Assert { file, line: IntArg(0), msg });
            }
            Stmt::FileBoundary(_) | Stmt::Nop => {}
        }
        Ok(())
    }

    fn emit_block(&mut self, ain: &mut AinFile, b: &Block, warnings: &mut Vec<Warning>) -> Result<()> {
        for s in &b.stmts {
            self.emit_stmt(ain, s, warnings)?;
        }
        for slot in b.delete_vars.iter().rev() {
            self.emit_destroy(*slot);
        }
        Ok(())
    }

    fn emit_destroy(&mut self, slot: LocalSlot) {
        self.push(Opcode::PushLocalPage {});
        self.push(Opcode::Push { val: IntArg(slot.0 as i32) });
        self.push(Opcode::Delete {});
    }

    fn emit_default_return(&mut self, ty: &AinType) {
        match &ty.tag {
            AinTypeTag::Void => {}
            AinTypeTag::Float => self.push(Opcode::FPush { val: FloatArg(0.0) }),
            AinTypeTag::String => self.push(Opcode::SPush { val: crate::types::RefString(0) }),
            AinTypeTag::Struct(_) | AinTypeTag::Iface(_) | AinTypeTag::FuncType(_) | AinTypeTag::Delegate(_) | AinTypeTag::Array => {
                self.push(Opcode::Push { val: IntArg(-1) })
            }
            _ => self.push(Opcode::Push { val: IntArg(0) }),
        }
        self.push(Opcode::Return {});
    }

    /// Two-pass layout: compute each op's byte width to place labels, then
    /// resolve every jump against the now-known addresses and write.
    fn layout(self, base_addr: u32) -> Result<Vec<u8>> {
        let mut addr = base_addr;
        let mut label_addr: HashMap<u32, u32> = HashMap::new();
        let placeholder_jump = Opcode::Jump { target: Addr(0) };
        let placeholder_width = opcode_width(&placeholder_jump);
        let placeholder_dgcall = Opcode::DgCall { dg_slot: IntArg(0), end: Addr(0) };
        let dgcall_width = opcode_width(&placeholder_dgcall);

        for op in &self.ops {
            match op {
                EOp::Op(o) => addr += opcode_width(o),
                EOp::JumpIfz(_) | EOp::JumpIfnz(_) | EOp::Jump(_) => addr += placeholder_width,
                EOp::DgCall { .. } => addr += dgcall_width,
                EOp::Mark(LabelId(id)) => {
                    label_addr.insert(*id, addr);
                }
            }
        }

        let resolve = |l: LabelId| -> Result<Addr> {
            label_addr
                .get(&l.0)
                .copied()
                .map(Addr)
                .ok_or_else(|| Error::invalid_input("unresolved internal jump label"))
        };

        let mut out = Vec::new();
        for op in &self.ops {
            match op {
                EOp::Op(o) => o.write(&mut out)?,
                EOp::JumpIfz(l) => Opcode::Ifz { target: resolve(*l)? }.write(&mut out)?,
                EOp::JumpIfnz(l) => Opcode::Ifnz { target: resolve(*l)? }.write(&mut out)?,
                EOp::Jump(l) => Opcode::Jump { target: resolve(*l)? }.write(&mut out)?,
                EOp::DgCall { dg_slot, end } => Opcode::DgCall { dg_slot: *dg_slot, end: resolve(*end)? }.write(&mut out)?,
                EOp::Mark(_) => {}
            }
        }
        Ok(out)
    }
}

fn opcode_width(op: &Opcode) -> u32 {
    let mut buf = Vec::new();
    op.write(&mut buf).expect("in-memory write cannot fail");
    buf.len() as u32
}

fn companion_allocator(ain: &AinFile, ctor: RefFunction) -> Option<RefFunction> {
    let name = format!("{}2", ain.functions[ctor.0].name);
    ain.function_by_name(&name).map(|f| f.findex)
}

fn emit_function(ain: &mut AinFile, findex: RefFunction, body: &Option<Block>, return_type: &AinType, warnings: &mut Vec<Warning>) -> Result<()> {
    let base_addr = ain.code.len() as u32;
    let mut fe = FuncEmitter::new(ain.version_major);
    fe.push(Opcode::Func { func: findex });

    if ain.structs.iter().any(|s| s.constructor == Some(findex)) {
        if let Some(alloc_fn) = companion_allocator(ain, findex) {
            fe.push(Opcode::CallFunc { func: alloc_fn });
        }
    }

    if let Some(b) = body {
        fe.emit_block(ain, b, warnings)?;
    }

    fe.emit_default_return(return_type);
    fe.push(Opcode::EndFunc { func: findex });

    let code = fe.layout(base_addr)?;
    ain.code.extend(code);
    ain.functions[findex.0].address = Some(base_addr);
    Ok(())
}

/// Run the emitter over every function/method body in the program (spec
/// §4.7). Must run after [`crate::jaf::alloc::allocate`].
pub fn emit(ain: &mut AinFile, prog: &Program) -> Result<Vec<Warning>> {
    let mut warnings = Vec::new();
    for decl in &prog.decls {
        match decl {
            TopLevel::Function { findex, body, return_type, .. } => {
                emit_function(ain, *findex, body, return_type, &mut warnings)?;
            }
            TopLevel::Struct { methods, .. } => {
                for m in methods {
                    emit_function(ain, m.findex, &m.body, &m.return_type, &mut warnings)?;
                }
            }
            _ => {}
        }
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jaf::alloc::allocate;
    use crate::jaf::analyse::analyse;
    use crate::jaf::declare::declare;
    use crate::jaf::parser::Parser;
    use crate::jaf::resolve::resolve_types;
    use crate::AinFile;

    fn compile(src: &str) -> AinFile {
        let mut ain = AinFile::new(6, 0);
        let mut p = Parser::new(src, "t.jaf", &mut ain).unwrap();
        let mut prog = p.parse_program().unwrap();
        resolve_types(&mut ain, &mut prog).unwrap();
        declare(&mut ain, &mut prog).unwrap();
        analyse(&mut ain, &mut prog).unwrap();
        allocate(&mut ain, &mut prog).unwrap();
        emit(&mut ain, &prog).unwrap();
        ain
    }

    #[test]
    fn emits_function_with_entry_address() {
        let ain = compile("int f() { return 1 + 2; }");
        let f = ain.function_by_name("f").unwrap();
        assert!(f.address.is_some());
        assert!(!ain.code.is_empty());
    }

    #[test]
    fn emits_loop_with_resolved_jumps() {
        let ain = compile("int f() { int i; for (i = 0; i < 10; i = i + 1) { } return i; }");
        let f = ain.function_by_name("f").unwrap();
        assert!(f.address.is_some());
        // A well-formed function body is readable back as a stream of opcodes.
        let mut cursor = std::io::Cursor::new(ain.code.clone());
        let mut n = 0;
        while (cursor.position() as usize) < ain.code.len() {
            Opcode::read(&mut cursor).unwrap();
            n += 1;
            if n > 10_000 {
                panic!("runaway decode");
            }
        }
    }
}
