//! The typed JAF AST (spec §3.3). Every node is a closed tagged variant with
//! a source origin; there is no inheritance-based visitor (spec §9 "Dynamic
//! dispatch") — passes match on the tag directly. Nodes are owned by a flat
//! arena ([`super::Program`]) rather than cross-referencing each other via
//! Rust references, so the declaration pass can stash indices into
//! [`crate::AinFile`] without fighting the borrow checker.

use crate::error::Span;
use crate::types::{AinType, Constant, LocalSlot, RefDelegate, RefEnum, RefFuncType, RefFunction, RefGlobal, RefLibrary, RefStruct};

/// How an identifier expression was resolved by the analyser. Starts as
/// `Unresolved` straight out of the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentKind {
    Unresolved,
    Local(LocalSlot),
    Global(RefGlobal),
    Member(crate::types::RefMember),
    Const(Constant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
    /// `&name`: take the address of a named function (produces a `function`
    /// or `method`-typed value, spec §4.3).
    AddrOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Lte,
    Gte,
    Eq,
    NotEq,
    RefEq,
    RefNotEq,
    LAnd,
    LOr,
    BAnd,
    BOr,
    BXor,
    Assign,
    PlusA,
    MinusA,
    MulA,
    DivA,
    ModA,
    AndA,
    OrA,
    XorA,
    /// sprintf-like `%`; tag selector for the right operand is derived at
    /// analysis time from its type (spec §4.5).
    Mod_,
}

/// The call target kind resolved by the analyser (spec §3.3 "call").
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    Unresolved(crate::Str),
    Function(RefFunction),
    Syscall(crate::types::RefSyscall),
    Hll { library: RefLibrary, function: crate::types::RefHllFunction },
    /// Method call on a receiver expression, dispatch resolved to a concrete
    /// struct method or, for v11+, a method number.
    Method(RefFunction),
    Interface { iface: RefStruct, method_no: u32 },
    /// A value of `functype`/`delegate` type being invoked.
    FunctionValue,
    /// A fixed-arity array/string builtin (spec §4.5).
    Builtin(&'static str),
    Super,
    New(RefStruct),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub span: Span,
    pub ty: AinType,
    pub kind: ExprKind,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i32),
    LongLit(i64),
    FloatLit(f32),
    BoolLit(bool),
    StringLit(crate::Str),
    Null,
    This,
    Super,
    Ident {
        name: crate::Str,
        kind: IdentKind,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        else_: Box<Expr>,
    },
    Call {
        target: CallTarget,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    Cast {
        to: AinType,
        inner: Box<Expr>,
    },
    /// `obj.field`, `obj.method`, or (after property rewriting, spec §4.5)
    /// still tagged `Field`/`Method` but pointed at a getter/setter pair.
    Member {
        receiver: Box<Expr>,
        name: crate::Str,
        kind: MemberKind,
    },
    /// `&Struct::method` (spec §4.5 "Method vs. function distinction").
    /// Typed `method` once resolved, distinct from `&free_fn` (typed
    /// `function`, an `Unary{AddrOf}` node). The struct's methods aren't
    /// registered as functions until the declaration pass runs (spec §4.4
    /// pass 2), which is after parsing finishes, so resolution happens in
    /// the analyser rather than the parser (unlike `new Type(...)`, whose
    /// struct name is already registered by the time it's parsed).
    MethodRef {
        struct_name: crate::Str,
        method_name: crate::Str,
        target: Option<RefFunction>,
    },
    Sequence(Vec<Expr>),
    Subscript {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    /// A hidden local introduced to own the result of `new`/a ref-returning
    /// call for the duration of the containing statement (spec §4.5/§4.7).
    DummyRef {
        slot: LocalSlot,
        init: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    Field(crate::types::RefMember),
    Method(RefFunction),
    /// Property access rewritten to a getter/setter pair (spec §4.5).
    Property { getter: RefFunction, setter: Option<RefFunction> },
    Unresolved,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: crate::Str,
    pub ty: AinType,
    pub slot: Option<LocalSlot>,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    VarDecl(Vec<VarDecl>),
    Block(Block),
    If {
        cond: Expr,
        then: Box<Stmt>,
        else_: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Box<Stmt>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        subject: Expr,
        body: Box<Stmt>,
    },
    Case(Constant),
    Default,
    Return(Option<Expr>),
    Break,
    Continue,
    Goto(crate::Str),
    Label(crate::Str, Box<Stmt>),
    /// `"literal text" functioncall();` (spec §3.3 "message statement").
    Message {
        text: crate::Str,
        call: Option<Expr>,
    },
    /// `lhs <- rhs;` reference assignment.
    RAssign {
        lhs: Expr,
        rhs: Expr,
    },
    Assert {
        cond: Expr,
        rendered_source: crate::Str,
    },
    /// A file-boundary marker inserted between concatenated JAF inputs, used
    /// by diagnostics to attribute a span to the right source file.
    FileBoundary(crate::Str),
    Nop,
}

/// A compound statement plus the list of locals the emitter must destroy, in
/// declaration order, on every exit path from this scope (spec §4.5/§9
/// "Reference types and scoped destruction"). The emitter walks this in
/// reverse (LIFO) at each exit.
#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub delete_vars: Vec<LocalSlot>,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>) -> Self {
        Block {
            stmts,
            delete_vars: Vec::new(),
        }
    }
}

/// One parsed top-level declaration. Struct/interface/functype/delegate
/// declarations are registered in [`crate::AinFile`] immediately during
/// parsing (spec §4.3); this variant remains in the AST only so the later
/// passes can still walk member/method bodies.
#[derive(Debug, Clone)]
pub enum TopLevel {
    GlobalVar(VarDecl),
    Function {
        /// Patched in by the declaration pass once the function is
        /// registered in [`crate::AinFile`]; `RefFunction(0)` (the reserved
        /// null entry) straight out of the parser.
        findex: RefFunction,
        name: crate::Str,
        return_type: AinType,
        params: Vec<VarDecl>,
        body: Option<Block>,
    },
    Struct {
        strct: RefStruct,
        methods: Vec<Method>,
    },
    FuncTypeDecl(RefFuncType),
    DelegateDecl(RefDelegate),
    EnumDecl(RefEnum),
}

/// A struct member function parsed alongside its enclosing `struct`/
/// `interface` body; flattened into a `StructName@method`-qualified
/// top-level [`crate::types::Function`] by the declaration pass.
#[derive(Debug, Clone)]
pub struct Method {
    pub findex: RefFunction,
    pub name: crate::Str,
    pub return_type: AinType,
    pub params: Vec<VarDecl>,
    pub body: Option<Block>,
}

/// The whole parsed translation unit: every top-level declaration from every
/// JAF file given on the command line, in file order (spec §5 ordering
/// guarantees: "later files see declarations from earlier files").
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub decls: Vec<TopLevel>,
}
