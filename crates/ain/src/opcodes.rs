//! The stack-machine instruction set (spec §2, §4.7). Unlike a register VM,
//! every opcode here operates on an implicit operand stack; fields only carry
//! the *extra* data an instruction needs beyond what it pops (a page-relative
//! slot number, a pool index, a jump target, ...).
//!
//! [`Opcode::read`]/[`Opcode::write`]/[`Opcode::name`]/[`Opcode::from_name`]
//! are generated by `#[derive(OpcodeHelper)]` from the field type names below;
//! see `ain-derive` for the codegen and keep field type spelling in sync with it.

use ain_derive::OpcodeHelper;

use crate::types::{
    RefFile, RefFunction, RefGlobal, RefHllFunction, RefLibrary, RefMessage, RefString,
    RefStruct, RefSwitch, RefSyscall,
};

/// A byte offset into [`crate::AinFile::code`], used by every branch/label operand.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Ord, PartialOrd)]
pub struct Addr(pub u32);

/// A page-relative local variable slot, pushed by `PUSH` right after
/// `PUSHLOCALPAGE`/`PUSHGLOBALPAGE`/`PUSHSTRUCTPAGE` rather than addressed
/// by a dedicated operand kind (spec §4.2 "local"/"global" resolution).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Ord, PartialOrd)]
pub struct IntArg(pub i32);

/// An f32 literal pushed by `F_PUSH`, stored on disk as its raw bit pattern.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct FloatArg(pub f32);

/// `CALLHLL`'s trailing type-parameter argument (v11+ only, spec §4.7): the
/// element-type tag of the array involved in the call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default, Ord, PartialOrd)]
pub struct TypeArg(pub i32);

#[derive(Debug, Clone, PartialEq, OpcodeHelper)]
pub enum Opcode {
    /// No-op.
    Nop {},

    // ---- stack manipulation --------------------------------------------
    /// Push an int literal.
    Push { val: IntArg },
    /// Push an f32 literal.
    FPush { val: FloatArg },
    /// Push a string pool index.
    SPush { val: RefString },
    /// Discard the top of the stack.
    Pop {},
    /// Swap the top two stack entries.
    Swap {},
    /// Duplicate the top stack entry.
    Dup {},
    /// Duplicate the top two stack entries.
    Dup2 {},
    /// `a b u -- a b u a b` style duplicate-and-rotate used by `.LOCALINC2`/`.LOCALDEC2`.
    DupX2 {},
    /// Unsigned variant of [`Opcode::DupX2`].
    DupU2 {},
    /// Duplicate the top `n` stack entries (v14+ generalised dup, spec §4.7).
    XDup { n: IntArg },
    /// Rotate the top `n+m` stack entries (v14+ generalised move).
    XMov { n: IntArg, m: IntArg },

    // ---- page/variable addressing --------------------------------------
    /// Push the base of the current function's local variable page.
    PushLocalPage {},
    /// Push the base of the global variable page.
    PushGlobalPage {},
    /// Push the base of the current struct instance's member page, from `this`.
    PushStructPage {},

    // ---- lvalue resolution ----------------------------------------------
    /// Pop a page and a slot, push the value at that slot (classic `REF`/v14 `X_REF 1`).
    Ref {},
    /// v14+ generalised ref: dereference `n` page/slot pairs (`X_REF n`).
    XRef { n: IntArg },
    /// Pop a page and a slot, push a reference to that slot (for ref locals).
    RefRef {},
    /// Dereference a struct member at a fixed offset from the page on the stack.
    CRef { member_offset: IntArg },
    /// Pop value, page, slot; store the value at that slot.
    Assign {},
    /// v14+ generalised assign (`X_ASSIGN n`).
    XAssign { n: IntArg },
    /// Float-typed assign.
    FAssign {},
    /// String-typed assign.
    SAssign {},
    /// Pop a value, page and slot; destroy (free/decref) whatever previously lived there.
    Delete {},

    // ---- arithmetic / logic ---------------------------------------------
    Add {},
    Sub {},
    Mul {},
    Div {},
    Mod {},
    Inc {},
    Dec {},
    Lt {},
    Gt {},
    Lte {},
    Gte {},
    Equale {},
    NotE {},
    Not {},
    And {},
    Or {},
    Xor {},
    Land {},
    Lor {},
    /// `PLUSA`: compound in-place add at the lvalue addressed by the two preceding pushes.
    PlusA {},
    MinusA {},
    /// String concatenation.
    SAdd {},
    /// `S_MOD`: sprintf-like string interpolation (spec §4.5); `tag` selects the
    /// operand's runtime type on file versions <= 8 where it is pushed separately.
    SMod {},

    /// 64-bit integer variant of [`Opcode::Add`], and so on for the `LI_*` family.
    LiAdd {},
    LiSub {},
    LiMul {},
    LiDiv {},
    LiMod {},
    LiInc {},
    LiDec {},
    LiAssign {},
    LiPlusA {},
    LiMinusA {},
    LiMulA {},
    LiDivA {},
    LiModA {},
    LiAndA {},
    LiOrA {},
    LiXorA {},
    LiLshiftA {},
    LiRshiftA {},

    // ---- control flow -----------------------------------------------------
    /// Pop an int; jump to `target` if it is zero.
    Ifz { target: Addr },
    /// Pop an int; jump to `target` if it is non-zero.
    Ifnz { target: Addr },
    /// Unconditional jump.
    Jump { target: Addr },
    /// Begin a function body; `func` identifies the function whose
    /// locals/args this stretch of code belongs to (used by the disassembler's
    /// function-stack tracking, spec §4.2).
    Func { func: RefFunction },
    /// End the current function body, popping the disassembler's function stack.
    EndFunc { func: RefFunction },
    /// Pop the return value(s) already pushed and return from the current function.
    Return {},
    /// Pop an int; dispatch through the switch table `table`.
    Switch { table: RefSwitch },
    /// String-keyed variant of [`Opcode::Switch`].
    StrSwitch { table: RefSwitch },
    /// Increment the VM's "stack protect" counter so the emitted ref/aggregate
    /// survives the end of the current expression (spec §4.7 "Return").
    SpInc {},

    // ---- calls --------------------------------------------------------------
    /// Call function `func` directly; arguments are already on the stack.
    CallFunc { func: RefFunction },
    /// Call through a `functype` value pushed just before this instruction.
    CallFunc2 {},
    /// Call method `func` on the receiver addressed by the preceding page/slot
    /// pair (classic encoding) or by method number (v11+, same field reused).
    CallMethod { func: RefFunction },
    /// Call a native (engine) entrypoint.
    CallSys { syscall: RefSyscall },
    /// Call an HLL library function; `type_param` is only meaningful on v11+.
    CallHll {
        library: RefLibrary,
        function: RefHllFunction,
        type_param: TypeArg,
    },
    /// Allocate a new struct/array instance of the struct named by `strct`.
    New { strct: RefStruct },
    /// Runtime-checked downcast used for `super`/override dispatch.
    CheckUdo { strct: RefStruct },

    // ---- delegates ------------------------------------------------------
    DgSet {},
    DgAdd {},
    DgErase {},
    DgClear {},
    DgNumof {},
    DgExist {},
    DgAssign {},
    DgCopy {},
    DgNew {},
    DgNewFromMethod {},
    DgStrToMethod {},
    DgCallBegin { dg_slot: IntArg },
    DgCall { dg_slot: IntArg, end: Addr },
    DgPop {},
    DgPlusA {},
    DgMinusA {},

    // ---- array builtins (pre-v11 direct opcodes; v11+ go through CallHll) ---
    AAlloc {},
    ARealloc {},
    AFree {},
    ANumof {},
    ACopy {},
    ASort {},

    // ---- debug / misc -----------------------------------------------------
    /// Runtime assertion: pops a bool and raises with the pre-rendered
    /// source excerpt interned as `msg`, tagged with `file`/`line`.
    Assert { file: RefFile, line: IntArg, msg: RefMessage },
    /// Placeholder local used by the debugger when a name cannot be resolved.
    GetDbgDummy {},
    /// Print the message table entry `msg` (used by the `message` statement).
    _Msg { msg: RefMessage },

    // ---- scoped-destroy helpers expanded inline on versions lacking them ---
    ShLocalDelete { slot: IntArg },
    ShLocalCreate { slot: IntArg, type_param: TypeArg },
    ShLocalRef { slot: IntArg },
    ShLocalInc { slot: IntArg },
    ShLocalDec { slot: IntArg },
    ShLocalAssign { slot: IntArg, val: IntArg },
}

impl Opcode {
    /// True for the opcodes that carry a jump target the disassembler must
    /// record as a label (spec §4.2's label sweep).
    pub fn jump_targets(&self) -> Vec<Addr> {
        match self {
            Opcode::Ifz { target } | Opcode::Ifnz { target } | Opcode::Jump { target } => {
                vec![*target]
            }
            Opcode::DgCall { end, .. } => vec![*end],
            _ => Vec::new(),
        }
    }

    /// True when this opcode's byte width depends on the file version
    /// (the `X_*` generalised family only exists on v14+, spec §4.7).
    pub fn is_v14_family(&self) -> bool {
        matches!(
            self,
            Opcode::XDup { .. } | Opcode::XMov { .. } | Opcode::XRef { .. } | Opcode::XAssign { .. }
        )
    }
}
