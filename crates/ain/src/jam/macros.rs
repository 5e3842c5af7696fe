//! Pseudo-op / macro expansion table (spec §4.2). Each macro that actually
//! emits instructions ("MACRO" in `asm.c`'s terms) is modelled here as an
//! expansion function from its resolved operands to a fixed [`Opcode`]
//! sequence; the handful that only mutate a side table instead of emitting
//! code (`CASE`, `STRCASE`, `DEFAULT`, `SETSTR`, `SETMSG`) are handled
//! directly by [`super::assembler`] since they have no bytes of their own.

use crate::opcodes::{Addr, FloatArg, IntArg, Opcode};
use crate::types::{RefFile, RefFunction, RefMessage, RefString, RefStruct};

/// Every macro mnemonic the assembler recognises, grouped the way `asm.c`
/// does: all but the first five expand into one or more real opcodes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Macro {
    Case,
    StrCase,
    Default,
    SetStr,
    SetMsg,
    Msg,
    LocalRef,
    GlobalRef,
    LocalRefRef,
    GlobalRefRef,
    LocalInc,
    LocalInc2,
    LocalInc3,
    LocalDec,
    LocalDec2,
    LocalDec3,
    LocalPlusA,
    LocalMinusA,
    LocalAssign,
    LocalAssign2,
    FLocalAssign,
    StackLocalAssign,
    SLocalAssign,
    LocalDelete,
    LocalCreate,
    GlobalInc,
    GlobalDec,
    GlobalAssign,
    FGlobalAssign,
    StructRef,
    StructRefRef,
    StructInc,
    StructDec,
    StructAssign,
    FStructAssign,
    PushVMethod,
}

impl Macro {
    pub fn mnemonic(self) -> &'static str {
        use Macro::*;
        match self {
            Case => ".CASE",
            StrCase => ".STRCASE",
            Default => ".DEFAULT",
            SetStr => ".SETSTR",
            SetMsg => ".SETMSG",
            Msg => ".MSG",
            LocalRef => ".LOCALREF",
            GlobalRef => ".GLOBALREF",
            LocalRefRef => ".LOCALREFREF",
            GlobalRefRef => ".GLOBALREFREF",
            LocalInc => ".LOCALINC",
            LocalInc2 => ".LOCALINC2",
            LocalInc3 => ".LOCALINC3",
            LocalDec => ".LOCALDEC",
            LocalDec2 => ".LOCALDEC2",
            LocalDec3 => ".LOCALDEC3",
            LocalPlusA => ".LOCALPLUSA",
            LocalMinusA => ".LOCALMINUSA",
            LocalAssign => ".LOCALASSIGN",
            LocalAssign2 => ".LOCALASSIGN2",
            FLocalAssign => ".F_LOCALASSIGN",
            StackLocalAssign => ".STACK_LOCALASSIGN",
            SLocalAssign => ".S_LOCALASSIGN",
            LocalDelete => ".LOCALDELETE",
            LocalCreate => ".LOCALCREATE",
            GlobalInc => ".GLOBALINC",
            GlobalDec => ".GLOBALDEC",
            GlobalAssign => ".GLOBALASSIGN",
            FGlobalAssign => ".F_GLOBALASSIGN",
            StructRef => ".STRUCTREF",
            StructRefRef => ".STRUCTREFREF",
            StructInc => ".STRUCTINC",
            StructDec => ".STRUCTDEC",
            StructAssign => ".STRUCTASSIGN",
            FStructAssign => ".F_STRUCTASSIGN",
            PushVMethod => ".PUSHVMETHOD",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        use Macro::*;
        Some(match s {
            ".CASE" => Case,
            ".STRCASE" => StrCase,
            ".DEFAULT" => Default,
            ".SETSTR" => SetStr,
            ".SETMSG" => SetMsg,
            ".MSG" => Msg,
            ".LOCALREF" => LocalRef,
            ".GLOBALREF" => GlobalRef,
            ".LOCALREFREF" => LocalRefRef,
            ".GLOBALREFREF" => GlobalRefRef,
            ".LOCALINC" => LocalInc,
            ".LOCALINC2" => LocalInc2,
            ".LOCALINC3" => LocalInc3,
            ".LOCALDEC" => LocalDec,
            ".LOCALDEC2" => LocalDec2,
            ".LOCALDEC3" => LocalDec3,
            ".LOCALPLUSA" => LocalPlusA,
            ".LOCALMINUSA" => LocalMinusA,
            ".LOCALASSIGN" => LocalAssign,
            ".LOCALASSIGN2" => LocalAssign2,
            ".F_LOCALASSIGN" => FLocalAssign,
            ".STACK_LOCALASSIGN" => StackLocalAssign,
            ".S_LOCALASSIGN" => SLocalAssign,
            ".LOCALDELETE" => LocalDelete,
            ".LOCALCREATE" => LocalCreate,
            ".GLOBALINC" => GlobalInc,
            ".GLOBALDEC" => GlobalDec,
            ".GLOBALASSIGN" => GlobalAssign,
            ".F_GLOBALASSIGN" => FGlobalAssign,
            ".STRUCTREF" => StructRef,
            ".STRUCTREFREF" => StructRefRef,
            ".STRUCTINC" => StructInc,
            ".STRUCTDEC" => StructDec,
            ".STRUCTASSIGN" => StructAssign,
            ".F_STRUCTASSIGN" => FStructAssign,
            ".PUSHVMETHOD" => PushVMethod,
            _ => return None,
        })
    }

    /// True for the five pseudo-ops that only mutate a side table (switch
    /// cases, the string/message pools) and emit no instructions at all.
    pub fn is_table_only(self) -> bool {
        matches!(self, Macro::Case | Macro::StrCase | Macro::Default | Macro::SetStr | Macro::SetMsg)
    }
}

fn push(n: i32) -> Opcode {
    Opcode::Push { val: IntArg(n) }
}

/// Expand a macro that emits instructions into its fixed opcode sequence.
/// `v14` selects the generalised `X_*` family (spec §4.7) for the handful of
/// macros whose expansion changes shape on file version 14+.
/// `args` holds already-*resolved* operands in the macro's declared order
/// (spec §4.2 names the operand kinds per pseudo-op); callers (the
/// assembler) are responsible for resolving names before calling this.
pub fn expand(op: Macro, args: &MacroArgs, v14: bool) -> Vec<Opcode> {
    use Macro::*;
    match op {
        Msg => vec![Opcode::_Msg { msg: args.msg() }],
        LocalRef => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            if v14 { Opcode::XRef { n: IntArg(1) } } else { Opcode::Ref {} },
        ],
        GlobalRef => vec![
            Opcode::PushGlobalPage {},
            push(args.int(0)),
            if v14 { Opcode::XRef { n: IntArg(1) } } else { Opcode::Ref {} },
        ],
        LocalRefRef => vec![Opcode::PushLocalPage {}, push(args.int(0)), Opcode::RefRef {}],
        GlobalRefRef => vec![Opcode::PushGlobalPage {}, push(args.int(0)), Opcode::RefRef {}],
        LocalInc => vec![Opcode::PushLocalPage {}, push(args.int(0)), Opcode::Inc {}],
        LocalDec => vec![Opcode::PushLocalPage {}, push(args.int(0)), Opcode::Dec {}],
        LocalInc2 => {
            let mut v = vec![Opcode::PushLocalPage {}, push(args.int(0))];
            v.extend(incdec2(true, v14));
            v
        }
        LocalDec2 => {
            let mut v = vec![Opcode::PushLocalPage {}, push(args.int(0))];
            v.extend(incdec2(false, v14));
            v
        }
        LocalInc3 => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            Opcode::XDup { n: IntArg(2) },
            Opcode::Inc {},
            Opcode::Pop {},
            Opcode::Pop {},
        ],
        LocalDec3 => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            Opcode::XDup { n: IntArg(2) },
            Opcode::Dec {},
            Opcode::Pop {},
            Opcode::Pop {},
        ],
        LocalPlusA => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            push(args.int(1)),
            Opcode::PlusA {},
            Opcode::Pop {},
        ],
        LocalMinusA => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            push(args.int(1)),
            Opcode::MinusA {},
            Opcode::Pop {},
        ],
        LocalAssign => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            push(args.int(1)),
            if v14 { Opcode::XAssign { n: IntArg(1) } } else { Opcode::Assign {} },
            Opcode::Pop {},
        ],
        LocalAssign2 => vec![
            Opcode::PushLocalPage {},
            Opcode::Swap {},
            push(args.int(0)),
            Opcode::Swap {},
            Opcode::Assign {},
        ],
        FLocalAssign => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            Opcode::FPush { val: args.float(1) },
            Opcode::FAssign {},
            Opcode::Pop {},
        ],
        StackLocalAssign => vec![
            Opcode::PushLocalPage {},
            push(args.int(0)),
            Opcode::Ref {},
            Opcode::Delete {},
            Opcode::PushLocalPage {},
            Opcode::Swap {},
            push(args.int(0)),
            Opcode::Swap {},
            Opcode::Assign {},
        ],
        SLocalAssign => {
            if v14 {
                vec![
                    Opcode::PushLocalPage {},
                    push(args.int(0)),
                    Opcode::XDup { n: IntArg(2) },
                    Opcode::XRef { n: IntArg(1) },
                    Opcode::Delete {},
                    Opcode::SPush { val: args.string(1) },
                    Opcode::XAssign { n: IntArg(1) },
                    Opcode::Pop {},
                ]
            } else {
                vec![
                    Opcode::PushLocalPage {},
                    push(args.int(0)),
                    Opcode::Ref {},
                    Opcode::SPush { val: args.string(1) },
                    Opcode::SAssign {},
                    Opcode::Delete {},
                ]
            }
        }
        LocalDelete => {
            let mut v = vec![Opcode::PushLocalPage {}, push(args.int(0))];
            v.extend(delete_slot(v14));
            v
        }
        LocalCreate => {
            let mut v = vec![Opcode::PushLocalPage {}, push(args.int(0))];
            v.extend(create_slot(args.strct(1), v14));
            v
        }
        GlobalInc => vec![Opcode::PushGlobalPage {}, push(args.int(0)), Opcode::Inc {}],
        GlobalDec => vec![Opcode::PushGlobalPage {}, push(args.int(0)), Opcode::Dec {}],
        GlobalAssign => vec![
            Opcode::PushGlobalPage {},
            push(args.int(0)),
            push(args.int(1)),
            if v14 { Opcode::XAssign { n: IntArg(1) } } else { Opcode::Assign {} },
            Opcode::Pop {},
        ],
        FGlobalAssign => vec![
            Opcode::PushGlobalPage {},
            push(args.int(0)),
            Opcode::FPush { val: args.float(1) },
            Opcode::FAssign {},
            Opcode::Pop {},
        ],
        StructRef => vec![
            Opcode::PushStructPage {},
            push(args.int(0)),
            if v14 { Opcode::XRef { n: IntArg(1) } } else { Opcode::Ref {} },
        ],
        StructRefRef => vec![Opcode::PushStructPage {}, push(args.int(0)), Opcode::RefRef {}],
        StructInc => vec![Opcode::PushStructPage {}, push(args.int(0)), Opcode::Inc {}],
        StructDec => vec![Opcode::PushStructPage {}, push(args.int(0)), Opcode::Dec {}],
        StructAssign => vec![
            Opcode::PushStructPage {},
            push(args.int(0)),
            push(args.int(1)),
            if v14 { Opcode::XAssign { n: IntArg(1) } } else { Opcode::Assign {} },
            Opcode::Pop {},
        ],
        FStructAssign => vec![
            Opcode::PushStructPage {},
            push(args.int(0)),
            Opcode::FPush { val: args.float(1) },
            Opcode::FAssign {},
            Opcode::Pop {},
        ],
        PushVMethod => vec![
            Opcode::PushStructPage {},
            push(args.int(0)),
            Opcode::DupU2 {},
            push(args.int(1)),
            Opcode::Ref {},
            Opcode::Swap {},
            push(args.int(2)),
            Opcode::Add {},
            Opcode::Ref {},
        ],
        Case | StrCase | Default | SetStr | SetMsg => {
            unreachable!("table-only pseudo-op {op:?} has no instruction expansion")
        }
    }
}

fn incdec2(inc: bool, v14: bool) -> Vec<Opcode> {
    let step = if inc { Opcode::Inc {} } else { Opcode::Dec {} };
    if v14 {
        vec![
            Opcode::XDup { n: IntArg(2) },
            Opcode::XRef { n: IntArg(1) },
            Opcode::XMov { n: IntArg(3), m: IntArg(1) },
            step,
            Opcode::Pop {},
        ]
    } else {
        vec![
            Opcode::Dup2 {},
            Opcode::Ref {},
            Opcode::DupX2 {},
            Opcode::Pop {},
            step,
            Opcode::Pop {},
        ]
    }
}

fn delete_slot(v14: bool) -> Vec<Opcode> {
    if v14 {
        vec![
            Opcode::XDup { n: IntArg(2) },
            Opcode::XRef { n: IntArg(1) },
            Opcode::Delete {},
            push(-1),
            Opcode::XAssign { n: IntArg(1) },
            Opcode::Pop {},
        ]
    } else {
        vec![
            Opcode::Dup2 {},
            Opcode::Ref {},
            Opcode::Delete {},
            push(-1),
            Opcode::Assign {},
            Opcode::Pop {},
        ]
    }
}

fn create_slot(strct: crate::types::RefStruct, v14: bool) -> Vec<Opcode> {
    if v14 {
        vec![
            Opcode::XDup { n: IntArg(2) },
            Opcode::XRef { n: IntArg(1) },
            Opcode::Delete {},
            Opcode::New { strct },
            Opcode::XAssign { n: IntArg(1) },
            Opcode::Pop {},
        ]
    } else {
        vec![
            Opcode::Dup2 {},
            Opcode::Ref {},
            Opcode::Delete {},
            Opcode::Dup2 {},
            Opcode::New { strct },
            Opcode::Assign {},
            Opcode::Pop {},
            Opcode::Pop {},
            Opcode::Pop {},
        ]
    }
}

/// Already-resolved operands for one macro invocation, in declared order.
/// The assembler builds one of these after running name/label resolution
/// (spec §4.2) and before calling [`expand`].
#[derive(Debug, Clone, Default)]
pub struct MacroArgs {
    pub ints: Vec<i32>,
    pub floats: Vec<f32>,
    pub strings: Vec<RefString>,
    pub msg: Option<RefMessage>,
    pub strct: Option<RefStruct>,
    pub file: Option<RefFile>,
    pub func: Option<RefFunction>,
    pub addr: Option<Addr>,
}

impl MacroArgs {
    fn int(&self, i: usize) -> i32 {
        self.ints[i]
    }
    fn float(&self, i: usize) -> FloatArg {
        FloatArg(self.floats[i])
    }
    fn string(&self, i: usize) -> RefString {
        self.strings[i]
    }
    fn strct(&self, _i: usize) -> RefStruct {
        self.strct.expect("macro requires a struct operand")
    }
    fn msg(&self) -> RefMessage {
        self.msg.expect("macro requires a message operand")
    }
}

/// The semantic role of one macro operand, shared by the assembler (to
/// resolve JAM text into [`MacroArgs`]) and the disassembler (to re-fold a
/// real opcode sequence back into a macro line and name its operands).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Operand {
    LocalVar,
    GlobalVar,
    StructMember,
    IntLit,
    FloatLit,
    StringLit,
    MsgLit,
    StructName,
}

/// The declared operand list for a macro, in source order (spec §4.2's
/// per-pseudo-op operand kinds).
pub fn operand_kinds(op: Macro) -> &'static [Operand] {
    use Macro::*;
    use Operand::*;
    match op {
        Msg => &[MsgLit],
        LocalRef | LocalRefRef | LocalInc | LocalDec | LocalInc2 | LocalInc3 | LocalDec2 | LocalDec3
        | LocalAssign2 | StackLocalAssign | LocalDelete => &[LocalVar],
        GlobalRef | GlobalRefRef | GlobalInc | GlobalDec => &[GlobalVar],
        LocalPlusA | LocalMinusA | LocalAssign => &[LocalVar, IntLit],
        FLocalAssign => &[LocalVar, FloatLit],
        SLocalAssign => &[LocalVar, StringLit],
        LocalCreate => &[LocalVar, StructName],
        GlobalAssign => &[GlobalVar, IntLit],
        FGlobalAssign => &[GlobalVar, FloatLit],
        StructRef | StructRefRef | StructInc | StructDec => &[StructMember],
        StructAssign => &[StructMember, IntLit],
        FStructAssign => &[StructMember, FloatLit],
        PushVMethod => &[StructMember, IntLit, IntLit],
        Case | StrCase | Default | SetStr | SetMsg => &[],
    }
}

/// Placeholder operands sized generously enough to drive [`expand`] for any
/// macro, used by [`byte_width`] when only the byte count (not the actual
/// emitted bytes) is wanted — e.g. the assembler's label-address first pass,
/// which must know instruction widths before operand names resolve.
pub fn dummy_args() -> MacroArgs {
    MacroArgs {
        ints: vec![0; 4],
        floats: vec![0.0; 2],
        strings: vec![RefString(0); 2],
        msg: Some(RefMessage(0)),
        strct: Some(RefStruct(0)),
        file: Some(RefFile(0)),
        func: Some(RefFunction(0)),
        addr: Some(Addr(0)),
    }
}

/// Compute a macro's emitted byte width for a given file version by actually
/// encoding its expansion (spec §4.1's "byte order is little-endian
/// throughout" + the fixed 2-byte-opcode/4-byte-operand shape makes this
/// exact rather than a magic constant table; the "Macro soundness" testable
/// property (spec §8) follows directly since both sides come from the same
/// opcode encoder).
pub fn byte_width(op: Macro, args: &MacroArgs, major: u8) -> u32 {
    if op.is_table_only() {
        return 0;
    }
    let v14 = major >= 14;
    let mut total = 0u32;
    for instr in expand(op, args, v14) {
        let mut buf = Vec::new();
        instr.write(&mut buf).expect("in-memory write cannot fail");
        total += buf.len() as u32;
    }
    total
}
