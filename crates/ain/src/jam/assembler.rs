//! Assembles JAM text into an [`AinFile`]'s `code` buffer (spec §4.2).
//! Assembly is strictly linear: a first pass resolves label addresses from
//! instruction byte widths alone (independent of operand values), a second
//! pass resolves every other operand kind against the file model's symbol
//! tables and emits.
//!
//! Comments start with `;` and run to end of line. A line is either a bare
//! `label:` or one mnemonic/macro followed by comma-separated operands.

use std::collections::HashMap;

use crate::jam::macros::{self, Macro, MacroArgs, Operand};
use crate::opcodes::{Addr, FloatArg, IntArg, Opcode, TypeArg};
use crate::types::{
    RefFile, RefFunction, RefHllFunction, RefLibrary, RefMessage, RefString, RefStruct, RefSwitch,
    RefSyscall, Switch, SwitchCaseType,
};
use crate::{intern, AinFile, Error, Result, Span};

pub type AssembleError = Error;

/// Discard the existing code section and write a fresh one starting at 0.
pub fn assemble_replace(ain: &mut AinFile, source: &str) -> Result<()> {
    let code = assemble_body(ain, source, 0, None)?;
    ain.code = code;
    Ok(())
}

/// Append assembled code to the end of the existing code section.
pub fn assemble_append(ain: &mut AinFile, source: &str) -> Result<()> {
    let base = ain.code.len() as u32;
    let code = assemble_body(ain, source, base, None)?;
    ain.code.extend(code);
    Ok(())
}

/// Splice assembled code into an existing function's body at `offset`,
/// rewriting every address operand (function entry points, switch
/// targets, in-code jump targets) at or past the splice point by the
/// resulting relocation delta.
pub fn assemble_inject(ain: &mut AinFile, func_name: &str, offset: u32, source: &str) -> Result<()> {
    let cur_func = ain
        .function_by_name(func_name)
        .map(|f| f.findex)
        .ok_or_else(|| Error::unresolved(Span::default(), "function", func_name))?;
    let code = assemble_body(ain, source, offset, Some(cur_func))?;
    let delta = code.len() as i64;
    ain.code.splice(offset as usize..offset as usize, code);
    relocate_after(ain, offset, delta);
    Ok(())
}

fn relocate_after(ain: &mut AinFile, threshold: u32, delta: i64) {
    let bump = |a: u32| -> u32 {
        if a >= threshold {
            ((a as i64) + delta) as u32
        } else {
            a
        }
    };
    for f in &mut ain.functions {
        if let Some(addr) = f.address {
            f.address = Some(bump(addr));
        }
    }
    for sw in &mut ain.switches {
        if let Some(d) = sw.default_address {
            sw.default_address = Some(bump(d));
        }
        for (_, addr) in &mut sw.cases {
            *addr = bump(*addr);
        }
    }

    let mut out = Vec::with_capacity(ain.code.len());
    let mut cursor = std::io::Cursor::new(ain.code.clone());
    while (cursor.position() as usize) < ain.code.len() {
        let op = match Opcode::read(&mut cursor) {
            Ok(op) => op,
            Err(_) => break,
        };
        let op = match op {
            Opcode::Ifz { target } => Opcode::Ifz { target: Addr(bump(target.0)) },
            Opcode::Ifnz { target } => Opcode::Ifnz { target: Addr(bump(target.0)) },
            Opcode::Jump { target } => Opcode::Jump { target: Addr(bump(target.0)) },
            Opcode::DgCall { dg_slot, end } => Opcode::DgCall { dg_slot, end: Addr(bump(end.0)) },
            other => other,
        };
        op.write(&mut out).expect("in-memory write cannot fail");
    }
    ain.code = out;
}

#[derive(Debug, Clone)]
enum Token<'a> {
    Label(&'a str),
    Instr { mnemonic: &'a str, operands: Vec<&'a str> },
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(i) => &line[..i],
        None => line,
    }
}

fn tokenize(source: &str) -> Vec<(u32, Token<'_>)> {
    let mut out = Vec::new();
    for (lineno, raw) in source.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_suffix(':') {
            out.push((lineno as u32 + 1, Token::Label(name.trim())));
            continue;
        }
        let mut parts = line.splitn(2, char::is_whitespace);
        let mnemonic = parts.next().unwrap();
        let rest = parts.next().unwrap_or("").trim();
        let operands = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(|s| s.trim()).collect()
        };
        out.push((lineno as u32 + 1, Token::Instr { mnemonic, operands }));
    }
    out
}

fn instruction_width(major: u8, mnemonic: &str) -> Result<u32> {
    if let Some(op) = Macro::from_mnemonic(mnemonic) {
        return Ok(macros::byte_width(op, &macros::dummy_args(), major));
    }
    let zeroed = Opcode::from_name(mnemonic)
        .ok_or_else(|| Error::invalid_input(format!("unknown mnemonic '{mnemonic}'")))?;
    let mut buf = Vec::new();
    zeroed.write(&mut buf).expect("in-memory write cannot fail");
    Ok(buf.len() as u32)
}

fn assemble_body(
    ain: &mut AinFile,
    source: &str,
    base_addr: u32,
    init_func: Option<RefFunction>,
) -> Result<Vec<u8>> {
    let tokens = tokenize(source);

    let mut labels: HashMap<String, u32> = HashMap::new();
    let mut addr = base_addr;
    for (_, tok) in &tokens {
        match tok {
            Token::Label(name) => {
                labels.insert((*name).to_string(), addr);
            }
            Token::Instr { mnemonic, .. } => {
                addr += instruction_width(ain.version_major, mnemonic)?;
            }
        }
    }

    let mut code = Vec::new();
    let mut cur_func = init_func;
    for (lineno, tok) in &tokens {
        let at = Span::new("<jam>", *lineno);
        let Token::Instr { mnemonic, operands } = tok else {
            continue;
        };
        if let Some(op) = Macro::from_mnemonic(mnemonic) {
            if op.is_table_only() {
                assemble_table_op(ain, op, operands, base_addr + code.len() as u32, &at)?;
                continue;
            }
            let args = assemble_macro_args(ain, cur_func, op, operands, &at)?;
            let v14 = ain.version_major >= 14;
            for instr in macros::expand(op, &args, v14) {
                instr.write(&mut code)?;
            }
        } else {
            let instr = assemble_real_opcode(ain, cur_func, &labels, mnemonic, operands, &at)?;
            match &instr {
                Opcode::Func { func } => {
                    cur_func = Some(*func);
                    ain.functions[func.0].address = Some(base_addr + code.len() as u32);
                }
                Opcode::EndFunc { .. } => cur_func = None,
                _ => {}
            }
            instr.write(&mut code)?;
        }
    }
    Ok(code)
}

fn parse_string_lit(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    Some(out)
}

fn split_suffix(name: &str) -> (&str, usize) {
    if let Some(pos) = name.rfind('#') {
        if let Ok(n) = name[pos + 1..].parse::<usize>() {
            return (&name[..pos], n);
        }
    }
    (name, 0)
}

fn resolve_func(ain: &AinFile, raw: &str, at: &Span) -> Result<RefFunction> {
    let (name, n) = split_suffix(raw);
    ain.functions
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| RefFunction(i))
        .ok_or_else(|| Error::unresolved(at.clone(), "function", raw))
}

fn resolve_struct(ain: &AinFile, raw: &str, at: &Span) -> Result<RefStruct> {
    let (name, n) = split_suffix(raw);
    ain.structs
        .iter()
        .enumerate()
        .filter(|(_, s)| s.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| RefStruct(i))
        .ok_or_else(|| Error::unresolved(at.clone(), "struct", raw))
}

fn resolve_syscall(ain: &AinFile, raw: &str, at: &Span) -> Result<RefSyscall> {
    let (name, n) = split_suffix(raw);
    ain.syscalls
        .iter()
        .enumerate()
        .filter(|(_, s)| s.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| RefSyscall(i))
        .ok_or_else(|| Error::unresolved(at.clone(), "syscall", raw))
}

fn resolve_library(ain: &AinFile, raw: &str, at: &Span) -> Result<RefLibrary> {
    let (name, n) = split_suffix(raw);
    ain.libraries
        .iter()
        .enumerate()
        .filter(|(_, l)| l.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| RefLibrary(i))
        .ok_or_else(|| Error::unresolved(at.clone(), "library", raw))
}

fn resolve_hllfunc(ain: &AinFile, lib: RefLibrary, raw: &str, at: &Span) -> Result<RefHllFunction> {
    let (name, n) = split_suffix(raw);
    ain.libraries[lib.0]
        .functions
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| RefHllFunction(i))
        .ok_or_else(|| Error::unresolved(at.clone(), "hll function", raw))
}

fn resolve_file(ain: &mut AinFile, raw: &str) -> Result<RefFile> {
    if let Some(i) = ain.filenames.iter().position(|s| s.as_str() == raw) {
        return Ok(RefFile(i));
    }
    ain.filenames.push(crate::Str::from(raw));
    Ok(RefFile(ain.filenames.len() - 1))
}

fn resolve_local_slot(ain: &AinFile, cur_func: Option<RefFunction>, raw: &str, at: &Span) -> Result<i32> {
    let f = cur_func.ok_or_else(|| Error::invalid_input(format!("{raw}: local operand outside a FUNC body")))?;
    let (name, n) = split_suffix(raw);
    ain.functions[f.0]
        .variables
        .iter()
        .enumerate()
        .filter(|(_, v)| v.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| i as i32)
        .ok_or_else(|| Error::unresolved(at.clone(), "local", raw))
}

fn resolve_global_slot(ain: &AinFile, raw: &str, at: &Span) -> Result<i32> {
    let (name, n) = split_suffix(raw);
    ain.globals
        .iter()
        .enumerate()
        .filter(|(_, v)| v.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| i as i32)
        .ok_or_else(|| Error::unresolved(at.clone(), "global", raw))
}

fn resolve_member_slot(ain: &AinFile, cur_func: Option<RefFunction>, raw: &str, at: &Span) -> Result<i32> {
    let f = cur_func.ok_or_else(|| Error::invalid_input(format!("{raw}: struct member operand outside a FUNC body")))?;
    let strct = ain.functions[f.0]
        .parent_struct
        .ok_or_else(|| Error::invalid_input(format!("{raw}: not inside a method")))?;
    let (name, n) = split_suffix(raw);
    ain.structs[strct.0]
        .members
        .iter()
        .enumerate()
        .filter(|(_, v)| v.name.as_str() == name)
        .nth(n)
        .map(|(i, _)| i as i32)
        .ok_or_else(|| Error::unresolved(at.clone(), "struct member", raw))
}

fn resolve_switch(ain: &mut AinFile, raw: &str, case_type: SwitchCaseType) -> Result<RefSwitch> {
    let n: usize = raw
        .parse()
        .map_err(|_| Error::invalid_input(format!("bad switch index '{raw}'")))?;
    ensure_switch(ain, n, case_type);
    Ok(RefSwitch(n))
}

fn ensure_switch(ain: &mut AinFile, n: usize, case_type: SwitchCaseType) {
    while ain.switches.len() <= n {
        ain.switches.push(Switch {
            case_type,
            default_address: None,
            cases: Vec::new(),
        });
    }
}

fn intern_str(ain: &mut AinFile, raw: &str) -> Result<RefString> {
    let text = parse_string_lit(raw)
        .ok_or_else(|| Error::invalid_input(format!("expected a quoted string, got '{raw}'")))?;
    Ok(intern(&mut ain.strings, &text))
}

fn intern_msg(ain: &mut AinFile, raw: &str) -> Result<RefMessage> {
    let text = parse_string_lit(raw)
        .ok_or_else(|| Error::invalid_input(format!("expected a quoted string, got '{raw}'")))?;
    if let Some(i) = ain.messages.iter().position(|s| s.as_str() == text) {
        return Ok(RefMessage(i));
    }
    ain.messages.push(crate::Str::from(text));
    Ok(RefMessage(ain.messages.len() - 1))
}

fn assemble_table_op(ain: &mut AinFile, op: Macro, ops: &[&str], addr: u32, at: &Span) -> Result<()> {
    let need = |i: usize| -> Result<&str> {
        ops.get(i)
            .copied()
            .ok_or_else(|| Error::arity(at.clone(), format!("{} expects operand {i}", op.mnemonic())))
    };
    match op {
        Macro::Case => {
            let n: usize = need(0)?
                .parse()
                .map_err(|_| Error::invalid_input("bad switch index"))?;
            let value: i32 = need(1)?
                .parse()
                .map_err(|_| Error::invalid_input("bad case value"))?;
            ensure_switch(ain, n, SwitchCaseType::Int);
            ain.switches[n].cases.push((crate::types::Constant::Int(value), addr));
        }
        Macro::StrCase => {
            let n: usize = need(0)?
                .parse()
                .map_err(|_| Error::invalid_input("bad switch index"))?;
            let text = parse_string_lit(need(1)?)
                .ok_or_else(|| Error::invalid_input("STRCASE expects a quoted string"))?;
            ensure_switch(ain, n, SwitchCaseType::String);
            ain.switches[n].cases.push((crate::types::Constant::String(crate::Str::from(text)), addr));
        }
        Macro::Default => {
            let n: usize = need(0)?
                .parse()
                .map_err(|_| Error::invalid_input("bad switch index"))?;
            let case_type = ain.switches.get(n).map(|s| s.case_type).unwrap_or(SwitchCaseType::Int);
            ensure_switch(ain, n, case_type);
            ain.switches[n].default_address = Some(addr);
        }
        Macro::SetStr => {
            let idx: usize = need(0)?
                .parse()
                .map_err(|_| Error::invalid_input("bad string index"))?;
            let text = parse_string_lit(need(1)?)
                .ok_or_else(|| Error::invalid_input("SETSTR expects a quoted string"))?;
            let slot = ain
                .strings
                .get_mut(idx)
                .ok_or_else(|| Error::invalid_input(format!("SETSTR: index {idx} out of range")))?;
            *slot = crate::Str::from(text);
        }
        Macro::SetMsg => {
            let idx: usize = need(0)?
                .parse()
                .map_err(|_| Error::invalid_input("bad message index"))?;
            let text = parse_string_lit(need(1)?)
                .ok_or_else(|| Error::invalid_input("SETMSG expects a quoted string"))?;
            let slot = ain
                .messages
                .get_mut(idx)
                .ok_or_else(|| Error::invalid_input(format!("SETMSG: index {idx} out of range")))?;
            *slot = crate::Str::from(text);
        }
        _ => unreachable!("{op:?} is not a table-only pseudo-op"),
    }
    Ok(())
}

fn assemble_macro_args(
    ain: &mut AinFile,
    cur_func: Option<RefFunction>,
    op: Macro,
    ops: &[&str],
    at: &Span,
) -> Result<MacroArgs> {
    let kinds = macros::operand_kinds(op);
    if ops.len() != kinds.len() {
        return Err(Error::arity(
            at.clone(),
            format!("{} expects {} operand(s), got {}", op.mnemonic(), kinds.len(), ops.len()),
        ));
    }
    let n = kinds.len();
    let mut args = MacroArgs {
        ints: vec![0; n],
        floats: vec![0.0; n],
        strings: vec![RefString(0); n],
        msg: None,
        strct: None,
        file: None,
        func: None,
        addr: None,
    };
    for (i, (kind, raw)) in kinds.iter().zip(ops.iter()).enumerate() {
        match kind {
            Operand::LocalVar => args.ints[i] = resolve_local_slot(ain, cur_func, raw, at)?,
            Operand::GlobalVar => args.ints[i] = resolve_global_slot(ain, raw, at)?,
            Operand::StructMember => args.ints[i] = resolve_member_slot(ain, cur_func, raw, at)?,
            Operand::IntLit => {
                args.ints[i] = raw.parse().map_err(|_| Error::invalid_input(format!("bad int operand '{raw}'")))?
            }
            Operand::FloatLit => {
                args.floats[i] = raw
                    .trim_end_matches('f')
                    .parse()
                    .map_err(|_| Error::invalid_input(format!("bad float operand '{raw}'")))?
            }
            Operand::StringLit => args.strings[i] = intern_str(ain, raw)?,
            Operand::MsgLit => args.msg = Some(intern_msg(ain, raw)?),
            Operand::StructName => args.strct = Some(resolve_struct(ain, raw, at)?),
        }
    }
    Ok(args)
}

fn assemble_real_opcode(
    ain: &mut AinFile,
    cur_func: Option<RefFunction>,
    labels: &HashMap<String, u32>,
    mnemonic: &str,
    ops: &[&str],
    at: &Span,
) -> Result<Opcode> {
    let need = |i: usize| -> Result<&str> {
        ops.get(i)
            .copied()
            .ok_or_else(|| Error::arity(at.clone(), format!("{mnemonic} expects operand {i}")))
    };
    let int_at = |i: usize| -> Result<i32> {
        need(i)?.parse().map_err(|_| Error::invalid_input(format!("{mnemonic}: bad int operand")))
    };
    let float_at = |i: usize| -> Result<f32> {
        need(i)?
            .trim_end_matches('f')
            .parse()
            .map_err(|_| Error::invalid_input(format!("{mnemonic}: bad float operand")))
    };
    let addr_at = |i: usize| -> Result<Addr> {
        let name = need(i)?;
        labels
            .get(name)
            .copied()
            .map(Addr)
            .ok_or_else(|| Error::unresolved(at.clone(), "label", name))
    };

    Ok(match mnemonic {
        "NOP" => Opcode::Nop {},
        "PUSH" => Opcode::Push { val: IntArg(int_at(0)?) },
        "F_PUSH" => Opcode::FPush { val: FloatArg(float_at(0)?) },
        "S_PUSH" => Opcode::SPush { val: intern_str(ain, need(0)?)? },
        "POP" => Opcode::Pop {},
        "SWAP" => Opcode::Swap {},
        "DUP" => Opcode::Dup {},
        "DUP2" => Opcode::Dup2 {},
        "DUP_X2" => Opcode::DupX2 {},
        "DUP_U2" => Opcode::DupU2 {},
        "X_DUP" => Opcode::XDup { n: IntArg(int_at(0)?) },
        "X_MOV" => Opcode::XMov { n: IntArg(int_at(0)?), m: IntArg(int_at(1)?) },
        "PUSHLOCALPAGE" => Opcode::PushLocalPage {},
        "PUSHGLOBALPAGE" => Opcode::PushGlobalPage {},
        "PUSHSTRUCTPAGE" => Opcode::PushStructPage {},
        "REF" => Opcode::Ref {},
        "X_REF" => Opcode::XRef { n: IntArg(int_at(0)?) },
        "REFREF" => Opcode::RefRef {},
        "C_REF" => Opcode::CRef { member_offset: IntArg(int_at(0)?) },
        "ASSIGN" => Opcode::Assign {},
        "X_ASSIGN" => Opcode::XAssign { n: IntArg(int_at(0)?) },
        "F_ASSIGN" => Opcode::FAssign {},
        "S_ASSIGN" => Opcode::SAssign {},
        "DELETE" => Opcode::Delete {},
        "ADD" => Opcode::Add {},
        "SUB" => Opcode::Sub {},
        "MUL" => Opcode::Mul {},
        "DIV" => Opcode::Div {},
        "MOD" => Opcode::Mod {},
        "INC" => Opcode::Inc {},
        "DEC" => Opcode::Dec {},
        "LT" => Opcode::Lt {},
        "GT" => Opcode::Gt {},
        "LTE" => Opcode::Lte {},
        "GTE" => Opcode::Gte {},
        "EQUALE" => Opcode::Equale {},
        "NOTE" => Opcode::NotE {},
        "NOT" => Opcode::Not {},
        "AND" => Opcode::And {},
        "OR" => Opcode::Or {},
        "XOR" => Opcode::Xor {},
        "LAND" => Opcode::Land {},
        "LOR" => Opcode::Lor {},
        "PLUSA" => Opcode::PlusA {},
        "MINUSA" => Opcode::MinusA {},
        "S_ADD" => Opcode::SAdd {},
        "S_MOD" => Opcode::SMod {},
        "LI_ADD" => Opcode::LiAdd {},
        "LI_SUB" => Opcode::LiSub {},
        "LI_MUL" => Opcode::LiMul {},
        "LI_DIV" => Opcode::LiDiv {},
        "LI_MOD" => Opcode::LiMod {},
        "LI_INC" => Opcode::LiInc {},
        "LI_DEC" => Opcode::LiDec {},
        "LI_ASSIGN" => Opcode::LiAssign {},
        "LI_PLUSA" => Opcode::LiPlusA {},
        "LI_MINUSA" => Opcode::LiMinusA {},
        "LI_MULA" => Opcode::LiMulA {},
        "LI_DIVA" => Opcode::LiDivA {},
        "LI_MODA" => Opcode::LiModA {},
        "LI_ANDA" => Opcode::LiAndA {},
        "LI_ORA" => Opcode::LiOrA {},
        "LI_XORA" => Opcode::LiXorA {},
        "LI_LSHIFTA" => Opcode::LiLshiftA {},
        "LI_RSHIFTA" => Opcode::LiRshiftA {},
        "IFZ" => Opcode::Ifz { target: addr_at(0)? },
        "IFNZ" => Opcode::Ifnz { target: addr_at(0)? },
        "JUMP" => Opcode::Jump { target: addr_at(0)? },
        "FUNC" => Opcode::Func { func: resolve_func(ain, need(0)?, at)? },
        "ENDFUNC" => Opcode::EndFunc { func: resolve_func(ain, need(0)?, at)? },
        "RETURN" => Opcode::Return {},
        "SWITCH" => Opcode::Switch { table: resolve_switch(ain, need(0)?, SwitchCaseType::Int)? },
        "STRSWITCH" => Opcode::StrSwitch { table: resolve_switch(ain, need(0)?, SwitchCaseType::String)? },
        "SP_INC" => Opcode::SpInc {},
        "CALLFUNC" => Opcode::CallFunc { func: resolve_func(ain, need(0)?, at)? },
        "CALLFUNC2" => Opcode::CallFunc2 {},
        "CALLMETHOD" => Opcode::CallMethod { func: resolve_func(ain, need(0)?, at)? },
        "CALLSYS" => Opcode::CallSys { syscall: resolve_syscall(ain, need(0)?, at)? },
        "CALLHLL" => {
            let library = resolve_library(ain, need(0)?, at)?;
            let function = resolve_hllfunc(ain, library, need(1)?, at)?;
            let type_param = ops.get(2).and_then(|s| s.parse::<i32>().ok()).unwrap_or(0);
            Opcode::CallHll { library, function, type_param: TypeArg(type_param) }
        }
        "NEW" => Opcode::New { strct: resolve_struct(ain, need(0)?, at)? },
        "CHECKUDO" => Opcode::CheckUdo { strct: resolve_struct(ain, need(0)?, at)? },
        "DG_SET" => Opcode::DgSet {},
        "DG_ADD" => Opcode::DgAdd {},
        "DG_ERASE" => Opcode::DgErase {},
        "DG_CLEAR" => Opcode::DgClear {},
        "DG_NUMOF" => Opcode::DgNumof {},
        "DG_EXIST" => Opcode::DgExist {},
        "DG_ASSIGN" => Opcode::DgAssign {},
        "DG_COPY" => Opcode::DgCopy {},
        "DG_NEW" => Opcode::DgNew {},
        "DG_NEW_FROM_METHOD" => Opcode::DgNewFromMethod {},
        "DG_STR_TO_METHOD" => Opcode::DgStrToMethod {},
        "DG_CALLBEGIN" => Opcode::DgCallBegin { dg_slot: IntArg(int_at(0)?) },
        "DG_CALL" => Opcode::DgCall { dg_slot: IntArg(int_at(0)?), end: addr_at(1)? },
        "DG_POP" => Opcode::DgPop {},
        "DG_PLUSA" => Opcode::DgPlusA {},
        "DG_MINUSA" => Opcode::DgMinusA {},
        "A_ALLOC" => Opcode::AAlloc {},
        "A_REALLOC" => Opcode::ARealloc {},
        "A_FREE" => Opcode::AFree {},
        "A_NUMOF" => Opcode::ANumof {},
        "A_COPY" => Opcode::ACopy {},
        "A_SORT" => Opcode::ASort {},
        "ASSERT" => Opcode::Assert {
            file: resolve_file(ain, need(0)?)?,
            line: IntArg(int_at(1)?),
            msg: intern_msg(ain, need(2)?)?,
        },
        "GETDBGDUMMY" => Opcode::GetDbgDummy {},
        "MSG" => Opcode::_Msg { msg: intern_msg(ain, need(0)?)? },
        "SH_LOCALDELETE" => Opcode::ShLocalDelete { slot: IntArg(resolve_local_slot(ain, cur_func, need(0)?, at)?) },
        "SH_LOCALCREATE" => Opcode::ShLocalCreate {
            slot: IntArg(resolve_local_slot(ain, cur_func, need(0)?, at)?),
            type_param: TypeArg(int_at(1)?),
        },
        "SH_LOCALREF" => Opcode::ShLocalRef { slot: IntArg(resolve_local_slot(ain, cur_func, need(0)?, at)?) },
        "SH_LOCALINC" => Opcode::ShLocalInc { slot: IntArg(resolve_local_slot(ain, cur_func, need(0)?, at)?) },
        "SH_LOCALDEC" => Opcode::ShLocalDec { slot: IntArg(resolve_local_slot(ain, cur_func, need(0)?, at)?) },
        "SH_LOCALASSIGN" => Opcode::ShLocalAssign {
            slot: IntArg(resolve_local_slot(ain, cur_func, need(0)?, at)?),
            val: IntArg(int_at(1)?),
        },
        other => return Err(Error::invalid_input(format!("unknown mnemonic '{other}'"))),
    })
}
