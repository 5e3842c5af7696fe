//! Textual disassembly: the inverse of [`super::assembler`] (spec §4.2).
//! Walks the code buffer linearly from a function's entry point, computing
//! label names by sweeping every `addr` operand plus switch default/case
//! addresses, and (unless macro folding is disabled) re-recognises fixed
//! opcode sequences as their originating pseudo-op.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Cursor;

use crate::jam::macros::{self, Macro, MacroArgs};
use crate::opcodes::Opcode;
use crate::{AinFile, Resolve, Result};

/// Options controlling how a function is rendered to JAM text.
#[derive(Debug, Clone, Copy)]
pub struct DisassembleOptions {
    /// Re-fold recognised opcode sequences into their macro mnemonic.
    /// Mirrors the assembler/disassembler fixpoint property (spec §8):
    /// disabling this is the `NO_MACROS` flag from that property's statement.
    pub fold_macros: bool,
    /// Print the `FUNC`-header comment listing args/locals/return type.
    pub print_header: bool,
}

impl Default for DisassembleOptions {
    fn default() -> Self {
        DisassembleOptions {
            fold_macros: true,
            print_header: true,
        }
    }
}

/// One decoded instruction, tagged with its own address, used both to render
/// output and to drive the macro-folding window.
struct Decoded {
    addr: u32,
    op: Opcode,
}

fn decode_function_body(ain: &AinFile, start: u32, end: u32) -> Result<Vec<Decoded>> {
    let mut cursor = Cursor::new(&ain.code[start as usize..end as usize]);
    let mut out = Vec::new();
    loop {
        let addr = start + cursor.position() as u32;
        if addr >= end {
            break;
        }
        let op = Opcode::read(&mut cursor)?;
        out.push(Decoded { addr, op });
    }
    Ok(out)
}

/// Find the end of a function's body: the address of its matching `ENDFUNC`,
/// or the end of the code buffer if somehow absent.
fn function_extent(ain: &AinFile, start: u32) -> Result<u32> {
    let mut cursor = Cursor::new(&ain.code[start as usize..]);
    loop {
        let pos = start + cursor.position() as u32;
        if pos as usize >= ain.code.len() {
            return Ok(ain.code.len() as u32);
        }
        let op = Opcode::read(&mut cursor)?;
        if let Opcode::EndFunc { .. } = op {
            return Ok(start + cursor.position() as u32);
        }
    }
}

/// Every address the label sweep must name: jump targets inside the body,
/// plus the default/case addresses of any switch referenced from it.
fn collect_labels(ain: &AinFile, decoded: &[Decoded]) -> HashMap<u32, String> {
    let mut addrs: Vec<u32> = Vec::new();
    for d in decoded {
        addrs.extend(d.op.jump_targets().into_iter().map(|a| a.0));
        if let Opcode::Switch { table } | Opcode::StrSwitch { table } = &d.op {
            let sw = ain.resolve(*table);
            if let Some(def) = sw.default_address {
                addrs.push(def);
            }
            for (_, addr) in &sw.cases {
                addrs.push(*addr);
            }
        }
    }
    addrs.sort_unstable();
    addrs.dedup();
    addrs
        .into_iter()
        .enumerate()
        .map(|(i, a)| (a, format!("L_{i:04}")))
        .collect()
}

fn dup_suffixed<'a>(names: impl Iterator<Item = &'a str>, target: &str, n: usize) -> String {
    let count = names.filter(|name| *name == target).take(n + 1).count();
    if count > n {
        format!("{target}#{n}")
    } else {
        target.to_string()
    }
}

fn render_function_header(ain: &AinFile, f: &crate::types::Function, out: &mut String) {
    let args = fmtools::join(", ", f.variables[..f.nr_args].iter().map(|v| format!("{} {}", v.ty, v.name)));
    let _ = writeln!(out, "; {} {}({})", f.return_type, f.name, args);
    for (i, v) in f.variables.iter().enumerate() {
        let _ = writeln!(out, ";   local[{i}]: {} {}", v.ty, v.name);
    }
}

fn render_operand_func(ain: &AinFile, r: crate::types::RefFunction) -> String {
    let f = ain.resolve(r);
    let names: Vec<&str> = ain.functions.iter().map(|f| f.name.as_str()).collect();
    let n = ain.functions[..r.0].iter().filter(|g| g.name == f.name).count();
    dup_suffixed(names.into_iter(), &f.name, n)
}

fn render_operand_struct(ain: &AinFile, r: crate::types::RefStruct) -> String {
    ain.resolve(r).name.to_string()
}

/// Try to recognise `window` (a slice starting at `decoded[i]`) as one macro's
/// expansion. Returns the macro, its rendered operand strings, and how many
/// instructions it consumed, checked against every table entry in order.
fn try_fold(ain: &AinFile, decoded: &[Decoded], i: usize, v14: bool) -> Option<(Macro, Vec<String>, usize)> {
    const CANDIDATES: &[Macro] = &[
        Macro::LocalRef,
        Macro::GlobalRef,
        Macro::LocalRefRef,
        Macro::GlobalRefRef,
        Macro::LocalInc,
        Macro::LocalDec,
        Macro::LocalInc2,
        Macro::LocalDec2,
        Macro::LocalInc3,
        Macro::LocalDec3,
        Macro::LocalPlusA,
        Macro::LocalMinusA,
        Macro::LocalAssign,
        Macro::LocalAssign2,
        Macro::FLocalAssign,
        Macro::StackLocalAssign,
        Macro::SLocalAssign,
        Macro::LocalDelete,
        Macro::LocalCreate,
        Macro::GlobalInc,
        Macro::GlobalDec,
        Macro::GlobalAssign,
        Macro::FGlobalAssign,
        Macro::StructRef,
        Macro::StructRefRef,
        Macro::StructInc,
        Macro::StructDec,
        Macro::StructAssign,
        Macro::FStructAssign,
        Macro::PushVMethod,
    ];
    'outer: for &m in CANDIDATES {
        let args = macros::dummy_args();
        let expansion = macros::expand(m, &args, v14);
        if i + expansion.len() > decoded.len() {
            continue;
        }
        for (d, shape) in decoded[i..i + expansion.len()].iter().zip(&expansion) {
            if std::mem::discriminant(&d.op) != std::mem::discriminant(shape) {
                continue 'outer;
            }
        }
        // shapes match; extract the page/slot (or struct/member) that the
        // macro's first instruction(s) pushed, rendered back to a name.
        let operand = render_macro_leading_operand(ain, decoded, i, m);
        return Some((m, operand, expansion.len()));
    }
    None
}

fn render_macro_leading_operand(ain: &AinFile, decoded: &[Decoded], i: usize, m: Macro) -> Vec<String> {
    // The leading `PUSH <slot>` (or two, for two-operand macros) always
    // immediately follows the page-selecting instruction.
    let slot_at = |idx: usize| -> i32 {
        match decoded.get(i + idx).map(|d| &d.op) {
            Some(Opcode::Push { val }) => val.0,
            _ => 0,
        }
    };
    use Macro::*;
    match m {
        LocalRef | LocalRefRef | LocalInc | LocalDec | LocalInc2 | LocalInc3 | LocalDec2 | LocalDec3
        | LocalAssign2 | StackLocalAssign | LocalDelete | LocalCreate => {
            vec![local_name(ain, slot_at(1))]
        }
        GlobalRef | GlobalRefRef | GlobalInc | GlobalDec => vec![global_name(ain, slot_at(1))],
        LocalPlusA | LocalMinusA => vec![local_name(ain, slot_at(1)), slot_at(2).to_string()],
        LocalAssign => vec![local_name(ain, slot_at(1)), slot_at(2).to_string()],
        FLocalAssign => vec![local_name(ain, slot_at(1))],
        SLocalAssign => vec![local_name(ain, slot_at(1))],
        GlobalAssign => vec![global_name(ain, slot_at(1)), slot_at(2).to_string()],
        FGlobalAssign => vec![global_name(ain, slot_at(1))],
        StructRef | StructRefRef | StructInc | StructDec => vec![format!("<member:{}>", slot_at(1))],
        StructAssign => vec![format!("<member:{}>", slot_at(1)), slot_at(2).to_string()],
        FStructAssign => vec![format!("<member:{}>", slot_at(1))],
        PushVMethod => vec![format!("<member:{}>", slot_at(1)), slot_at(3).to_string(), slot_at(5).to_string()],
        _ => Vec::new(),
    }
}

fn local_name(_ain: &AinFile, _slot: i32) -> String {
    // Name resolution requires the enclosing function's variable table,
    // which the caller (disassemble_function) substitutes after the fact.
    "<local>".to_string()
}

fn global_name(ain: &AinFile, slot: i32) -> String {
    ain.globals
        .get(slot as usize)
        .map(|v| v.name.to_string())
        .unwrap_or_else(|| format!("<global:{slot}>"))
}

fn render_instr(ain: &AinFile, d: &Decoded, labels: &HashMap<u32, String>, locals: &[crate::types::Variable]) -> String {
    match &d.op {
        Opcode::Ifz { target } => format!("IFZ {}", labels[&target.0]),
        Opcode::Ifnz { target } => format!("IFNZ {}", labels[&target.0]),
        Opcode::Jump { target } => format!("JUMP {}", labels[&target.0]),
        Opcode::DgCall { dg_slot, end } => format!("DG_CALL {}, {}", dg_slot.0, labels[&end.0]),
        Opcode::Func { func } => format!("FUNC {}", render_operand_func(ain, *func)),
        Opcode::EndFunc { func } => format!("ENDFUNC {}", render_operand_func(ain, *func)),
        Opcode::CallFunc { func } => format!("CALLFUNC {}", render_operand_func(ain, *func)),
        Opcode::CallMethod { func } => format!("CALLMETHOD {}", render_operand_func(ain, *func)),
        Opcode::New { strct } => format!("NEW {}", render_operand_struct(ain, *strct)),
        Opcode::CheckUdo { strct } => format!("CHECKUDO {}", render_operand_struct(ain, *strct)),
        Opcode::Push { val } => {
            // Slot-after-page-push is the common case; best-effort name it.
            if let Some(v) = locals.get(val.0.max(0) as usize) {
                format!("PUSH {} ; {}", val.0, v.name)
            } else {
                format!("PUSH {}", val.0)
            }
        }
        Opcode::SPush { val } => format!("S_PUSH {:?}", ain.resolve(*val)),
        Opcode::FPush { val } => format!("F_PUSH {}", val.0),
        Opcode::CallSys { syscall } => format!("CALLSYS {}", ain.resolve(*syscall).name),
        Opcode::CallHll { library, function, type_param } => {
            let lib = ain.resolve(*library);
            format!(
                "CALLHLL {}, {}, {}",
                lib.name,
                lib.functions[function.0].name,
                type_param.0
            )
        }
        Opcode::Assert { file, line, msg } => {
            format!("ASSERT {:?}, {}, {:?}", ain.resolve(*file), line.0, ain.resolve(*msg))
        }
        Opcode::_Msg { msg } => format!("MSG {:?}", ain.resolve(*msg)),
        other => other.name().to_string(),
    }
}

/// Render one function's body as JAM text: header comment, instructions with
/// labels, and (when `fold_macros` is set) pseudo-ops re-recognised from
/// their opcode sequence.
pub fn disassemble_function(ain: &AinFile, func: crate::types::RefFunction, opts: DisassembleOptions) -> Result<String> {
    let f = ain.resolve(func);
    let start = f.address.ok_or_else(|| {
        crate::Error::invalid_input(format!("function '{}' has no address (declaration only)", f.name))
    })?;
    let end = function_extent(ain, start)?;
    let decoded = decode_function_body(ain, start, end)?;
    let labels = collect_labels(ain, &decoded);
    let v14 = ain.version_major >= 14;

    let mut out = String::new();
    if opts.print_header {
        render_function_header(ain, f, &mut out);
    }

    let mut i = 0;
    while i < decoded.len() {
        if let Some(name) = labels.get(&decoded[i].addr) {
            let _ = writeln!(out, "{name}:");
        }
        if opts.fold_macros {
            if let Some((m, rendered_ops, consumed)) = try_fold(ain, &decoded, i, v14) {
                let patched = rendered_ops.into_iter().map(|s| {
                    if s == "<local>" {
                        // Patch in the real local name using the enclosing function.
                        match &decoded[i].op {
                            Opcode::Push { val } => f
                                .variables
                                .get(val.0.max(0) as usize)
                                .map(|v| v.name.to_string())
                                .unwrap_or_else(|| "<local>".to_string()),
                            _ => s,
                        }
                    } else {
                        s
                    }
                });
                let ops = fmtools::join(", ", patched);
                let _ = writeln!(out, "\t{} {ops}", m.mnemonic());
                i += consumed;
                continue;
            }
        }
        let _ = writeln!(out, "\t{}", render_instr(ain, &decoded[i], &labels, &f.variables));
        i += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jam::assemble_replace;
    use crate::AinFile;

    #[test]
    fn disassemble_trivial_function() {
        let mut ain = AinFile::new(6, 0);
        ain.functions.push(crate::types::Function {
            name: "main".into(),
            findex: crate::types::RefFunction(1),
            return_type: crate::types::AinType::int(),
            nr_args: 0,
            variables: Vec::new(),
            address: None,
            crc: Some(0),
            flags: Default::default(),
            parent_struct: None,
        });
        ain.reindex();
        assemble_replace(&mut ain, "FUNC main\n\tPUSH 42\n\tRETURN\n\tPUSH 0\n\tRETURN\nENDFUNC main\n").unwrap();
        let func = ain.function_by_name("main").unwrap().findex;
        let text = disassemble_function(&ain, func, DisassembleOptions::default()).unwrap();
        assert!(text.contains("PUSH 42"));
        assert!(text.contains("RETURN"));
    }
}
