//! Declaration pass (spec §4.4 pass 2): registers every top-level `var`/
//! `fun` as a pool entry in [`AinFile`], flattens struct methods into
//! `StructName@method`-qualified functions, and links constructor/destructor
//! slots. Runs after [`super::resolve::resolve_types`], so every type here
//! is already concrete.

use crate::jaf::ast::*;
use crate::types::{AinType, Function, FunctionFlags, RefFunction, RefStruct, Variable};
use crate::{AinFile, Result, Warning};

fn register_function(
    ain: &mut AinFile,
    name: crate::Str,
    return_type: AinType,
    params: &[VarDecl],
    parent_struct: Option<RefStruct>,
) -> RefFunction {
    let findex = RefFunction(ain.functions.len());
    let variables = params.iter().map(|p| Variable::new(p.name.clone(), p.ty.clone())).collect();
    ain.functions.push(Function {
        name,
        findex,
        return_type,
        nr_args: params.len(),
        variables,
        address: None,
        crc: if ain.version_major >= 1 { Some(0) } else { None },
        flags: FunctionFlags {
            is_label: (1..7).contains(&ain.version_major),
            is_lambda: false,
        },
        parent_struct,
    });
    findex
}

/// Walk the parsed program, registering globals/functions/methods into the
/// file model. Returns non-fatal diagnostics (spec §4.8), e.g. a missing
/// `main`.
pub fn declare(ain: &mut AinFile, prog: &mut Program) -> Result<Vec<Warning>> {
    let mut warnings = Vec::new();

    for decl in &mut prog.decls {
        match decl {
            TopLevel::GlobalVar(v) => {
                ain.globals.push(Variable {
                    name: v.name.clone(),
                    name2: if ain.version_major >= 12 { Some(v.name.clone()) } else { None },
                    ty: v.ty.clone(),
                    initial_value: None,
                    group_index: if ain.version_major >= 5 { Some(0) } else { None },
                });
                v.slot = None;
            }
            TopLevel::Function { findex, name, return_type, params, .. } => {
                *findex = register_function(ain, name.clone(), return_type.clone(), params, None);
            }
            TopLevel::Struct { strct, methods } => {
                let struct_name = ain.structs[strct.0].name.clone();
                let dtor_name = format!("~{struct_name}");
                for m in methods.iter_mut() {
                    let qualified = crate::Str::from(format!("{struct_name}@{}", m.name));
                    let fidx = register_function(ain, qualified, m.return_type.clone(), &m.params, Some(*strct));
                    m.findex = fidx;
                    ain.structs[strct.0].methods.push(fidx);
                    if m.name.as_str() == struct_name.as_str() {
                        if ain.structs[strct.0].constructor.is_none() {
                            ain.structs[strct.0].constructor = Some(fidx);
                        }
                    } else if m.name.as_str() == dtor_name.as_str() {
                        ain.structs[strct.0].destructor = Some(fidx);
                    }
                }
            }
            TopLevel::FuncTypeDecl(_) | TopLevel::DelegateDecl(_) | TopLevel::EnumDecl(_) => {}
        }
    }

    ain.reindex();
    if ain.main().is_none() {
        warnings.push(Warning::new("no `main` function was declared"));
    }
    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jaf::parser::Parser;
    use crate::jaf::resolve::resolve_types;
    use crate::AinFile;

    #[test]
    fn registers_function_and_flags_missing_main() {
        let mut ain = AinFile::new(6, 0);
        let src = "int square(int x) { return x * x; }";
        let mut p = Parser::new(src, "t.jaf", &mut ain).unwrap();
        let mut prog = p.parse_program().unwrap();
        resolve_types(&mut ain, &mut prog).unwrap();
        let warnings = declare(&mut ain, &mut prog).unwrap();
        assert!(!warnings.is_empty());
        let f = ain.function_by_name("square").unwrap();
        assert_eq!(f.nr_args, 1);
    }

    #[test]
    fn flattens_struct_methods() {
        let mut ain = AinFile::new(11, 0);
        let src = "struct Counter { int n; void Counter(); void bump(); };";
        let mut p = Parser::new(src, "t.jaf", &mut ain).unwrap();
        let mut prog = p.parse_program().unwrap();
        resolve_types(&mut ain, &mut prog).unwrap();
        declare(&mut ain, &mut prog).unwrap();
        assert!(ain.function_by_name("Counter@Counter").is_some());
        assert!(ain.function_by_name("Counter@bump").is_some());
        assert!(ain.struct_by_name("Counter").unwrap().constructor.is_some());
    }
}
