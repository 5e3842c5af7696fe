use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    Data, DeriveInput, Expr, ExprLit, GenericArgument, Ident, Lit, LitStr, PathArguments, Type,
    Variant,
};

/// Generates `read`/`write`/`name`/`description`/`from_name` for the [`Opcode`]
/// enum from its variant field types. Each opcode is a two-byte tag followed
/// by its fields as fixed-width little-endian i32s (spec §4.1: "byte order is
/// little-endian throughout"); unlike a varint-coded instruction set, AIN
/// operands are always 4 bytes wide, so field codegen here only has to walk
/// each variant's field list and emit one fixed read/write per field.
#[proc_macro_derive(OpcodeHelper)]
pub fn derive_opcode_helper(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let ast = syn::parse_macro_input!(input as DeriveInput);
    let variants = match &ast.data {
        Data::Enum(v) => Some(&v.variants),
        _ => None,
    }
    .unwrap();

    let name = &ast.ident;
    let i = 0..variants.len() as u16;

    let initr = variants.iter().map(|v| read_variant(name, v));
    let initw = variants
        .iter()
        .enumerate()
        .map(|(i, v)| write_variant(name, v, i as u16));
    let vname = variants.iter().map(|v| &v.ident);
    let vname2 = vname.clone();
    let vname_str = variants
        .iter()
        .map(|v| LitStr::new(&mnemonic(&v.ident.to_string()), v.ident.span()));
    let vname_str2 = vname_str.clone();
    let vdesc = variants.iter().map(|v| {
        let mut acc = String::new();
        for attr in &v.attrs {
            if let Ok(nv) = attr.meta.require_name_value() {
                if nv.path.is_ident("doc") {
                    if let Expr::Lit(ExprLit {
                        lit: Lit::Str(lit), ..
                    }) = &nv.value
                    {
                        let lstr = lit.value();
                        let to_acc = lstr.trim();
                        if !to_acc.is_empty() {
                            acc.push_str(to_acc);
                            acc.push('\n');
                        }
                    }
                }
            }
        }
        acc.trim().to_string()
    });
    let vdefault_init = variants.iter().map(|v| {
        let vname = &v.ident;
        let finit = v.fields.iter().map(|f| {
            let fname = f.ident.as_ref().unwrap();
            quote! {
                #fname: Default::default()
            }
        });
        quote! {
            #name::#vname { #( #finit,)* }
        }
    });

    proc_macro::TokenStream::from(quote! {
        impl #name {
            /// Decode one instruction at the reader's current position.
            pub fn read(r: &mut impl std::io::Read) -> crate::Result<#name> {
                use byteorder::{LittleEndian, ReadBytesExt};
                use crate::opcodes::*;
                use crate::types::*;

                let op = r.read_u16::<LittleEndian>()?;
                match op {
                    #( #i => #initr, )*
                    other => Err(crate::Error::invalid_input(format!("unknown opcode 0x{:04x}", other))),
                }
            }

            /// Encode this instruction at the writer's current position.
            pub fn write(&self, w: &mut impl std::io::Write) -> crate::Result<()> {
                use byteorder::{LittleEndian, WriteBytesExt};
                use crate::opcodes::*;
                use crate::types::*;

                match self {
                    #( #initw )*
                }

                Ok(())
            }

            /// The JAM mnemonic for this opcode, as accepted by the assembler.
            pub fn name(&self) -> &'static str {
                match self {
                    #( #name::#vname { .. } => #vname_str, )*
                }
            }

            /// A short human description, taken from the variant's doc comment.
            pub fn description(&self) -> &'static str {
                match self {
                    #( #name::#vname2 { .. } => #vdesc, )*
                }
            }

            /// Look up an opcode by its JAM mnemonic. Returns a zeroed variant
            /// whose fields the assembler then fills in from its operands.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    #( #vname_str2 => Some(#vdefault_init), )*
                    _ => None,
                }
            }
        }
    })
}

/// Rust variant name -> real JAM mnemonic (grounded in `asm.c`/`compile.c`'s
/// instruction names). Written out explicitly rather than derived
/// mechanically: the real mnemonics mix `FOOBAR`, `FOO_BAR` and `FOO_BAR_BAZ`
/// conventions inconsistently (`DG_CALLBEGIN` but `DG_NEW_FROM_METHOD`), so no
/// single CamelCase-to-SNAKE rule reproduces all of them.
fn mnemonic(ident: &str) -> String {
    match ident {
        "Nop" => "NOP",
        "Push" => "PUSH",
        "FPush" => "F_PUSH",
        "SPush" => "S_PUSH",
        "Pop" => "POP",
        "Swap" => "SWAP",
        "Dup" => "DUP",
        "Dup2" => "DUP2",
        "DupX2" => "DUP_X2",
        "DupU2" => "DUP_U2",
        "XDup" => "X_DUP",
        "XMov" => "X_MOV",
        "PushLocalPage" => "PUSHLOCALPAGE",
        "PushGlobalPage" => "PUSHGLOBALPAGE",
        "PushStructPage" => "PUSHSTRUCTPAGE",
        "Ref" => "REF",
        "XRef" => "X_REF",
        "RefRef" => "REFREF",
        "CRef" => "C_REF",
        "Assign" => "ASSIGN",
        "XAssign" => "X_ASSIGN",
        "FAssign" => "F_ASSIGN",
        "SAssign" => "S_ASSIGN",
        "Delete" => "DELETE",
        "Add" => "ADD",
        "Sub" => "SUB",
        "Mul" => "MUL",
        "Div" => "DIV",
        "Mod" => "MOD",
        "Inc" => "INC",
        "Dec" => "DEC",
        "Lt" => "LT",
        "Gt" => "GT",
        "Lte" => "LTE",
        "Gte" => "GTE",
        "Equale" => "EQUALE",
        "NotE" => "NOTE",
        "Not" => "NOT",
        "And" => "AND",
        "Or" => "OR",
        "Xor" => "XOR",
        "Land" => "LAND",
        "Lor" => "LOR",
        "PlusA" => "PLUSA",
        "MinusA" => "MINUSA",
        "SAdd" => "S_ADD",
        "SMod" => "S_MOD",
        "LiAdd" => "LI_ADD",
        "LiSub" => "LI_SUB",
        "LiMul" => "LI_MUL",
        "LiDiv" => "LI_DIV",
        "LiMod" => "LI_MOD",
        "LiInc" => "LI_INC",
        "LiDec" => "LI_DEC",
        "LiAssign" => "LI_ASSIGN",
        "LiPlusA" => "LI_PLUSA",
        "LiMinusA" => "LI_MINUSA",
        "LiMulA" => "LI_MULA",
        "LiDivA" => "LI_DIVA",
        "LiModA" => "LI_MODA",
        "LiAndA" => "LI_ANDA",
        "LiOrA" => "LI_ORA",
        "LiXorA" => "LI_XORA",
        "LiLshiftA" => "LI_LSHIFTA",
        "LiRshiftA" => "LI_RSHIFTA",
        "Ifz" => "IFZ",
        "Ifnz" => "IFNZ",
        "Jump" => "JUMP",
        "Func" => "FUNC",
        "EndFunc" => "ENDFUNC",
        "Return" => "RETURN",
        "Switch" => "SWITCH",
        "StrSwitch" => "STRSWITCH",
        "SpInc" => "SP_INC",
        "CallFunc" => "CALLFUNC",
        "CallFunc2" => "CALLFUNC2",
        "CallMethod" => "CALLMETHOD",
        "CallSys" => "CALLSYS",
        "CallHll" => "CALLHLL",
        "New" => "NEW",
        "CheckUdo" => "CHECKUDO",
        "DgSet" => "DG_SET",
        "DgAdd" => "DG_ADD",
        "DgErase" => "DG_ERASE",
        "DgClear" => "DG_CLEAR",
        "DgNumof" => "DG_NUMOF",
        "DgExist" => "DG_EXIST",
        "DgAssign" => "DG_ASSIGN",
        "DgCopy" => "DG_COPY",
        "DgNew" => "DG_NEW",
        "DgNewFromMethod" => "DG_NEW_FROM_METHOD",
        "DgStrToMethod" => "DG_STR_TO_METHOD",
        "DgCallBegin" => "DG_CALLBEGIN",
        "DgCall" => "DG_CALL",
        "DgPop" => "DG_POP",
        "DgPlusA" => "DG_PLUSA",
        "DgMinusA" => "DG_MINUSA",
        "AAlloc" => "A_ALLOC",
        "ARealloc" => "A_REALLOC",
        "AFree" => "A_FREE",
        "ANumof" => "A_NUMOF",
        "ACopy" => "A_COPY",
        "ASort" => "A_SORT",
        "Assert" => "ASSERT",
        "GetDbgDummy" => "GETDBGDUMMY",
        "_Msg" => "MSG",
        "ShLocalDelete" => "SH_LOCALDELETE",
        "ShLocalCreate" => "SH_LOCALCREATE",
        "ShLocalRef" => "SH_LOCALREF",
        "ShLocalInc" => "SH_LOCALINC",
        "ShLocalDec" => "SH_LOCALDEC",
        "ShLocalAssign" => "SH_LOCALASSIGN",
        other => panic!("ain-derive: no JAM mnemonic registered for opcode variant {other}"),
    }
    .to_string()
}

/// Print a type to string: base identifier plus a bracketed recursive print
/// of its first generic argument, if any.
fn ident(ty: &Type) -> String {
    match ty {
        Type::Path(path) => {
            let seg = &path.path.segments[0];
            match &seg.arguments {
                PathArguments::None => seg.ident.to_string(),
                PathArguments::AngleBracketed(a) => {
                    let a = match &a.args[0] {
                        GenericArgument::Type(ty) => ident(ty),
                        _ => unreachable!(),
                    };
                    format!("{}<{}>", seg.ident, a)
                }
                _ => unreachable!(),
            }
        }
        other => unreachable!("unknown type {:?}", other),
    }
}

fn read_field(ty_name: &str) -> TokenStream {
    let i32le = quote!(r.read_i32::<LittleEndian>()?);
    let u32le = quote!(r.read_u32::<LittleEndian>()?);
    match ty_name {
        "IntArg" => quote!(IntArg(#i32le)),
        "TypeArg" => quote!(TypeArg(#i32le)),
        "FloatArg" => quote!(FloatArg(f32::from_bits(#u32le))),
        "Addr" => quote!(Addr(#u32le)),
        "RefString" => quote!(RefString(#i32le as usize)),
        "RefMessage" => quote!(RefMessage(#i32le as usize)),
        "RefFunction" => quote!(RefFunction(#i32le as usize)),
        "RefGlobal" => quote!(RefGlobal(#i32le as usize)),
        "RefStruct" => quote!(RefStruct(#i32le as usize)),
        "RefSwitch" => quote!(RefSwitch(#i32le as usize)),
        "RefSyscall" => quote!(RefSyscall(#i32le as usize)),
        "RefLibrary" => quote!(RefLibrary(#i32le as usize)),
        "RefHllFunction" => quote!(RefHllFunction(#i32le as usize)),
        "RefFile" => quote!(RefFile(#i32le as usize)),
        _ => TokenStream::default(),
    }
}

fn write_field(fname: &Ident, ty_name: &str) -> TokenStream {
    match ty_name {
        "IntArg" | "TypeArg" => quote!(w.write_i32::<LittleEndian>(#fname.0)?;),
        "FloatArg" => quote!(w.write_u32::<LittleEndian>(#fname.0.to_bits())?;),
        "Addr" => quote!(w.write_u32::<LittleEndian>(#fname.0)?;),
        "RefString" | "RefMessage" | "RefFunction" | "RefGlobal" | "RefStruct" | "RefSwitch"
        | "RefSyscall" | "RefLibrary" | "RefHllFunction" | "RefFile" => {
            quote!(w.write_i32::<LittleEndian>(#fname.0 as i32)?;)
        }
        _ => TokenStream::default(),
    }
}

fn read_variant(enum_name: &Ident, v: &Variant) -> TokenStream {
    let vname = &v.ident;
    let fname = v.fields.iter().map(|f| &f.ident);
    let fvalue = v.fields.iter().map(|f| read_field(&ident(&f.ty)));
    quote! {
        Ok(#enum_name::#vname {
            #( #fname: #fvalue, )*
        })
    }
}

fn write_variant(enum_name: &Ident, v: &Variant, i: u16) -> TokenStream {
    let vname = &v.ident;
    let fname: Vec<_> = v.fields.iter().map(|f| f.ident.as_ref().unwrap()).collect();
    let fwrite = v
        .fields
        .iter()
        .map(|f| write_field(f.ident.as_ref().unwrap(), &ident(&f.ty)));
    quote! {
        #enum_name::#vname { #( #fname, )* } => {
            w.write_u16::<LittleEndian>(#i)?;
            #( #fwrite )*
        }
    }
}
