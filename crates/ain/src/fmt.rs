//! `Display` impls for the model's index and type types, used by the JAM
//! disassembler and by diagnostics. Kept separate from `types.rs` the way the
//! teacher keeps formatting out of its type definitions.

use std::fmt::{Display, Formatter, Result};

use crate::types::{
    AinType, AinTypeTag, Constant, RefDelegate, RefEnum, RefFile, RefFuncType, RefFunction,
    RefGlobal, RefHllFunction, RefLibrary, RefMember, RefMessage, RefString, RefStruct, RefSwitch,
    RefSyscall,
};

macro_rules! display_as_ref {
    ($ty:ty, $prefix:literal) => {
        impl Display for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

display_as_ref!(RefString, "@s");
display_as_ref!(RefMessage, "@m");
display_as_ref!(RefFunction, "@f");
display_as_ref!(RefGlobal, "@g");
display_as_ref!(RefStruct, "@t");
display_as_ref!(RefMember, "@mb");
display_as_ref!(RefFuncType, "@ft");
display_as_ref!(RefDelegate, "@dg");
display_as_ref!(RefLibrary, "@lib");
display_as_ref!(RefHllFunction, "@hf");
display_as_ref!(RefSyscall, "@sys");
display_as_ref!(RefFile, "@file");
display_as_ref!(RefSwitch, "@sw");
display_as_ref!(RefEnum, "@enum");

impl Display for AinTypeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            AinTypeTag::Void => write!(f, "void"),
            AinTypeTag::Int => write!(f, "int"),
            AinTypeTag::LongInt => write!(f, "long_int"),
            AinTypeTag::Bool => write!(f, "bool"),
            AinTypeTag::Float => write!(f, "float"),
            AinTypeTag::String => write!(f, "string"),
            AinTypeTag::Struct(r) => write!(f, "struct<{r}>"),
            AinTypeTag::Iface(r) => write!(f, "iface<{r}>"),
            AinTypeTag::Enum(r) => write!(f, "enum<{r}>"),
            AinTypeTag::Array => write!(f, "array"),
            AinTypeTag::RefArray => write!(f, "ref_array"),
            AinTypeTag::FuncType(r) => write!(f, "functype<{r}>"),
            AinTypeTag::Delegate(r) => write!(f, "delegate<{r}>"),
            AinTypeTag::Method => write!(f, "method"),
            AinTypeTag::Function => write!(f, "function"),
            AinTypeTag::HllParam => write!(f, "hll_param"),
            AinTypeTag::IMainSystem => write!(f, "imain_system"),
            AinTypeTag::Wrap => write!(f, "wrap"),
            AinTypeTag::Ref(inner) => write!(f, "ref {inner}"),
            AinTypeTag::IntermediateFunction => write!(f, "<function>"),
            AinTypeTag::Library => write!(f, "<library>"),
            AinTypeTag::System => write!(f, "<system>"),
            AinTypeTag::Syscall => write!(f, "<syscall>"),
            AinTypeTag::HllCall => write!(f, "<hllcall>"),
            AinTypeTag::IntermediateMethod => write!(f, "<method>"),
            AinTypeTag::Builtin => write!(f, "<builtin>"),
            AinTypeTag::Super => write!(f, "<super>"),
            AinTypeTag::NullType => write!(f, "<null>"),
            AinTypeTag::IMethod => write!(f, "<imethod>"),
            AinTypeTag::Named(name) => write!(f, "{name}"),
        }
    }
}

impl Display for AinType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.tag)?;
        if let Some(element) = &self.element {
            write!(f, "<{element}>")?;
        }
        for _ in 0..self.rank {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Constant::Void => write!(f, "void"),
            Constant::Int(v) => write!(f, "{v}"),
            Constant::LongInt(v) => write!(f, "{v}L"),
            Constant::Bool(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v}"),
            Constant::String(v) => write!(f, "{v:?}"),
        }
    }
}
