//! The shared numeric type universe (spec §3.1) and the entities owned by
//! [`crate::AinFile`] (spec §3.2). All the `Ref*` newtypes here are cheap,
//! copyable indices into one of `AinFile`'s pools; we never keep a Rust
//! reference across a pool in place of them, since the file model and the
//! JAF AST both need to store these indices long after the pool they point
//! into may have been reallocated.

use std::collections::HashMap;

use crate::Str;

/// Index into the string pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefString(pub usize);

/// Index into the message pool (MSG1/MSG0 section).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefMessage(pub usize);

/// Index into the function pool. Function 0 is always the reserved NULL entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefFunction(pub usize);

/// Index into the global variable pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefGlobal(pub usize);

/// Index into the structure/interface pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefStruct(pub usize);

/// Index of a member within a [`Struct`]'s member vector.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefMember(pub usize);

/// Index into the function type pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefFuncType(pub usize);

/// Index into the delegate pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefDelegate(pub usize);

/// Index into the HLL library pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefLibrary(pub usize);

/// Index of a function within a [`Library`]'s function vector.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefHllFunction(pub usize);

/// Index into the system call table (a small fixed table of engine entrypoints).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefSyscall(pub usize);

/// Index into the filename pool used by debug info.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefFile(pub usize);

/// Index into the switch-case table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefSwitch(pub usize);

/// Index into an enum's variant vector.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct RefEnum(pub usize);

/// A slot number within the locals vector of the currently active function,
/// i.e. an index into [`Function::variables`]. Argument slots come first, in
/// declaration order, so a local's slot number also tells you whether it is
/// a parameter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
pub struct LocalSlot(pub u16);

/// The closed set of runtime type tags shared by the toolchain and the VM (spec §3.1).
/// A handful of tags (`Function`, `Library`, `System`, `Syscall`, `HllCall`, `Method`,
/// `Builtin`, `Super`, `NullType`, `IMethod`) only ever appear on [`crate::jaf::ast`]
/// nodes during type checking and must never reach the emitter or the binary codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AinTypeTag {
    Void,
    Int,
    LongInt,
    Bool,
    Float,
    String,
    Struct(RefStruct),
    Iface(RefStruct),
    Enum(RefEnum),
    Array,
    RefArray,
    FuncType(RefFuncType),
    Delegate(RefDelegate),
    Method,
    Function,
    HllParam,
    IMainSystem,
    Wrap,
    /// `ref T` for any base tag; scalar refs occupy two adjacent variable slots.
    Ref(Box<AinTypeTag>),

    // Intermediate tags, forbidden in any serialised form (spec §3.1).
    IntermediateFunction,
    Library,
    System,
    Syscall,
    HllCall,
    IntermediateMethod,
    Builtin,
    Super,
    NullType,
    IMethod,

    /// A not-yet-resolved named type (struct/interface/enum/functype/delegate),
    /// produced by the parser and replaced with a concrete tag by the type
    /// resolver pass (spec §4.4 "Resolve types"). Never survives past that pass.
    Named(crate::Str),
}

/// A full `AinType`: tag, optional struct/function index, array rank, and for
/// v11+ an optional element type (used uniformly for `array<T>` and `wrap<T>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AinType {
    pub tag: AinTypeTag,
    pub rank: u32,
    pub element: Option<Box<AinType>>,
}

impl AinType {
    pub fn simple(tag: AinTypeTag) -> Self {
        AinType {
            tag,
            rank: 0,
            element: None,
        }
    }

    pub fn void() -> Self {
        Self::simple(AinTypeTag::Void)
    }

    pub fn int() -> Self {
        Self::simple(AinTypeTag::Int)
    }

    pub fn bool_() -> Self {
        Self::simple(AinTypeTag::Bool)
    }

    pub fn float() -> Self {
        Self::simple(AinTypeTag::Float)
    }

    pub fn string() -> Self {
        Self::simple(AinTypeTag::String)
    }

    pub fn array_of(element: AinType, rank: u32) -> Self {
        AinType {
            tag: AinTypeTag::Array,
            rank,
            element: Some(Box::new(element)),
        }
    }

    pub fn ref_of(inner: AinTypeTag) -> Self {
        AinType::simple(AinTypeTag::Ref(Box::new(inner)))
    }

    /// True for the five scalar ref types that the variable allocator must
    /// reserve two adjacent slots for (spec §3.2 invariants, §4.6).
    pub fn is_ref_scalar(&self) -> bool {
        matches!(
            &self.tag,
            AinTypeTag::Ref(inner)
                if matches!(
                    **inner,
                    AinTypeTag::Int
                        | AinTypeTag::Bool
                        | AinTypeTag::Float
                        | AinTypeTag::LongInt
                        | AinTypeTag::FuncType(_)
                )
        )
    }

    pub fn is_ref(&self) -> bool {
        matches!(&self.tag, AinTypeTag::Ref(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            &self.tag,
            AinTypeTag::Int | AinTypeTag::LongInt | AinTypeTag::Float | AinTypeTag::Bool
        )
    }

    /// Intermediate tags must never be serialised to a `.ain` file (spec §3.1).
    pub fn is_intermediate(&self) -> bool {
        matches!(
            &self.tag,
            AinTypeTag::IntermediateFunction
                | AinTypeTag::Library
                | AinTypeTag::System
                | AinTypeTag::Syscall
                | AinTypeTag::HllCall
                | AinTypeTag::IntermediateMethod
                | AinTypeTag::Builtin
                | AinTypeTag::Super
                | AinTypeTag::NullType
                | AinTypeTag::IMethod
                | AinTypeTag::Named(_)
        )
    }
}

/// A literal constant, tagged by the same type universe, used for global
/// initial values ([`Initval`]) and for folded constant expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Void,
    Int(i32),
    LongInt(i64),
    Bool(bool),
    Float(f32),
    String(Str),
}

/// A local/parameter/member variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Str,
    /// Present from file version 12 onward; used to disambiguate shadowed names.
    pub name2: Option<Str>,
    pub ty: AinType,
    pub initial_value: Option<Constant>,
    /// Global-only (file version >= 5): grouping index used by the save system.
    pub group_index: Option<i32>,
}

impl Variable {
    pub fn new(name: impl Into<Str>, ty: AinType) -> Self {
        Variable {
            name: name.into(),
            name2: None,
            ty,
            initial_value: None,
            group_index: None,
        }
    }
}

#[derive(Debug, Clone, Default, Copy, Eq, PartialEq)]
pub struct FunctionFlags {
    /// 1 <= major < 7 only.
    pub is_label: bool,
    /// major >= 11 only.
    pub is_lambda: bool,
}

/// A function definition: its signature, local variable table, and bytecode span.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Str,
    pub findex: RefFunction,
    pub return_type: AinType,
    /// Number of leading entries in `variables` that are parameters.
    pub nr_args: usize,
    pub variables: Vec<Variable>,
    /// Byte offset of the first instruction in `AinFile::code`, or `None` for an
    /// HLL stub / not-yet-emitted declaration.
    pub address: Option<u32>,
    /// Present from file version >= 1.
    pub crc: Option<u32>,
    pub flags: FunctionFlags,
    /// Struct this function is a member of, if it is a method/constructor/destructor.
    pub parent_struct: Option<RefStruct>,
}

impl Function {
    pub fn null() -> Self {
        Function {
            name: Str::from("0"),
            findex: RefFunction(0),
            return_type: AinType::void(),
            nr_args: 0,
            variables: Vec::new(),
            address: None,
            crc: Some(0),
            flags: FunctionFlags::default(),
            parent_struct: None,
        }
    }

    pub fn is_method(&self) -> bool {
        self.parent_struct.is_some()
    }
}

/// A struct's interface implementation: which interface, and the vtable offset
/// used to translate an interface method number into this struct's method table.
#[derive(Debug, Clone, Copy)]
pub struct InterfaceImpl {
    pub iface: RefStruct,
    pub vtable_offset: i32,
}

/// A structure or (when `is_interface` is set) an interface. Interfaces are
/// represented as structs whose members are only method slots (spec glossary).
#[derive(Debug, Clone)]
pub struct Struct {
    pub name: Str,
    pub is_interface: bool,
    pub constructor: Option<RefFunction>,
    pub destructor: Option<RefFunction>,
    pub members: Vec<Variable>,
    pub methods: Vec<RefFunction>,
    /// Present for v11+.
    pub interfaces: Vec<InterfaceImpl>,
    /// Present for (major, minor) >= (14, 1).
    pub vtable: Option<Vec<RefFunction>>,
    /// Methods of an interface, typed like a [`FunctionType`] signature each.
    pub iface_methods: Vec<FunctionType>,
}

impl Struct {
    pub fn new(name: impl Into<Str>) -> Self {
        Struct {
            name: name.into(),
            is_interface: false,
            constructor: None,
            destructor: None,
            members: Vec::new(),
            methods: Vec::new(),
            interfaces: Vec::new(),
            vtable: None,
            iface_methods: Vec::new(),
        }
    }

    pub fn member_index(&self, name: &str) -> Option<RefMember> {
        self.members
            .iter()
            .position(|m| m.name.as_str() == name)
            .map(RefMember)
    }
}

/// A named function prototype used as a first-class value type (`functype`),
/// and the identical shape used by `delegate` declarations.
#[derive(Debug, Clone)]
pub struct FunctionType {
    pub name: Str,
    pub return_type: AinType,
    pub nr_args: usize,
    pub variables: Vec<Variable>,
}

/// A single HLL (native library) function signature.
#[derive(Debug, Clone)]
pub struct HllFunction {
    pub name: Str,
    pub return_type: AinType,
    pub arguments: Vec<Variable>,
}

/// A native library loaded through the HLL foreign-function interface.
#[derive(Debug, Clone)]
pub struct Library {
    pub name: Str,
    pub functions: Vec<HllFunction>,
}

impl Library {
    pub fn function_index(&self, name: &str) -> Option<RefHllFunction> {
        self.functions
            .iter()
            .position(|f| f.name.as_str() == name)
            .map(RefHllFunction)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SwitchCaseType {
    Int,
    String,
}

/// One jump table used by `SWITCH`/`STRSWITCH`.
#[derive(Debug, Clone)]
pub struct Switch {
    pub case_type: SwitchCaseType,
    pub default_address: Option<u32>,
    pub cases: Vec<(Constant, u32)>,
}

/// One `enum` declaration's variant table.
#[derive(Debug, Clone)]
pub struct Enum {
    pub name: Str,
    pub variants: Vec<(Str, i32)>,
}

/// A global's initial value (present for file version >= 8).
#[derive(Debug, Clone)]
pub struct Initval {
    pub global: RefGlobal,
    pub value: Constant,
}

/// An (opaque, version-agnostic) engine entrypoint exposed as `assert`/`LOCK_PEEK`/etc.
#[derive(Debug, Clone)]
pub struct Syscall {
    pub name: Str,
    pub return_type: AinType,
    pub arguments: Vec<AinType>,
}

/// Lookup tables built once after a section is populated or after JAF
/// declarations are registered; never serialised, always rebuilt.
#[derive(Debug, Default, Clone)]
pub struct NameIndex {
    pub functions: HashMap<Str, RefFunction>,
    pub globals: HashMap<Str, RefGlobal>,
    pub structs: HashMap<Str, RefStruct>,
    pub functypes: HashMap<Str, RefFuncType>,
    pub delegates: HashMap<Str, RefDelegate>,
    pub libraries: HashMap<Str, RefLibrary>,
    pub enums: HashMap<Str, RefEnum>,
}
