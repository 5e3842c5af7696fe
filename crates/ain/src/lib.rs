//! AliceSoft System 4x `.ain` bytecode: an in-memory model, a binary codec for
//! the on-disk container, a JAM textual assembler/disassembler, and a JAF
//! source compiler. See [`AinFile`] for the entrypoint into the model.
//!
//! #### Note about safety
//! Like the rest of the toolchain, we avoid self-references and address every
//! entity by a `Ref*` index into one of [`AinFile`]'s pools instead of a Rust
//! reference. No bounds checking is done on a `Ref*` read through [`Resolve`]
//! or [`std::ops::Index`]; every such index handed out by this crate is
//! guaranteed valid, but one constructed by hand (e.g. deserialized from JSON)
//! is not and must be checked before use.

use std::ops::Index;

pub use crate::encoding::Encoding;
pub use crate::error::{Error, Result, Span, Warning};
use crate::types::{
    Constant, Enum, Function, FunctionType, HllFunction, Initval, Library, NameIndex,
    RefDelegate, RefEnum, RefFile, RefFuncType, RefFunction, RefGlobal, RefLibrary, RefMessage,
    RefString, RefStruct, RefSwitch, RefSyscall, Struct, Switch, Syscall, Variable,
};

pub mod emit;
pub mod encoding;
pub mod error;
pub mod filenames;
pub mod fmt;
pub mod jaf;
pub mod jam;
pub mod json;
pub mod opcodes;
mod read;
pub mod text;
pub mod types;
mod write;

/// Interned/owned text used throughout the model. A clone is a refcount bump,
/// which matters since the same function and variable names are copied into
/// many diagnostics, the JAF symbol tables, and the binary codec's string pool.
pub type Str = flexstr::SharedStr;

/// The full in-memory model of an `.ain` file: every section of the
/// container plus the raw instruction stream. Every field is public; nothing
/// stops you from building one up by hand (as the emitter does) instead of
/// going through [`read`] or the JAF front end.
#[derive(Debug, Clone)]
pub struct AinFile {
    pub version_major: u8,
    pub version_minor: u8,

    pub functions: Vec<Function>,
    pub globals: Vec<Variable>,
    pub structs: Vec<Struct>,
    pub function_types: Vec<FunctionType>,
    /// Present from file version >= 11.
    pub delegates: Vec<FunctionType>,
    pub libraries: Vec<Library>,
    pub strings: Vec<Str>,
    pub messages: Vec<Str>,
    pub switches: Vec<Switch>,
    pub enums: Vec<Enum>,
    /// Present from file version >= 8.
    pub global_initvals: Vec<Initval>,
    /// Present when debug info was retained; used by `GETDBGDUMMY`/`assert`.
    pub filenames: Vec<Str>,
    pub syscalls: Vec<Syscall>,

    /// The flat instruction stream; [`Function::address`] and every branch
    /// operand are byte offsets into this buffer.
    pub code: Vec<u8>,

    /// The encoding JAF/TEXT source and CLI arguments are assumed to be
    /// authored in when no override is given (spec §9 "Iconv"). Never used
    /// to reinterpret bytes already living in this model's `Str` fields,
    /// which are always UTF-8.
    pub source_encoding: Encoding,
    /// Non-fatal diagnostics accumulated by passes that touch this file
    /// (JAF compilation, JAM assembly, `guess_filenames`). Cleared by
    /// nothing in particular; callers that care about a single pass's
    /// warnings should snapshot `.len()` before running it.
    pub diagnostics: Vec<Warning>,

    /// Acceleration structures rebuilt after load/declare, never serialized.
    index: NameIndex,
}

impl AinFile {
    /// An empty file at the given format version, with only the reserved
    /// null function (findex 0) and no code.
    pub fn new(version_major: u8, version_minor: u8) -> Self {
        AinFile {
            version_major,
            version_minor,
            functions: vec![Function::null()],
            globals: Vec::new(),
            structs: Vec::new(),
            function_types: Vec::new(),
            delegates: Vec::new(),
            libraries: Vec::new(),
            strings: Vec::new(),
            messages: Vec::new(),
            switches: Vec::new(),
            enums: Vec::new(),
            global_initvals: Vec::new(),
            filenames: Vec::new(),
            syscalls: Vec::new(),
            code: Vec::new(),
            source_encoding: Encoding::default(),
            diagnostics: Vec::new(),
            index: NameIndex::default(),
        }
    }

    pub fn version(&self) -> (u8, u8) {
        (self.version_major, self.version_minor)
    }

    /// The `main` function, i.e. the program entrypoint. Absence is only a
    /// warning (spec §4.8), not an error, so this returns an `Option`.
    pub fn main(&self) -> Option<&Function> {
        self.index
            .functions
            .get("main")
            .map(|&r| &self.functions[r.0])
    }

    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.index.functions.get(name).map(|&r| &self.functions[r.0])
    }

    pub fn global_by_name(&self, name: &str) -> Option<&Variable> {
        self.index.globals.get(name).map(|&r| &self.globals[r.0])
    }

    pub fn struct_by_name(&self, name: &str) -> Option<&Struct> {
        self.index.structs.get(name).map(|&r| &self.structs[r.0])
    }

    pub fn struct_index_by_name(&self, name: &str) -> Option<RefStruct> {
        self.index.structs.get(name).copied()
    }

    pub fn functype_by_name(&self, name: &str) -> Option<&FunctionType> {
        self.index
            .functypes
            .get(name)
            .map(|&r| &self.function_types[r.0])
    }

    pub fn delegate_by_name(&self, name: &str) -> Option<&FunctionType> {
        self.index.delegates.get(name).map(|&r| &self.delegates[r.0])
    }

    pub fn library_by_name(&self, name: &str) -> Option<&Library> {
        self.index.libraries.get(name).map(|&r| &self.libraries[r.0])
    }

    pub fn enum_by_name(&self, name: &str) -> Option<&Enum> {
        self.index.enums.get(name).map(|&r| &self.enums[r.0])
    }

    /// Rebuild the name-lookup acceleration structures from the current pool
    /// contents. Call this after mutating `functions`/`globals`/`structs`/...
    /// directly (the JAF declare pass and [`read`] both call it once at the end).
    pub fn reindex(&mut self) {
        self.index = NameIndex::default();
        for (i, f) in self.functions.iter().enumerate() {
            if f.address.is_some() || i == 0 {
                self.index.functions.insert(f.name.clone(), RefFunction(i));
            } else {
                self.index.functions.entry(f.name.clone()).or_insert(RefFunction(i));
            }
        }
        for (i, g) in self.globals.iter().enumerate() {
            self.index.globals.insert(g.name.clone(), RefGlobal(i));
        }
        for (i, s) in self.structs.iter().enumerate() {
            self.index.structs.insert(s.name.clone(), RefStruct(i));
        }
        for (i, ft) in self.function_types.iter().enumerate() {
            self.index.functypes.insert(ft.name.clone(), RefFuncType(i));
        }
        for (i, d) in self.delegates.iter().enumerate() {
            self.index.delegates.insert(d.name.clone(), RefDelegate(i));
        }
        for (i, l) in self.libraries.iter().enumerate() {
            self.index.libraries.insert(l.name.clone(), RefLibrary(i));
        }
        for (i, e) in self.enums.iter().enumerate() {
            self.index.enums.insert(e.name.clone(), RefEnum(i));
        }
    }
}

//region Resolve

/// Resolve a `Ref*` index into a borrowed view of the entity it names.
/// Mirrors [`std::ops::Index`] but lets the output type differ from the
/// pool's element type (e.g. a `RefString` resolves to `&str`, not `&Str`).
pub trait Resolve<I> {
    type Output<'a>
    where
        Self: 'a;

    fn resolve(&self, index: I) -> Self::Output<'_>;
}

impl Resolve<RefFunction> for AinFile {
    type Output<'a> = &'a Function;

    fn resolve(&self, index: RefFunction) -> Self::Output<'_> {
        &self.functions[index.0]
    }
}

impl Resolve<RefGlobal> for AinFile {
    type Output<'a> = &'a Variable;

    fn resolve(&self, index: RefGlobal) -> Self::Output<'_> {
        &self.globals[index.0]
    }
}

impl Resolve<RefStruct> for AinFile {
    type Output<'a> = &'a Struct;

    fn resolve(&self, index: RefStruct) -> Self::Output<'_> {
        &self.structs[index.0]
    }
}

impl Resolve<RefFuncType> for AinFile {
    type Output<'a> = &'a FunctionType;

    fn resolve(&self, index: RefFuncType) -> Self::Output<'_> {
        &self.function_types[index.0]
    }
}

impl Resolve<RefDelegate> for AinFile {
    type Output<'a> = &'a FunctionType;

    fn resolve(&self, index: RefDelegate) -> Self::Output<'_> {
        &self.delegates[index.0]
    }
}

impl Resolve<RefLibrary> for AinFile {
    type Output<'a> = &'a Library;

    fn resolve(&self, index: RefLibrary) -> Self::Output<'_> {
        &self.libraries[index.0]
    }
}

impl Resolve<RefString> for AinFile {
    type Output<'a> = &'a str;

    fn resolve(&self, index: RefString) -> Self::Output<'_> {
        self.strings.get(index.0).map(|s| s.as_str()).unwrap_or("")
    }
}

impl Resolve<RefMessage> for AinFile {
    type Output<'a> = &'a str;

    fn resolve(&self, index: RefMessage) -> Self::Output<'_> {
        self.messages.get(index.0).map(|s| s.as_str()).unwrap_or("")
    }
}

impl Resolve<RefSwitch> for AinFile {
    type Output<'a> = &'a Switch;

    fn resolve(&self, index: RefSwitch) -> Self::Output<'_> {
        &self.switches[index.0]
    }
}

impl Resolve<RefEnum> for AinFile {
    type Output<'a> = &'a Enum;

    fn resolve(&self, index: RefEnum) -> Self::Output<'_> {
        &self.enums[index.0]
    }
}

impl Resolve<RefFile> for AinFile {
    type Output<'a> = &'a str;

    fn resolve(&self, index: RefFile) -> Self::Output<'_> {
        self.filenames.get(index.0).map(|s| s.as_str()).unwrap_or("")
    }
}

impl Resolve<RefSyscall> for AinFile {
    type Output<'a> = &'a Syscall;

    fn resolve(&self, index: RefSyscall) -> Self::Output<'_> {
        &self.syscalls[index.0]
    }
}

//endregion

// region Index impl

impl Index<RefFunction> for AinFile {
    type Output = Function;

    fn index(&self, index: RefFunction) -> &Self::Output {
        &self.functions[index.0]
    }
}

impl Index<RefGlobal> for AinFile {
    type Output = Variable;

    fn index(&self, index: RefGlobal) -> &Self::Output {
        &self.globals[index.0]
    }
}

impl Index<RefStruct> for AinFile {
    type Output = Struct;

    fn index(&self, index: RefStruct) -> &Self::Output {
        &self.structs[index.0]
    }
}

impl Index<RefString> for AinFile {
    type Output = Str;

    fn index(&self, index: RefString) -> &Self::Output {
        &self.strings[index.0]
    }
}

//endregion

/// Intern `s`, reusing an existing pool entry when one is byte-identical.
/// The JAF emitter uses this to avoid duplicating the same string literal.
pub(crate) fn intern(pool: &mut Vec<Str>, s: &str) -> RefString {
    if let Some(i) = pool.iter().position(|existing| existing.as_str() == s) {
        return RefString(i);
    }
    pool.push(Str::from(s));
    RefString(pool.len() - 1)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::AinFile;

    #[test]
    fn test_deserialize_fixtures() {
        let dir = match fs::read_dir("tests/data") {
            Ok(dir) => dir,
            Err(_) => return,
        };
        for entry in dir {
            let path = entry.unwrap().path();
            if path.extension().map(|e| e == "ain").unwrap_or(false) {
                let bytes = fs::read(&path).unwrap();
                let ain = AinFile::from_bytes(&bytes);
                assert!(ain.is_ok(), "failed to parse {}: {:?}", path.display(), ain.err());
            }
        }
    }

    #[test]
    fn from_file_to_file_round_trips_through_disk() {
        let dir = temp_dir::TempDir::new().unwrap();
        let path = dir.path().join("roundtrip.ain");

        let mut ain = AinFile::new(11, 0);
        ain.strings.push(crate::Str::from("hello"));
        ain.to_file(&path, false).unwrap();

        let loaded = AinFile::from_file(&path).unwrap();
        assert_eq!(loaded.version(), (11, 0));
        assert_eq!(loaded.strings[0].as_str(), "hello");
    }

    #[test]
    fn new_file_defaults_to_cp932_source_encoding_and_no_diagnostics() {
        let ain = AinFile::new(11, 0);
        assert_eq!(ain.source_encoding, crate::Encoding::Cp932);
        assert!(ain.diagnostics.is_empty());
    }
}
