//! Binary codec: decoding (spec §4.1). Mirrors [`crate::write`] section for
//! section. The container is detected by magic prefix, normalised to a flat
//! section stream, then each four-byte-tagged section is parsed according to
//! the file's own version.

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};
use crate::types::{
    AinType, AinTypeTag, Constant, Enum, Function, FunctionFlags, FunctionType, HllFunction,
    Initval, InterfaceImpl, Library, RefEnum, RefFuncType, RefGlobal, RefStruct, Struct, Switch,
    SwitchCaseType, Syscall, Variable,
};
use crate::{AinFile, Str};

const VARIANT_A_MAGIC: &[u8; 4] = b"AI2\0";
/// XOR key schedule for variant B containers (pre-v6): a 4-byte repeating
/// stream permuted every `KEY_PERIOD` bytes, the way the original writer's
/// encryption pass is keyed.
pub(crate) const XOR_KEY: [u8; 4] = [0x5d, 0x4f, 0x7e, 0x83];

/// Strip the container framing and return the plain concatenated sections.
fn decode_container(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() >= 4 && &bytes[0..4] == VARIANT_A_MAGIC {
        let mut r = Cursor::new(&bytes[4..]);
        let uncompressed_size = r.read_u32::<LittleEndian>()? as usize;
        let compressed_size = r.read_u32::<LittleEndian>()? as usize;
        let start = 4 + 8;
        let end = start + compressed_size;
        let chunk = bytes
            .get(start..end)
            .ok_or_else(|| Error::invalid_input("truncated compressed payload"))?;
        let mut out = Vec::with_capacity(uncompressed_size);
        ZlibDecoder::new(chunk).read_to_end(&mut out)?;
        if out.len() != uncompressed_size {
            return Err(Error::invalid_input(format!(
                "decompressed size mismatch: expected {uncompressed_size}, got {}",
                out.len()
            )));
        }
        Ok(out)
    } else if bytes.len() >= 4 && &bytes[0..4] == b"VERS" {
        // Already a plain section stream (no container framing at all).
        Ok(bytes.to_vec())
    } else {
        // Variant B: XOR-permuted stream. Undo the permutation in place.
        let mut out = bytes.to_vec();
        for (i, b) in out.iter_mut().enumerate() {
            *b ^= XOR_KEY[i % XOR_KEY.len()];
        }
        if out.len() < 4 || &out[0..4] != b"VERS" {
            return Err(Error::invalid_input("bad magic: not a recognised .ain container"));
        }
        Ok(out)
    }
}

fn read_cstr(r: &mut impl Read) -> Result<Str> {
    let mut buf = Vec::new();
    loop {
        let b = r.read_u8()?;
        if b == 0 {
            break;
        }
        buf.push(b);
    }
    Ok(Str::from(std::str::from_utf8(&buf)?.to_string()))
}

fn read_vec_cstr(r: &mut impl Read) -> Result<Vec<Str>> {
    let n = r.read_u32::<LittleEndian>()? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(read_cstr(r)?);
    }
    Ok(out)
}

/// MSG1 per-byte obfuscation (spec §4.1): `byte + 0x60 + index`, wrapping mod 256.
fn deobfuscate_msg1(buf: &mut [u8]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b = b.wrapping_sub(0x60).wrapping_sub(i as u8);
    }
}

impl AinType {
    fn read(r: &mut impl Read, major: u8) -> Result<Self> {
        let tag_byte = r.read_i32::<LittleEndian>()?;
        let struct_index = r.read_i32::<LittleEndian>()?;
        let tag = tag_from_byte(tag_byte, struct_index)?;
        let rank = r.read_u32::<LittleEndian>()?;
        let element = if major >= 11 && matches!(tag, AinTypeTag::Array | AinTypeTag::Wrap) {
            Some(Box::new(AinType::read(r, major)?))
        } else {
            None
        };
        Ok(AinType { tag, rank, element })
    }
}

fn tag_from_byte(tag: i32, idx: i32) -> Result<AinTypeTag> {
    use AinTypeTag::*;
    Ok(match tag {
        0 => Void,
        1 => Int,
        2 => Float,
        3 => String,
        4 => Struct(RefStruct(idx.max(0) as usize)),
        5 => Array,
        6 => RefArray,
        7 => FuncType(RefFuncType(idx.max(0) as usize)),
        8 => Bool,
        9 => LongInt,
        10 => Delegate(RefStruct(idx.max(0) as usize).into_delegate()),
        11 => HllParam,
        12 => Iface(RefStruct(idx.max(0) as usize)),
        13 => Enum(RefEnum(idx.max(0) as usize)),
        14 => Wrap,
        15 => IMainSystem,
        other => return Err(Error::invalid_input(format!("unknown type tag {other}"))),
    })
}

// `RefDelegate` and `RefStruct` both wrap a bare `usize`; this helper exists
// purely so `tag_from_byte` reads as a table instead of repeating the cast.
trait IntoDelegate {
    fn into_delegate(self) -> crate::types::RefDelegate;
}
impl IntoDelegate for RefStruct {
    fn into_delegate(self) -> crate::types::RefDelegate {
        crate::types::RefDelegate(self.0)
    }
}

impl Constant {
    fn read(r: &mut impl Read) -> Result<Self> {
        let tag = r.read_u8()?;
        Ok(match tag {
            0 => Constant::Void,
            1 => Constant::Int(r.read_i32::<LittleEndian>()?),
            2 => Constant::Float(f32::from_bits(r.read_u32::<LittleEndian>()?)),
            3 => Constant::String(read_cstr(r)?),
            4 => Constant::Bool(r.read_u8()? != 0),
            5 => Constant::LongInt(r.read_i64::<LittleEndian>()?),
            other => return Err(Error::invalid_input(format!("unknown constant tag {other}"))),
        })
    }
}

impl Variable {
    fn read(r: &mut impl Read, major: u8, with_group: bool, with_initval: bool) -> Result<Self> {
        let name = read_cstr(r)?;
        let name2 = if major >= 12 { Some(read_cstr(r)?) } else { None };
        let ty = AinType::read(r, major)?;
        let group_index = if with_group {
            Some(r.read_i32::<LittleEndian>()?)
        } else {
            None
        };
        let initial_value = if with_initval && r.read_u8()? != 0 {
            Some(Constant::read(r)?)
        } else {
            None
        };
        Ok(Variable {
            name,
            name2,
            ty,
            initial_value,
            group_index,
        })
    }
}

impl Function {
    fn read(r: &mut impl Read, major: u8) -> Result<Self> {
        let name = read_cstr(r)?;
        let findex = r.read_i32::<LittleEndian>()?;
        let return_type = AinType::read(r, major)?;
        let nr_args = r.read_u32::<LittleEndian>()? as usize;
        let nr_vars = r.read_u32::<LittleEndian>()? as usize;
        let is_label = if (1..7).contains(&major) {
            r.read_u8()? != 0
        } else {
            false
        };
        let is_lambda = if major >= 11 { r.read_u8()? != 0 } else { false };
        let crc = if major >= 1 {
            Some(r.read_u32::<LittleEndian>()?)
        } else {
            None
        };
        let address = match r.read_i64::<LittleEndian>()? {
            -1 => None,
            a => Some(a as u32),
        };
        let mut variables = Vec::with_capacity(nr_vars);
        for _ in 0..nr_vars {
            variables.push(Variable::read(r, major, false, major >= 8)?);
        }
        Ok(Function {
            name,
            findex: crate::types::RefFunction(findex.max(0) as usize),
            return_type,
            nr_args,
            variables,
            address,
            crc,
            flags: FunctionFlags { is_label, is_lambda },
            parent_struct: None,
        })
    }
}

impl InterfaceImpl {
    fn read(r: &mut impl Read) -> Result<Self> {
        Ok(InterfaceImpl {
            iface: RefStruct(r.read_i32::<LittleEndian>()?.max(0) as usize),
            vtable_offset: r.read_i32::<LittleEndian>()?,
        })
    }
}

impl Struct {
    fn read(r: &mut impl Read, major: u8, minor: u8) -> Result<Self> {
        let name = read_cstr(r)?;
        let constructor = opt_fn(r.read_i32::<LittleEndian>()?);
        let destructor = opt_fn(r.read_i32::<LittleEndian>()?);
        let nr_members = r.read_u32::<LittleEndian>()? as usize;
        let mut members = Vec::with_capacity(nr_members);
        for _ in 0..nr_members {
            members.push(Variable::read(r, major, false, false)?);
        }
        let interfaces = if major >= 11 {
            let n = r.read_u32::<LittleEndian>()? as usize;
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(InterfaceImpl::read(r)?);
            }
            v
        } else {
            Vec::new()
        };
        let vtable = if (major, minor) >= (14, 1) {
            let n = r.read_u32::<LittleEndian>()? as usize;
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(crate::types::RefFunction(r.read_i32::<LittleEndian>()?.max(0) as usize));
            }
            Some(v)
        } else {
            None
        };
        Ok(Struct {
            name,
            is_interface: false,
            constructor,
            destructor,
            members,
            methods: Vec::new(),
            interfaces,
            vtable,
            iface_methods: Vec::new(),
        })
    }
}

fn opt_fn(i: i32) -> Option<crate::types::RefFunction> {
    if i < 0 {
        None
    } else {
        Some(crate::types::RefFunction(i as usize))
    }
}

impl FunctionType {
    fn read(r: &mut impl Read, major: u8) -> Result<Self> {
        let name = read_cstr(r)?;
        let return_type = AinType::read(r, major)?;
        let nr_args = r.read_u32::<LittleEndian>()? as usize;
        let nr_vars = r.read_u32::<LittleEndian>()? as usize;
        let mut variables = Vec::with_capacity(nr_vars);
        for _ in 0..nr_vars {
            variables.push(Variable::read(r, major, false, false)?);
        }
        Ok(FunctionType {
            name,
            return_type,
            nr_args,
            variables,
        })
    }
}

impl HllFunction {
    fn read(r: &mut impl Read, major: u8) -> Result<Self> {
        let name = read_cstr(r)?;
        let return_type = read_hll_type(r, major)?;
        let nr_args = r.read_u32::<LittleEndian>()? as usize;
        let mut arguments = Vec::with_capacity(nr_args);
        for _ in 0..nr_args {
            let argname = read_cstr(r)?;
            let ty = read_hll_type(r, major)?;
            arguments.push(Variable::new(argname, ty));
        }
        Ok(HllFunction {
            name,
            return_type,
            arguments,
        })
    }
}

fn read_hll_type(r: &mut impl Read, major: u8) -> Result<AinType> {
    if major >= 14 {
        AinType::read(r, major)
    } else {
        let tag = r.read_i32::<LittleEndian>()?;
        Ok(AinType::simple(tag_from_byte(tag, -1)?))
    }
}

impl Library {
    fn read(r: &mut impl Read, major: u8) -> Result<Self> {
        let name = read_cstr(r)?;
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut functions = Vec::with_capacity(n);
        for _ in 0..n {
            functions.push(HllFunction::read(r, major)?);
        }
        Ok(Library { name, functions })
    }
}

impl Switch {
    fn read(r: &mut impl Read) -> Result<Self> {
        let case_type = if r.read_u8()? == 0 {
            SwitchCaseType::Int
        } else {
            SwitchCaseType::String
        };
        let default_address = match r.read_i64::<LittleEndian>()? {
            -1 => None,
            a => Some(a as u32),
        };
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut cases = Vec::with_capacity(n);
        for _ in 0..n {
            let value = match case_type {
                SwitchCaseType::Int => Constant::Int(r.read_i32::<LittleEndian>()?),
                SwitchCaseType::String => Constant::String(read_cstr(r)?),
            };
            let addr = r.read_u32::<LittleEndian>()?;
            cases.push((value, addr));
        }
        Ok(Switch {
            case_type,
            default_address,
            cases,
        })
    }
}

impl Enum {
    fn read(r: &mut impl Read) -> Result<Self> {
        let name = read_cstr(r)?;
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut variants = Vec::with_capacity(n);
        for _ in 0..n {
            let vname = read_cstr(r)?;
            let value = r.read_i32::<LittleEndian>()?;
            variants.push((vname, value));
        }
        Ok(Enum { name, variants })
    }
}

impl Syscall {
    fn read(r: &mut impl Read, major: u8) -> Result<Self> {
        let name = read_cstr(r)?;
        let return_type = AinType::read(r, major)?;
        let n = r.read_u32::<LittleEndian>()? as usize;
        let mut arguments = Vec::with_capacity(n);
        for _ in 0..n {
            arguments.push(AinType::read(r, major)?);
        }
        Ok(Syscall {
            name,
            return_type,
            arguments,
        })
    }
}

impl AinFile {
    /// Parse a complete `.ain` file: detect container, normalise, then walk
    /// the section stream. Missing sections are legal (spec §4.1) and simply
    /// leave the corresponding pool empty.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let plain = decode_container(bytes)?;
        let mut r = Cursor::new(plain.as_slice());

        let mut ain = AinFile::new(1, 0);
        let mut msg1 = false;

        loop {
            let mut tag = [0u8; 4];
            match r.read_exact(&mut tag) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            if &tag == b"OJMP" {
                break;
            }
            let offset = r.position();
            match &tag {
                b"VERS" => {
                    ain.version_major = r.read_u32::<LittleEndian>()? as u8;
                    ain.version_minor = r.read_u32::<LittleEndian>()? as u8;
                }
                b"CODE" => {
                    let len = r.read_u32::<LittleEndian>()? as usize;
                    let mut code = vec![0u8; len];
                    r.read_exact(&mut code)?;
                    ain.code = code;
                }
                b"FUNC" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut functions = Vec::with_capacity(n);
                    for _ in 0..n {
                        functions.push(Function::read(&mut r, ain.version_major)?);
                    }
                    ain.functions = functions;
                }
                b"GLOB" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut globals = Vec::with_capacity(n);
                    for _ in 0..n {
                        globals.push(Variable::read(
                            &mut r,
                            ain.version_major,
                            ain.version_major >= 5,
                            false,
                        )?);
                    }
                    ain.globals = globals;
                }
                b"GSET" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut initvals = Vec::with_capacity(n);
                    for _ in 0..n {
                        let global = RefGlobal(r.read_i32::<LittleEndian>()?.max(0) as usize);
                        let value = Constant::read(&mut r)?;
                        initvals.push(Initval { global, value });
                    }
                    ain.global_initvals = initvals;
                }
                b"STRT" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut structs = Vec::with_capacity(n);
                    for _ in 0..n {
                        structs.push(Struct::read(&mut r, ain.version_major, ain.version_minor)?);
                    }
                    ain.structs = structs;
                }
                b"FNCT" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(FunctionType::read(&mut r, ain.version_major)?);
                    }
                    ain.function_types = v;
                }
                b"DELG" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(FunctionType::read(&mut r, ain.version_major)?);
                    }
                    ain.delegates = v;
                }
                b"LIBL" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(Library::read(&mut r, ain.version_major)?);
                    }
                    ain.libraries = v;
                }
                b"STR0" => {
                    ain.strings = read_vec_cstr(&mut r)?;
                }
                b"MSG0" => {
                    ain.messages = read_vec_cstr(&mut r)?;
                    msg1 = false;
                }
                b"MSG1" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut out = Vec::with_capacity(n);
                    for _ in 0..n {
                        let mut raw = Vec::new();
                        loop {
                            let b = r.read_u8()?;
                            if b == 0 {
                                break;
                            }
                            raw.push(b);
                        }
                        deobfuscate_msg1(&mut raw);
                        out.push(Str::from(std::str::from_utf8(&raw)?.to_string()));
                    }
                    ain.messages = out;
                    msg1 = true;
                }
                b"SWI0" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(Switch::read(&mut r)?);
                    }
                    ain.switches = v;
                }
                b"ENUM" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(Enum::read(&mut r)?);
                    }
                    ain.enums = v;
                }
                b"FNAM" => {
                    ain.filenames = read_vec_cstr(&mut r)?;
                }
                b"SYSC" => {
                    let n = r.read_u32::<LittleEndian>()? as usize;
                    let mut v = Vec::with_capacity(n);
                    for _ in 0..n {
                        v.push(Syscall::read(&mut r, ain.version_major)?);
                    }
                    ain.syscalls = v;
                }
                b"MAIN" | b"MSGF" => {
                    // Both are redundant with the `main`/`message` name lookups
                    // built from the function/message pools (spec §3.2); skip the index.
                    r.read_i32::<LittleEndian>()?;
                }
                other => {
                    return Err(Error::UnknownSection {
                        tag: String::from_utf8_lossy(other).into_owned(),
                        offset,
                    });
                }
            }
        }
        let _ = msg1;
        ain.reindex();
        Ok(ain)
    }

    /// [`Self::from_bytes`] plus reading `path` first, propagating I/O
    /// errors through the same [`Result`] rather than printing anything
    /// (spec §5: no hidden I/O inside the codec).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}
