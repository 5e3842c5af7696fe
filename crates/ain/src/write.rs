//! Binary codec: encoding (spec §4.1). Re-serialises every section the file
//! has, in the same order [`crate::read`] understands, then frames the
//! result according to the target container variant.

use std::io::Write;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::types::{
    AinType, AinTypeTag, Constant, Enum, Function, FunctionType, HllFunction, Library, Struct,
    Switch, SwitchCaseType, Syscall, Variable,
};
use crate::{AinFile, Str};

use crate::read::*; // re-used constants only (XOR key); see below

fn write_cstr(w: &mut impl Write, s: &str) -> Result<()> {
    w.write_all(s.as_bytes())?;
    w.write_u8(0)?;
    Ok(())
}

fn write_vec_cstr(w: &mut impl Write, v: &[Str]) -> Result<()> {
    w.write_u32::<LittleEndian>(v.len() as u32)?;
    for s in v {
        write_cstr(w, s)?;
    }
    Ok(())
}

/// MSG1 per-byte obfuscation, the inverse of [`crate::read`]'s deobfuscation.
fn obfuscate_msg1(buf: &mut [u8]) {
    for (i, b) in buf.iter_mut().enumerate() {
        *b = b.wrapping_add(0x60).wrapping_add(i as u8);
    }
}

fn tag_to_byte(tag: &AinTypeTag) -> (i32, i32) {
    use AinTypeTag::*;
    match tag {
        Void => (0, -1),
        Int => (1, -1),
        Float => (2, -1),
        String => (3, -1),
        Struct(r) => (4, r.0 as i32),
        Array => (5, -1),
        RefArray => (6, -1),
        FuncType(r) => (7, r.0 as i32),
        Bool => (8, -1),
        LongInt => (9, -1),
        Delegate(r) => (10, r.0 as i32),
        HllParam => (11, -1),
        Iface(r) => (12, r.0 as i32),
        Enum(r) => (13, r.0 as i32),
        Wrap => (14, -1),
        IMainSystem => (15, -1),
        // `ref T` and every intermediate tag are only valid inside the
        // type-checker; the emitter must have already lowered them away.
        other => unreachable!("cannot serialise intermediate type tag {other:?}"),
    }
}

impl AinType {
    fn write(&self, w: &mut impl Write, major: u8) -> Result<()> {
        let (tag, idx) = tag_to_byte(&self.tag);
        w.write_i32::<LittleEndian>(tag)?;
        w.write_i32::<LittleEndian>(idx)?;
        w.write_u32::<LittleEndian>(self.rank)?;
        if major >= 11 && matches!(self.tag, AinTypeTag::Array | AinTypeTag::Wrap) {
            self.element
                .as_ref()
                .expect("array/wrap type missing element type on v11+")
                .write(w, major)?;
        }
        Ok(())
    }
}

impl Constant {
    fn write(&self, w: &mut impl Write) -> Result<()> {
        match self {
            Constant::Void => w.write_u8(0)?,
            Constant::Int(i) => {
                w.write_u8(1)?;
                w.write_i32::<LittleEndian>(*i)?;
            }
            Constant::Float(f) => {
                w.write_u8(2)?;
                w.write_u32::<LittleEndian>(f.to_bits())?;
            }
            Constant::String(s) => {
                w.write_u8(3)?;
                write_cstr(w, s)?;
            }
            Constant::Bool(b) => {
                w.write_u8(4)?;
                w.write_u8(*b as u8)?;
            }
            Constant::LongInt(i) => {
                w.write_u8(5)?;
                w.write_i64::<LittleEndian>(*i)?;
            }
        }
        Ok(())
    }
}

impl Variable {
    fn write(&self, w: &mut impl Write, major: u8, with_group: bool, with_initval: bool) -> Result<()> {
        write_cstr(w, &self.name)?;
        if major >= 12 {
            write_cstr(w, self.name2.as_deref().unwrap_or(""))?;
        }
        self.ty.write(w, major)?;
        if with_group {
            w.write_i32::<LittleEndian>(self.group_index.unwrap_or(0))?;
        }
        if with_initval {
            match &self.initial_value {
                Some(c) => {
                    w.write_u8(1)?;
                    c.write(w)?;
                }
                None => w.write_u8(0)?,
            }
        }
        Ok(())
    }
}

impl Function {
    fn write(&self, w: &mut impl Write, major: u8) -> Result<()> {
        write_cstr(w, &self.name)?;
        w.write_i32::<LittleEndian>(self.findex.0 as i32)?;
        self.return_type.write(w, major)?;
        w.write_u32::<LittleEndian>(self.nr_args as u32)?;
        w.write_u32::<LittleEndian>(self.variables.len() as u32)?;
        if (1..7).contains(&major) {
            w.write_u8(self.flags.is_label as u8)?;
        }
        if major >= 11 {
            w.write_u8(self.flags.is_lambda as u8)?;
        }
        if major >= 1 {
            w.write_u32::<LittleEndian>(self.crc.unwrap_or(0))?;
        }
        w.write_i64::<LittleEndian>(self.address.map(|a| a as i64).unwrap_or(-1))?;
        for v in &self.variables {
            v.write(w, major, false, major >= 8)?;
        }
        Ok(())
    }
}

impl Struct {
    fn write(&self, w: &mut impl Write, major: u8, minor: u8) -> Result<()> {
        write_cstr(w, &self.name)?;
        w.write_i32::<LittleEndian>(self.constructor.map(|r| r.0 as i32).unwrap_or(-1))?;
        w.write_i32::<LittleEndian>(self.destructor.map(|r| r.0 as i32).unwrap_or(-1))?;
        w.write_u32::<LittleEndian>(self.members.len() as u32)?;
        for m in &self.members {
            m.write(w, major, false, false)?;
        }
        if major >= 11 {
            w.write_u32::<LittleEndian>(self.interfaces.len() as u32)?;
            for iface in &self.interfaces {
                w.write_i32::<LittleEndian>(iface.iface.0 as i32)?;
                w.write_i32::<LittleEndian>(iface.vtable_offset)?;
            }
        }
        if (major, minor) >= (14, 1) {
            let vtable = self.vtable.as_deref().unwrap_or(&[]);
            w.write_u32::<LittleEndian>(vtable.len() as u32)?;
            for f in vtable {
                w.write_i32::<LittleEndian>(f.0 as i32)?;
            }
        }
        Ok(())
    }
}

impl FunctionType {
    fn write(&self, w: &mut impl Write, major: u8) -> Result<()> {
        write_cstr(w, &self.name)?;
        self.return_type.write(w, major)?;
        w.write_u32::<LittleEndian>(self.nr_args as u32)?;
        w.write_u32::<LittleEndian>(self.variables.len() as u32)?;
        for v in &self.variables {
            v.write(w, major, false, false)?;
        }
        Ok(())
    }
}

fn write_hll_type(w: &mut impl Write, ty: &AinType, major: u8) -> Result<()> {
    if major >= 14 {
        ty.write(w, major)
    } else {
        let (tag, _) = tag_to_byte(&ty.tag);
        w.write_i32::<LittleEndian>(tag)?;
        Ok(())
    }
}

impl HllFunction {
    fn write(&self, w: &mut impl Write, major: u8) -> Result<()> {
        write_cstr(w, &self.name)?;
        write_hll_type(w, &self.return_type, major)?;
        w.write_u32::<LittleEndian>(self.arguments.len() as u32)?;
        for a in &self.arguments {
            write_cstr(w, &a.name)?;
            write_hll_type(w, &a.ty, major)?;
        }
        Ok(())
    }
}

impl Library {
    fn write(&self, w: &mut impl Write, major: u8) -> Result<()> {
        write_cstr(w, &self.name)?;
        w.write_u32::<LittleEndian>(self.functions.len() as u32)?;
        for f in &self.functions {
            f.write(w, major)?;
        }
        Ok(())
    }
}

impl Switch {
    fn write(&self, w: &mut impl Write) -> Result<()> {
        w.write_u8(match self.case_type {
            SwitchCaseType::Int => 0,
            SwitchCaseType::String => 1,
        })?;
        w.write_i64::<LittleEndian>(self.default_address.map(|a| a as i64).unwrap_or(-1))?;
        w.write_u32::<LittleEndian>(self.cases.len() as u32)?;
        for (value, addr) in &self.cases {
            match value {
                Constant::Int(i) => w.write_i32::<LittleEndian>(*i)?,
                Constant::String(s) => write_cstr(w, s)?,
                _ => unreachable!("switch case value must be int or string"),
            }
            w.write_u32::<LittleEndian>(*addr)?;
        }
        Ok(())
    }
}

impl Enum {
    fn write(&self, w: &mut impl Write) -> Result<()> {
        write_cstr(w, &self.name)?;
        w.write_u32::<LittleEndian>(self.variants.len() as u32)?;
        for (name, value) in &self.variants {
            write_cstr(w, name)?;
            w.write_i32::<LittleEndian>(*value)?;
        }
        Ok(())
    }
}

impl Syscall {
    fn write(&self, w: &mut impl Write, major: u8) -> Result<()> {
        write_cstr(w, &self.name)?;
        self.return_type.write(w, major)?;
        w.write_u32::<LittleEndian>(self.arguments.len() as u32)?;
        for a in &self.arguments {
            a.write(w, major)?;
        }
        Ok(())
    }
}

impl AinFile {
    /// Serialise the plain (unframed) section stream.
    fn write_sections(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(b"VERS")?;
        w.write_u32::<LittleEndian>(self.version_major as u32)?;
        w.write_u32::<LittleEndian>(self.version_minor as u32)?;

        w.write_all(b"FUNC")?;
        w.write_u32::<LittleEndian>(self.functions.len() as u32)?;
        for f in &self.functions {
            f.write(w, self.version_major)?;
        }

        w.write_all(b"GLOB")?;
        w.write_u32::<LittleEndian>(self.globals.len() as u32)?;
        for g in &self.globals {
            g.write(w, self.version_major, self.version_major >= 5, false)?;
        }

        if self.version_major >= 8 && !self.global_initvals.is_empty() {
            w.write_all(b"GSET")?;
            w.write_u32::<LittleEndian>(self.global_initvals.len() as u32)?;
            for iv in &self.global_initvals {
                w.write_i32::<LittleEndian>(iv.global.0 as i32)?;
                iv.value.write(w)?;
            }
        }

        w.write_all(b"STRT")?;
        w.write_u32::<LittleEndian>(self.structs.len() as u32)?;
        for s in &self.structs {
            s.write(w, self.version_major, self.version_minor)?;
        }

        w.write_all(b"FNCT")?;
        w.write_u32::<LittleEndian>(self.function_types.len() as u32)?;
        for f in &self.function_types {
            f.write(w, self.version_major)?;
        }

        if self.version_major >= 11 {
            w.write_all(b"DELG")?;
            w.write_u32::<LittleEndian>(self.delegates.len() as u32)?;
            for d in &self.delegates {
                d.write(w, self.version_major)?;
            }
        }

        w.write_all(b"LIBL")?;
        w.write_u32::<LittleEndian>(self.libraries.len() as u32)?;
        for l in &self.libraries {
            l.write(w, self.version_major)?;
        }

        if !self.syscalls.is_empty() {
            w.write_all(b"SYSC")?;
            w.write_u32::<LittleEndian>(self.syscalls.len() as u32)?;
            for s in &self.syscalls {
                s.write(w, self.version_major)?;
            }
        }

        w.write_all(b"STR0")?;
        write_vec_cstr(w, &self.strings)?;

        if self.version_major >= 11 {
            w.write_all(b"MSG0")?;
            write_vec_cstr(w, &self.messages)?;
        } else {
            w.write_all(b"MSG1")?;
            w.write_u32::<LittleEndian>(self.messages.len() as u32)?;
            for m in &self.messages {
                let mut raw = m.as_bytes().to_vec();
                obfuscate_msg1(&mut raw);
                w.write_all(&raw)?;
                w.write_u8(0)?;
            }
        }

        w.write_all(b"SWI0")?;
        w.write_u32::<LittleEndian>(self.switches.len() as u32)?;
        for sw in &self.switches {
            sw.write(w)?;
        }

        w.write_all(b"ENUM")?;
        w.write_u32::<LittleEndian>(self.enums.len() as u32)?;
        for e in &self.enums {
            e.write(w)?;
        }

        if !self.filenames.is_empty() {
            w.write_all(b"FNAM")?;
            write_vec_cstr(w, &self.filenames)?;
        }

        w.write_all(b"CODE")?;
        w.write_u32::<LittleEndian>(self.code.len() as u32)?;
        w.write_all(&self.code)?;

        w.write_all(b"OJMP")?;
        Ok(())
    }

    /// Serialise and frame the file for the given container variant.
    /// `compress` picks variant A (zlib, v6+ containers); when false, the
    /// classic XOR-permuted variant B stream is produced instead.
    pub fn to_bytes(&self, compress: bool) -> Result<Vec<u8>> {
        let mut plain = Vec::new();
        self.write_sections(&mut plain)?;

        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&plain)?;
            let compressed = encoder.finish()?;

            let mut out = Vec::with_capacity(12 + compressed.len());
            out.extend_from_slice(b"AI2\0");
            out.write_u32::<LittleEndian>(plain.len() as u32)?;
            out.write_u32::<LittleEndian>(compressed.len() as u32)?;
            out.extend_from_slice(&compressed);
            Ok(out)
        } else {
            let mut out = plain;
            for (i, b) in out.iter_mut().enumerate() {
                *b ^= XOR_KEY[i % XOR_KEY.len()];
            }
            Ok(out)
        }
    }

    /// [`Self::to_bytes`] plus writing the result to `path`, propagating I/O
    /// errors through the same [`Result`] rather than printing anything
    /// (spec §5: no hidden I/O inside the codec).
    pub fn to_file(&self, path: impl AsRef<Path>, compress: bool) -> Result<()> {
        let bytes = self.to_bytes(compress)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
